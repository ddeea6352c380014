// Relative/absolute deadlines for suspension points (spec.md S4.1)

use std::time::Duration;

use tokio::time::Instant;

/// A point in time an I/O call should give up and return `TIMEOUT`.
/// `NO_TIMEOUT` is represented as `Deadline::never()`.
#[derive(Clone, Copy)]
pub enum Deadline {
    At(Instant),
    Never,
}

impl Deadline {
    pub fn after(dur: Duration) -> Deadline {
        Deadline::At(Instant::now() + dur)
    }

    pub fn never() -> Deadline {
        Deadline::Never
    }

    /// Resolves at the deadline; never resolves for `Never`, so pairing
    /// it in a `tokio::select!` with other branches effectively disables
    /// this arm.
    pub async fn wait(&self) {
        match self {
            Deadline::At(instant) => tokio::time::sleep_until(*instant).await,
            Deadline::Never => std::future::pending().await,
        }
    }

    pub fn is_expired(&self) -> bool {
        match self {
            Deadline::At(instant) => Instant::now() >= *instant,
            Deadline::Never => false,
        }
    }
}
