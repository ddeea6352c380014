// Condition variable built on tokio::sync::Notify (spec.md S4.1,
// cond_new/wait/timedwait/signal/broadcast)

use std::time::Duration;

use tokio::sync::Notify;

use crate::error::Result;

use super::deadline::Deadline;
use super::task::Interrupt;

/// A condition variable a task can wait on until signaled, broadcast to,
/// interrupted, or timed out. Unlike `std::sync::Condvar` this carries no
/// associated mutex: callers pair it with their own `tokio::sync::Mutex`
/// guarding the predicate, exactly as the resource manager's sweep
/// coroutine does around its zombie queue.
pub struct CondVar {
    notify: Notify,
}

impl CondVar {
    pub fn new() -> CondVar {
        CondVar {
            notify: Notify::new(),
        }
    }

    /// Suspends the current task until `signal`/`broadcast` is called, or
    /// the task is interrupted.
    pub async fn wait(&self, interrupt: &Interrupt) -> Result<()> {
        interrupt.check()?;

        tokio::select! {
            _ = self.notify.notified() => Ok(()),
            _ = interrupt.wait() => Err(crate::error::Error::interrupted()),
        }
    }

    /// As `wait`, but also returns `TIMEOUT` if `dur` elapses first.
    pub async fn timedwait(&self, dur: Duration, interrupt: &Interrupt) -> Result<()> {
        interrupt.check()?;

        let deadline = Deadline::after(dur);

        tokio::select! {
            _ = self.notify.notified() => Ok(()),
            _ = interrupt.wait() => Err(crate::error::Error::interrupted()),
            _ = deadline.wait() => Err(crate::error::Error::timeout("cond_timedwait")),
        }
    }

    /// Wakes exactly one waiter, if any is currently waiting.
    pub fn signal(&self) {
        self.notify.notify_one();
    }

    /// Wakes every task currently waiting.
    pub fn broadcast(&self) {
        self.notify.notify_waiters();
    }
}

impl Default for CondVar {
    fn default() -> CondVar {
        CondVar::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::task::spawn;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_signal_wakes_one_waiter() {
        let cond = Arc::new(CondVar::new());
        let cond2 = cond.clone();

        let t = spawn(move |interrupt| async move { cond2.wait(&interrupt).await.is_ok() });

        tokio::task::yield_now().await;
        cond.signal();

        assert!(t.join().await.unwrap());
    }

    #[tokio::test]
    async fn test_timedwait_times_out() {
        let cond = CondVar::new();
        let interrupt = crate::runtime::task::spawn(|i| async move { i }).join().await.unwrap();

        let r = cond
            .timedwait(std::time::Duration::from_millis(5), &interrupt)
            .await;

        assert!(r.is_err());
        assert_eq!(r.unwrap_err().kind, crate::error::ErrorKind::Timeout);
    }
}
