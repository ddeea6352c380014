// Non-blocking I/O helpers: attempt the operation, suspend the task on
// would-block, resume on readiness/timeout/interrupt (spec.md S4.1).
//
// Tokio's own `AsyncRead`/`AsyncWrite` futures already encode "suspend on
// would-block, resume on readiness" - that is what the reactor does. What
// this module adds is the two extra suspension sources spec.md requires
// every I/O call to observe: a deadline and a cooperative interrupt flag.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

use crate::error::{Error, ErrorKind, Result};

use super::deadline::Deadline;
use super::task::Interrupt;

async fn race<T>(
    op: impl std::future::Future<Output = std::io::Result<T>>,
    deadline: Deadline,
    interrupt: &Interrupt,
) -> Result<T> {
    interrupt.check()?;

    tokio::select! {
        r = op => Ok(r?),
        _ = interrupt.wait() => Err(Error::interrupted()),
        _ = deadline.wait() => Err(Error::timeout("i/o deadline elapsed")),
    }
}

/// Reads at most `buf.len()` bytes. Returns the number of bytes read (0 at EOF).
pub async fn read<R: AsyncRead + Unpin>(
    stream: &mut R,
    buf: &mut [u8],
    deadline: Deadline,
    interrupt: &Interrupt,
) -> Result<usize> {
    race(stream.read(buf), deadline, interrupt).await
}

/// Reads until `buf` is completely filled or the deadline/interrupt fires.
pub async fn read_fully<R: AsyncRead + Unpin>(
    stream: &mut R,
    buf: &mut [u8],
    deadline: Deadline,
    interrupt: &Interrupt,
) -> Result<()> {
    race(stream.read_exact(buf), deadline, interrupt).await?;
    Ok(())
}

/// Writes `buf`, possibly across multiple underlying writes.
pub async fn write_fully<W: AsyncWrite + Unpin>(
    stream: &mut W,
    buf: &[u8],
    deadline: Deadline,
    interrupt: &Interrupt,
) -> Result<()> {
    race(stream.write_all(buf), deadline, interrupt).await
}

/// Accepts a connection on `listener`.
pub async fn accept(
    listener: &TcpListener,
    deadline: Deadline,
    interrupt: &Interrupt,
) -> Result<(TcpStream, std::net::SocketAddr)> {
    race(listener.accept(), deadline, interrupt).await
}

/// Process-wide lock serializing `accept` calls on one listener, guarding
/// against the thundering-herd wakeup some platforms exhibit when many
/// tasks call `accept` on the same descriptor. On platforms/kernels that
/// already wake exactly one waiter this is a harmless no-op beyond the
/// lock/unlock pair.
#[derive(Clone)]
pub struct AcceptGuard {
    lock: Arc<Mutex<()>>,
}

impl AcceptGuard {
    pub fn new() -> AcceptGuard {
        AcceptGuard {
            lock: Arc::new(Mutex::new(())),
        }
    }
}

impl Default for AcceptGuard {
    fn default() -> AcceptGuard {
        AcceptGuard::new()
    }
}

/// Calls `accept` under the guard's lock.
pub async fn serialize_accept(
    guard: &AcceptGuard,
    listener: &TcpListener,
    deadline: Deadline,
    interrupt: &Interrupt,
) -> Result<(TcpStream, std::net::SocketAddr)> {
    let _permit = guard.lock.lock().await;
    accept(listener, deadline, interrupt).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    #[tokio::test]
    async fn test_read_fully_round_trip() {
        let (mut client, mut server) = tokio::io::duplex(64);

        let writer = tokio::spawn(async move {
            tokio::io::AsyncWriteExt::write_all(&mut client, b"hello").await.unwrap();
        });

        let t = crate::runtime::task::spawn(move |interrupt| async move {
            let mut buf = [0u8; 5];
            read_fully(&mut server, &mut buf, Deadline::never(), &interrupt)
                .await
                .unwrap();
            buf
        });

        writer.await.unwrap();
        assert_eq!(&t.join().await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_read_times_out() {
        let (mut _client, mut server) = tokio::io::duplex(64);

        let t = crate::runtime::task::spawn(move |interrupt| async move {
            let mut buf = [0u8; 5];
            read_fully(
                &mut server,
                &mut buf,
                Deadline::after(StdDuration::from_millis(5)),
                &interrupt,
            )
            .await
        });

        let r = t.join().await.unwrap();
        assert!(r.is_err());
        assert_eq!(r.unwrap_err().kind, ErrorKind::Timeout);
    }
}
