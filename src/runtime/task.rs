// Task: a unit of cooperative execution (spec.md S3, "Task")

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Correlation id for a task, unique within the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(pub u64);

/// Shared interrupt flag a task's suspension points observe
#[derive(Clone)]
pub struct Interrupt {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Interrupt {
    fn new() -> Interrupt {
        Interrupt {
            flag: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Sets the sticky interrupt flag and wakes anything waiting on it.
    /// Does not unwind the task; the handler must check `is_set`.
    pub fn set(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Returns an error if the interrupt has already been raised. Every
    /// suspension-point wrapper in this module calls this first so a
    /// task that loops without ever awaiting still observes the flag the
    /// next time it does.
    pub fn check(&self) -> Result<()> {
        if self.is_set() {
            Err(Error::interrupted())
        } else {
            Ok(())
        }
    }

    /// Resolves once `set` is called, or immediately if already set.
    pub async fn wait(&self) {
        if self.is_set() {
            return;
        }
        self.notify.notified().await;
    }
}

/// Handle to a spawned task. Mirrors spec.md's Task attributes: a
/// correlation id, an interrupt flag, and a join point. The stack and
/// machine context are owned by the Tokio executor, not modeled here.
pub struct Task<T> {
    id: TaskId,
    interrupt: Interrupt,
    handle: JoinHandle<T>,
}

impl<T> Task<T> {
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Sets the task's sticky interrupt flag. Every subsequent suspension
    /// point the task passes through will observe `INTERRUPTED`.
    pub fn interrupt(&self) {
        self.interrupt.set();
    }

    /// Waits for the task to complete and returns its result. Joining a
    /// panicked task surfaces a `Resource` error rather than propagating
    /// the panic, since task handlers are expected to fail through
    /// `Result`, not unwinding.
    pub async fn join(self) -> Result<T> {
        self.handle
            .await
            .map_err(|e| Error::new(crate::error::ErrorKind::Resource, format!("task panicked: {e}")))
    }

    pub fn abort(&self) {
        self.handle.abort();
    }
}

/// Spawns a task running `fut`. `fut` receives an `Interrupt` handle it is
/// expected to consult at its suspension points (the `io`/`cond` helpers
/// in this module do this automatically).
pub fn spawn<F, T>(f: impl FnOnce(Interrupt) -> F) -> Task<T>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let id = TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed));
    let interrupt = Interrupt::new();
    let fut = f(interrupt.clone());
    let handle = tokio::spawn(fut);

    Task {
        id,
        interrupt,
        handle,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_join_returns_value() {
        let t = spawn(|_interrupt| async { 41 + 1 });
        assert_eq!(t.join().await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_interrupt_is_observed() {
        let t = spawn(|interrupt| async move {
            interrupt.wait().await;
            interrupt.check().is_err()
        });

        // give the spawned task a chance to start waiting
        tokio::task::yield_now().await;
        t.interrupt();

        assert!(t.join().await.unwrap());
    }
}
