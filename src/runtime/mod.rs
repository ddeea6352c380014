// Cooperative-scheduling vocabulary, built on top of the Tokio executor.
//
// The teacher repo spawns a plain `tokio::spawn` per connection and
// coordinates sessions with ad hoc `mpsc` channels and `Mutex`-guarded
// status structs (see the old `session` and `server` modules). This module
// generalizes that pattern: every connection/session task is a `Task`
// carrying an interrupt flag and a correlation id, every blocking point is
// a deadline-aware wrapper, and `CondVar` gives the resource manager and
// the message layer a single way to wait on "something changed".

mod cond;
mod deadline;
mod io;
mod task;

pub use cond::CondVar;
pub use deadline::Deadline;
pub use io::{accept, read, read_fully, serialize_accept, write_fully, AcceptGuard};
pub use task::{spawn, Interrupt, Task, TaskId};
