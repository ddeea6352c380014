// Error taxonomy shared across the runtime, the RTMP stack and the HTTP stack

use std::fmt;

/// Abstract error kind, independent of the underlying cause
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A deadline fired before the operation completed
    Timeout,

    /// The task was interrupted while suspended
    Interrupted,

    /// A read/write/accept syscall failed for a reason other than would-block
    SocketIo,

    /// Graceful peer close, or end of a length-framed body
    Eof,

    /// Malformed chunk header, bad AMF0, impossible state transition, ...
    Protocol,

    /// Complex handshake digest mismatch under both schemas
    Handshake,

    /// Allocation failure or descriptor exhaustion
    Resource,

    /// A `_error` response instructed the client to reconnect elsewhere
    ControlRedirect,

    /// Feature disabled by configuration
    Disabled,

    /// Identifier not found
    NotFound,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::Interrupted => "INTERRUPTED",
            ErrorKind::SocketIo => "SOCKET_IO",
            ErrorKind::Eof => "EOF",
            ErrorKind::Protocol => "PROTOCOL",
            ErrorKind::Handshake => "HANDSHAKE",
            ErrorKind::Resource => "RESOURCE",
            ErrorKind::ControlRedirect => "CONTROL_REDIRECT",
            ErrorKind::Disabled => "DISABLED",
            ErrorKind::NotFound => "NOT_FOUND",
        };
        write!(f, "{}", s)
    }
}

/// Crate-wide error type. Carries a kind, a human-readable message and an
/// optional wrapped cause, so each layer can add context without losing the
/// original failure (e.g. "read chunk header" wrapping a `SocketIo` error).
#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Error {
        Error {
            kind,
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(
        kind: ErrorKind,
        message: impl Into<String>,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Error {
        Error {
            kind,
            message: message.into(),
            cause: Some(Box::new(cause)),
        }
    }

    /// Wraps this error with additional context, preserving the kind
    pub fn context(self, context: impl Into<String>) -> Error {
        let message = format!("{}: {}", context.into(), self.message);
        Error {
            kind: self.kind,
            message,
            cause: self.cause,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Error {
        Error::new(ErrorKind::Timeout, message)
    }

    pub fn interrupted() -> Error {
        Error::new(ErrorKind::Interrupted, "task was interrupted")
    }

    pub fn eof(message: impl Into<String>) -> Error {
        Error::new(ErrorKind::Eof, message)
    }

    pub fn protocol(message: impl Into<String>) -> Error {
        Error::new(ErrorKind::Protocol, message)
    }

    pub fn not_found(message: impl Into<String>) -> Error {
        Error::new(ErrorKind::NotFound, message)
    }

    pub fn is_eof(&self) -> bool {
        self.kind == ErrorKind::Eof
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause.as_ref().map(|c| c.as_ref() as _)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error {
        let kind = match e.kind() {
            std::io::ErrorKind::UnexpectedEof => ErrorKind::Eof,
            std::io::ErrorKind::TimedOut => ErrorKind::Timeout,
            _ => ErrorKind::SocketIo,
        };
        Error::with_cause(kind, "io error", e)
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(e: tokio::time::error::Elapsed) -> Error {
        Error::with_cause(ErrorKind::Timeout, "deadline elapsed", e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
