// RTMP protocol core: cooperative runtime, buffered stream, AMF0 codec,
// chunk/message/packet layers, complex handshake, resource manager,
// shared-payload message, buffered HTTP parser/writer and system
// utilities. The outer server (connection accept loop, control-plane
// callbacks, stats) is deliberately not part of this crate; see
// `DESIGN.md`.

pub mod amf;
pub mod buffer;
pub mod config;
pub mod error;
pub mod http;
pub mod log;
pub mod resource;
pub mod rtmp;
pub mod runtime;
pub mod shared_message;
pub mod sysutil;
pub mod utils;

pub use error::{Error, ErrorKind, Result};
