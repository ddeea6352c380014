// RTMP protocol utilities

mod chunk;
mod command;
mod constants;
mod data;
mod dh;
mod handshake;
mod message;
mod packet;

pub use chunk::*;
pub use command::*;
pub use constants::*;
pub use data::*;
pub use dh::DhKeyPair;
pub use handshake::*;
pub use message::*;
pub use packet::*;
