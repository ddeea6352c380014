// AMF parsers and serializers

mod amf0;
mod amf3;
mod decode;

pub use amf0::*;
pub use amf3::*;
pub use decode::*;
