// Buffered HTTP/1.0 and HTTP/1.1 parsing and writing, layered on
// `buffer::FastBufferedStream` exactly as the RTMP chunk reader is, so
// the control-plane HTTP surface (stream key validation, status pages)
// shares the same I/O primitives as the media path instead of pulling in
// a second stream abstraction.

mod body;
mod headers;
mod parser;
mod url;
mod writer;

pub use body::BodyReader;
pub use headers::HttpHeaders;
pub use parser::{is_keep_alive, parse_request_head, parse_response_head, HttpRequestHead, HttpResponseHead};
pub use url::{original_client_ip, parse_rtmp_url, RtmpUrl};
pub use writer::{serialize_request_head, serialize_response_head, BodyWriter};
