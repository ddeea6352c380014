// Response head serialization and the vectored body writer: either
// Content-Length framing (caller already knows the size) or transparent
// chunked encoding, batching the chunk-size line, CRLF, payload and
// trailing CRLF into one vectored write so the kernel sees one syscall
// per fragment instead of four.

use super::headers::HttpHeaders;

pub fn serialize_request_head(method: &str, url: &str, headers: &HttpHeaders) -> Vec<u8> {
    let mut out = format!("{method} {url} HTTP/1.1\r\n").into_bytes();
    write_headers(&mut out, headers);
    out
}

pub fn serialize_response_head(status: u16, reason: &str, headers: &HttpHeaders) -> Vec<u8> {
    let mut out = format!("HTTP/1.1 {status} {reason}\r\n").into_bytes();
    write_headers(&mut out, headers);
    out
}

fn write_headers(out: &mut Vec<u8>, headers: &HttpHeaders) {
    for (name, value) in headers.iter() {
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"\r\n");
}

/// Frames a body either by `Content-Length` (the caller already wrote a
/// fixed-size body with no further framing needed) or by chunked
/// transfer-encoding.
pub struct BodyWriter {
    chunked: bool,
}

impl BodyWriter {
    /// Picks the framing mode for a body of `content_length` bytes. Pass
    /// `None` when the length is not known up front; this selects
    /// chunked encoding and sets `Transfer-Encoding: chunked` on
    /// `headers`. Otherwise sets `Content-Length` on `headers`.
    pub fn new(headers: &mut HttpHeaders, content_length: Option<usize>) -> BodyWriter {
        match content_length {
            Some(len) => {
                headers.set("Content-Length", len.to_string());
                BodyWriter { chunked: false }
            }
            None => {
                headers.set("Transfer-Encoding", "chunked");
                BodyWriter { chunked: true }
            }
        }
    }

    /// Returns the vectored buffers for one body fragment. Write these
    /// to the socket with a single `writev` call; do not insert anything
    /// between them.
    pub fn write(&self, data: &[u8]) -> Vec<Vec<u8>> {
        if self.chunked {
            vec![
                format!("{:x}\r\n", data.len()).into_bytes(),
                data.to_vec(),
                b"\r\n".to_vec(),
            ]
        } else {
            vec![data.to_vec()]
        }
    }

    /// Final marker for chunked encoding; empty for Content-Length
    /// framing, where the byte count already told the peer where the
    /// body ends.
    pub fn finish(&self) -> Vec<u8> {
        if self.chunked {
            b"0\r\n\r\n".to_vec()
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_response_head() {
        let mut headers = HttpHeaders::new();
        headers.push("Content-Type", "text/plain");

        let wire = serialize_response_head(200, "OK", &headers);
        let text = String::from_utf8(wire).unwrap();

        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Type: text/plain\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_content_length_write_is_passthrough() {
        let mut headers = HttpHeaders::new();
        let writer = BodyWriter::new(&mut headers, Some(5));

        assert_eq!(headers.get("Content-Length"), Some("5"));
        assert_eq!(writer.write(b"hello"), vec![b"hello".to_vec()]);
        assert!(writer.finish().is_empty());
    }

    #[test]
    fn test_chunked_write_frames_each_fragment() {
        let mut headers = HttpHeaders::new();
        let writer = BodyWriter::new(&mut headers, None);

        assert_eq!(headers.get("Transfer-Encoding"), Some("chunked"));

        let framed = writer.write(b"Wiki");
        assert_eq!(framed, vec![b"4\r\n".to_vec(), b"Wiki".to_vec(), b"\r\n".to_vec()]);
        assert_eq!(writer.finish(), b"0\r\n\r\n".to_vec());
    }
}
