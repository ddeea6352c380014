// HTTP/1.x head parser, driven as a small table of states over lines
// pulled off a `FastBufferedStream`: message_begin -> url (request-line)
// / status-line -> header_field/header_value (repeated) ->
// headers_complete. Body reading is a separate step (see body.rs) so a
// caller can stream it without buffering the whole message.

use tokio::io::AsyncRead;

use crate::buffer::FastBufferedStream;
use crate::error::{Error, Result};
use crate::runtime::{Deadline, Interrupt};

use super::headers::HttpHeaders;

#[derive(Debug, Clone)]
pub struct HttpRequestHead {
    pub method: String,
    pub url: String,
    pub version_major: u8,
    pub version_minor: u8,
    pub headers: HttpHeaders,
}

#[derive(Debug, Clone)]
pub struct HttpResponseHead {
    pub status: u16,
    pub reason: String,
    pub version_major: u8,
    pub version_minor: u8,
    pub headers: HttpHeaders,
}

fn parse_version(token: &str) -> Result<(u8, u8)> {
    let rest = token
        .strip_prefix("HTTP/")
        .ok_or_else(|| Error::protocol(format!("bad HTTP version token {token:?}")))?;

    let (major, minor) = rest
        .split_once('.')
        .ok_or_else(|| Error::protocol(format!("bad HTTP version token {token:?}")))?;

    let major: u8 = major
        .parse()
        .map_err(|_| Error::protocol("non-numeric HTTP major version"))?;
    let minor: u8 = minor
        .parse()
        .map_err(|_| Error::protocol("non-numeric HTTP minor version"))?;

    Ok((major, minor))
}

async fn read_line<R: AsyncRead + Unpin>(
    stream: &mut FastBufferedStream<R>,
    deadline: Deadline,
    interrupt: &Interrupt,
) -> Result<String> {
    let raw = stream.read_until(b'\n', deadline, interrupt).await?;
    let trimmed = raw.strip_suffix(b"\r").unwrap_or(&raw);
    String::from_utf8(trimmed.to_vec()).map_err(|_| Error::protocol("header line is not valid UTF-8"))
}

/// Reads `header_field`/`header_value` lines (the `HeaderField` ->
/// `HeaderValue` -> `HeaderField` ... cycle) until the blank line that
/// marks `HeadersComplete`.
async fn read_headers<R: AsyncRead + Unpin>(
    stream: &mut FastBufferedStream<R>,
    deadline: Deadline,
    interrupt: &Interrupt,
) -> Result<HttpHeaders> {
    let mut headers = HttpHeaders::new();

    loop {
        let line = read_line(stream, deadline, interrupt).await?;
        if line.is_empty() {
            return Ok(headers);
        }

        let (field, value) = line
            .split_once(':')
            .ok_or_else(|| Error::protocol(format!("malformed header line {line:?}")))?;

        headers.push(field.trim(), value.trim());
    }
}

/// Parses `message_begin` through `headers_complete` for a request.
pub async fn parse_request_head<R: AsyncRead + Unpin>(
    stream: &mut FastBufferedStream<R>,
    deadline: Deadline,
    interrupt: &Interrupt,
) -> Result<HttpRequestHead> {
    let request_line = read_line(stream, deadline, interrupt).await?;
    let mut parts = request_line.split(' ');

    let method = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::protocol("empty request line"))?
        .to_string();
    let url = parts
        .next()
        .ok_or_else(|| Error::protocol("request line missing URL"))?
        .to_string();
    let version_token = parts
        .next()
        .ok_or_else(|| Error::protocol("request line missing HTTP version"))?;
    let (version_major, version_minor) = parse_version(version_token)?;

    let headers = read_headers(stream, deadline, interrupt).await?;

    Ok(HttpRequestHead {
        method,
        url,
        version_major,
        version_minor,
        headers,
    })
}

/// Parses `message_begin` through `headers_complete` for a response.
pub async fn parse_response_head<R: AsyncRead + Unpin>(
    stream: &mut FastBufferedStream<R>,
    deadline: Deadline,
    interrupt: &Interrupt,
) -> Result<HttpResponseHead> {
    let status_line = read_line(stream, deadline, interrupt).await?;
    let mut parts = status_line.splitn(3, ' ');

    let version_token = parts
        .next()
        .ok_or_else(|| Error::protocol("empty status line"))?;
    let (version_major, version_minor) = parse_version(version_token)?;

    let status: u16 = parts
        .next()
        .ok_or_else(|| Error::protocol("status line missing status code"))?
        .parse()
        .map_err(|_| Error::protocol("non-numeric status code"))?;
    let reason = parts.next().unwrap_or("").to_string();

    let headers = read_headers(stream, deadline, interrupt).await?;

    Ok(HttpResponseHead {
        status,
        reason,
        version_major,
        version_minor,
        headers,
    })
}

/// Derives keep-alive from protocol version and the `Connection` header:
/// HTTP/1.1 defaults to keep-alive unless `Connection: close` is present;
/// HTTP/1.0 defaults to close unless `Connection: keep-alive` is present.
pub fn is_keep_alive(version_major: u8, version_minor: u8, headers: &HttpHeaders) -> bool {
    let http_1_1_or_later = version_major > 1 || (version_major == 1 && version_minor >= 1);

    if headers.contains_token("Connection", "close") {
        false
    } else if headers.contains_token("Connection", "keep-alive") {
        true
    } else {
        http_1_1_or_later
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn harness() -> Interrupt {
        crate::runtime::spawn(|i| async move { i }).join().await.unwrap()
    }

    #[tokio::test]
    async fn test_parse_request_head() {
        let interrupt = harness().await;
        let wire = b"POST /app/stream?token=abc HTTP/1.1\r\nHost: example.com\r\nContent-Length: 5\r\n\r\n";
        let mut stream = FastBufferedStream::new(&wire[..]);

        let head = parse_request_head(&mut stream, Deadline::never(), &interrupt)
            .await
            .unwrap();

        assert_eq!(head.method, "POST");
        assert_eq!(head.url, "/app/stream?token=abc");
        assert_eq!((head.version_major, head.version_minor), (1, 1));
        assert_eq!(head.headers.get("Host"), Some("example.com"));
        assert_eq!(head.headers.get("content-length"), Some("5"));
    }

    #[tokio::test]
    async fn test_parse_response_head() {
        let interrupt = harness().await;
        let wire = b"HTTP/1.0 404 Not Found\r\nConnection: keep-alive\r\n\r\n";
        let mut stream = FastBufferedStream::new(&wire[..]);

        let head = parse_response_head(&mut stream, Deadline::never(), &interrupt)
            .await
            .unwrap();

        assert_eq!(head.status, 404);
        assert_eq!(head.reason, "Not Found");
        assert!(is_keep_alive(head.version_major, head.version_minor, &head.headers));
    }

    #[tokio::test]
    async fn test_keep_alive_defaults() {
        let empty = HttpHeaders::new();
        assert!(is_keep_alive(1, 1, &empty));
        assert!(!is_keep_alive(1, 0, &empty));
    }
}
