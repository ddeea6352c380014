// Body reader: three framing modes layered on the same buffered stream
// the head parser used, so switching from headers to body never
// re-reads or drops already-buffered bytes.

use tokio::io::AsyncRead;

use crate::buffer::FastBufferedStream;
use crate::error::{Error, Result};
use crate::runtime::{Deadline, Interrupt};

use super::headers::HttpHeaders;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyMode {
    Chunked,
    ContentLength(usize),
    /// Only valid for responses: read until the peer closes the socket.
    UntilClose,
}

/// Picks the body framing mode per RFC 7230 S3.3.3: chunked takes
/// priority over Content-Length; a response with neither reads until
/// close, a request with neither has no body.
fn body_mode(headers: &HttpHeaders, is_response: bool) -> Result<BodyMode> {
    if headers.contains_token("Transfer-Encoding", "chunked") {
        return Ok(BodyMode::Chunked);
    }

    if let Some(len) = headers.get("Content-Length") {
        let len: usize = len
            .trim()
            .parse()
            .map_err(|_| Error::protocol(format!("bad Content-Length value {len:?}")))?;
        return Ok(BodyMode::ContentLength(len));
    }

    if is_response {
        Ok(BodyMode::UntilClose)
    } else {
        Ok(BodyMode::ContentLength(0))
    }
}

/// Reads one HTTP body, fragment by fragment, honoring whichever mode
/// `body_mode` selected. `None` from `next_fragment` means the body (and,
/// for `UntilClose`, the connection) is finished.
pub struct BodyReader {
    mode: BodyMode,
    remaining: usize,
    done: bool,
}

impl BodyReader {
    pub fn for_message(headers: &HttpHeaders, is_response: bool) -> Result<BodyReader> {
        let mode = body_mode(headers, is_response)?;
        let remaining = match mode {
            BodyMode::ContentLength(n) => n,
            _ => 0,
        };

        Ok(BodyReader {
            mode,
            remaining,
            done: matches!(mode, BodyMode::ContentLength(0)),
        })
    }

    /// Reads and returns the next fragment of body bytes, or `None` once
    /// the body is fully delivered.
    pub async fn next_fragment<R: AsyncRead + Unpin>(
        &mut self,
        stream: &mut FastBufferedStream<R>,
        deadline: Deadline,
        interrupt: &Interrupt,
    ) -> Result<Option<Vec<u8>>> {
        if self.done {
            return Ok(None);
        }

        match self.mode {
            BodyMode::ContentLength(_) => {
                let take = self.remaining.min(64 * 1024);
                let fragment = stream.read_slice(take, deadline, interrupt).await?;
                self.remaining -= fragment.len();
                if self.remaining == 0 {
                    self.done = true;
                }
                Ok(Some(fragment))
            }
            BodyMode::Chunked => {
                let size_line = stream.read_until(b'\n', deadline, interrupt).await?;
                let size_line = size_line.strip_suffix(b"\r").unwrap_or(&size_line);
                let size_str = std::str::from_utf8(size_line)
                    .map_err(|_| Error::protocol("chunk size line is not UTF-8"))?;
                // ignore chunk extensions after ';'
                let size_str = size_str.split(';').next().unwrap_or("");
                let size = usize::from_str_radix(size_str.trim(), 16)
                    .map_err(|_| Error::protocol(format!("bad chunk size {size_str:?}")))?;

                if size == 0 {
                    // trailing CRLF after the zero-length chunk; no trailers supported.
                    stream.skip(2, deadline, interrupt).await?;
                    self.done = true;
                    return Ok(None);
                }

                let fragment = stream.read_slice(size, deadline, interrupt).await?;
                stream.skip(2, deadline, interrupt).await?; // trailing CRLF
                Ok(Some(fragment))
            }
            BodyMode::UntilClose => match stream.read_available(64 * 1024, deadline, interrupt).await {
                Ok(got) if !got.is_empty() => Ok(Some(got)),
                Ok(_) => {
                    self.done = true;
                    Ok(None)
                }
                Err(e) if e.is_eof() => {
                    self.done = true;
                    Ok(None)
                }
                Err(e) => Err(e),
            },
        }
    }

    /// Reads the entire body into one buffer. Only sensible for bodies
    /// known to be reasonably small (control/status responses, not
    /// media payloads).
    pub async fn read_to_end<R: AsyncRead + Unpin>(
        &mut self,
        stream: &mut FastBufferedStream<R>,
        deadline: Deadline,
        interrupt: &Interrupt,
    ) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        while let Some(fragment) = self.next_fragment(stream, deadline, interrupt).await? {
            out.extend_from_slice(&fragment);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn harness() -> Interrupt {
        crate::runtime::spawn(|i| async move { i }).join().await.unwrap()
    }

    #[tokio::test]
    async fn test_content_length_body() {
        let interrupt = harness().await;
        let mut headers = HttpHeaders::new();
        headers.push("Content-Length", "5");

        let wire = b"helloXXXX";
        let mut stream = FastBufferedStream::new(&wire[..]);
        let mut reader = BodyReader::for_message(&headers, false).unwrap();

        let body = reader
            .read_to_end(&mut stream, Deadline::never(), &interrupt)
            .await
            .unwrap();
        assert_eq!(body, b"hello");
    }

    #[tokio::test]
    async fn test_chunked_body() {
        let interrupt = harness().await;
        let mut headers = HttpHeaders::new();
        headers.push("Transfer-Encoding", "chunked");

        let wire = b"4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n";
        let mut stream = FastBufferedStream::new(&wire[..]);
        let mut reader = BodyReader::for_message(&headers, false).unwrap();

        let body = reader
            .read_to_end(&mut stream, Deadline::never(), &interrupt)
            .await
            .unwrap();
        assert_eq!(body, b"Wikipedia");
    }

    #[tokio::test]
    async fn test_until_close_body_reads_to_eof() {
        let interrupt = harness().await;
        let headers = HttpHeaders::new();

        let wire = b"all the remaining bytes";
        let mut stream = FastBufferedStream::new(&wire[..]);
        let mut reader = BodyReader::for_message(&headers, true).unwrap();

        let body = reader
            .read_to_end(&mut stream, Deadline::never(), &interrupt)
            .await
            .unwrap();
        assert_eq!(body, wire);
    }

    #[tokio::test]
    async fn test_request_with_no_framing_has_empty_body() {
        let interrupt = harness().await;
        let headers = HttpHeaders::new();

        let wire = b"";
        let mut stream = FastBufferedStream::new(&wire[..]);
        let mut reader = BodyReader::for_message(&headers, false).unwrap();

        let body = reader
            .read_to_end(&mut stream, Deadline::never(), &interrupt)
            .await
            .unwrap();
        assert!(body.is_empty());
    }
}
