// Fast buffered stream: a growable read buffer sitting in front of an
// AsyncRead, so the chunk/HTTP parsers can peek/consume without a syscall
// per header byte (spec.md S5).

use tokio::io::AsyncRead;

use crate::error::Result;
use crate::runtime::{Deadline, Interrupt};

/// Buffers bytes read from `R` so callers can request `n` bytes at a time
/// without re-issuing a syscall for every header field. Never re-reads
/// bytes already delivered to a caller: `read_slice`/`skip` both advance
/// the logical read cursor.
pub struct FastBufferedStream<R> {
    inner: R,
    buf: Vec<u8>,
    /// Index of the first unconsumed byte
    start: usize,
    /// Index one past the last buffered byte
    end: usize,
}

const DEFAULT_CAPACITY: usize = 4096;

impl<R: AsyncRead + Unpin> FastBufferedStream<R> {
    pub fn new(inner: R) -> FastBufferedStream<R> {
        FastBufferedStream {
            inner,
            buf: vec![0u8; DEFAULT_CAPACITY],
            start: 0,
            end: 0,
        }
    }

    /// Bytes currently buffered and not yet consumed
    pub fn size(&self) -> usize {
        self.end - self.start
    }

    fn buffered(&self) -> &[u8] {
        &self.buf[self.start..self.end]
    }

    /// Ensures at least `n` bytes are buffered, reading from the
    /// underlying stream as needed.
    pub async fn grow(&mut self, n: usize, deadline: Deadline, interrupt: &Interrupt) -> Result<()> {
        if self.size() >= n {
            return Ok(());
        }

        self.compact_if_needed(n);

        if self.buf.len() < n {
            self.buf.resize(n.next_power_of_two().max(DEFAULT_CAPACITY), 0);
        }

        while self.size() < n {
            let read = crate::runtime::io::read(
                &mut self.inner,
                &mut self.buf[self.end..],
                deadline,
                interrupt,
            )
            .await?;

            if read == 0 {
                return Err(crate::error::Error::eof("peer closed while filling buffer"));
            }

            self.end += read;
        }

        Ok(())
    }

    /// Shifts remaining bytes to the start of the backing array, and grows
    /// the backing array if it cannot hold `n` bytes even after compaction.
    fn compact_if_needed(&mut self, n: usize) {
        if self.start > 0 {
            self.buf.copy_within(self.start..self.end, 0);
            self.end -= self.start;
            self.start = 0;
        }

        if self.buf.len() < n {
            self.buf.resize(n, 0);
        }
    }

    /// Returns a view of the next `n` buffered bytes without consuming them.
    /// Caller must have already called `grow(n, ...)`.
    pub fn bytes(&self, n: usize) -> &[u8] {
        &self.buffered()[..n]
    }

    /// Consumes and returns the next `n` buffered bytes.
    pub async fn read_slice(
        &mut self,
        n: usize,
        deadline: Deadline,
        interrupt: &Interrupt,
    ) -> Result<Vec<u8>> {
        self.grow(n, deadline, interrupt).await?;
        let out = self.buffered()[..n].to_vec();
        self.start += n;
        Ok(out)
    }

    /// Consumes `n` bytes without returning them.
    pub async fn skip(&mut self, n: usize, deadline: Deadline, interrupt: &Interrupt) -> Result<()> {
        self.grow(n, deadline, interrupt).await?;
        self.start += n;
        Ok(())
    }

    /// Reads a single byte.
    pub async fn read_u8(&mut self, deadline: Deadline, interrupt: &Interrupt) -> Result<u8> {
        self.grow(1, deadline, interrupt).await?;
        let b = self.buffered()[0];
        self.start += 1;
        Ok(b)
    }

    /// Reads and consumes bytes up to the first occurrence of `delim`,
    /// which is also consumed but not included in the returned bytes.
    /// Used by the HTTP parser to pull one line at a time off the wire.
    pub async fn read_until(
        &mut self,
        delim: u8,
        deadline: Deadline,
        interrupt: &Interrupt,
    ) -> Result<Vec<u8>> {
        let mut scanned = 0usize;

        loop {
            self.grow(scanned + 1, deadline, interrupt).await?;
            let avail = self.size();
            let window = self.bytes(avail);

            if let Some(rel_pos) = window[scanned..].iter().position(|&b| b == delim) {
                let pos = scanned + rel_pos;
                let line = self.read_slice(pos, deadline, interrupt).await?;
                self.skip(1, deadline, interrupt).await?;
                return Ok(line);
            }

            scanned = avail;
        }
    }

    /// Reads up to `max` bytes without waiting for more than whatever is
    /// already buffered or the next single read syscall delivers. Used
    /// for length-unknown bodies, where the caller wants "whatever
    /// arrived" rather than a fixed count.
    pub async fn read_available(
        &mut self,
        max: usize,
        deadline: Deadline,
        interrupt: &Interrupt,
    ) -> Result<Vec<u8>> {
        if self.size() == 0 {
            self.grow(1, deadline, interrupt).await?;
        }
        let take = self.size().min(max);
        self.read_slice(take, deadline, interrupt).await
    }

    pub fn empty(&self) -> bool {
        self.size() == 0
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn no_interrupt_stream<R: AsyncRead + Unpin>(
        inner: R,
    ) -> (FastBufferedStream<R>, Interrupt) {
        let t = crate::runtime::spawn(|i| async move { i });
        let interrupt = t.join().await.unwrap();
        (FastBufferedStream::new(inner), interrupt)
    }

    #[tokio::test]
    async fn test_read_slice_consumes_bytes() {
        let data = b"hello world".to_vec();
        let (mut stream, interrupt) = no_interrupt_stream(&data[..]).await;

        let first = stream
            .read_slice(5, Deadline::never(), &interrupt)
            .await
            .unwrap();
        assert_eq!(first, b"hello");

        stream.skip(1, Deadline::never(), &interrupt).await.unwrap();

        let rest = stream
            .read_slice(5, Deadline::never(), &interrupt)
            .await
            .unwrap();
        assert_eq!(rest, b"world");
    }

    #[tokio::test]
    async fn test_grow_across_multiple_reads() {
        let data = vec![7u8; 10_000];
        let (mut stream, interrupt) = no_interrupt_stream(&data[..]).await;

        let chunk = stream
            .read_slice(10_000, Deadline::never(), &interrupt)
            .await
            .unwrap();
        assert_eq!(chunk.len(), 10_000);
        assert!(chunk.iter().all(|&b| b == 7));
    }

    #[tokio::test]
    async fn test_read_until_splits_on_delimiter() {
        let data = b"GET / HTTP/1.1\r\nHost: x\r\n\r\n".to_vec();
        let (mut stream, interrupt) = no_interrupt_stream(&data[..]).await;

        let line = stream
            .read_until(b'\n', Deadline::never(), &interrupt)
            .await
            .unwrap();
        assert_eq!(line, b"GET / HTTP/1.1\r");

        let line2 = stream
            .read_until(b'\n', Deadline::never(), &interrupt)
            .await
            .unwrap();
        assert_eq!(line2, b"Host: x\r");
    }

    #[tokio::test]
    async fn test_eof_before_enough_bytes_errors() {
        let data = b"abc".to_vec();
        let (mut stream, interrupt) = no_interrupt_stream(&data[..]).await;

        let r = stream.read_slice(10, Deadline::never(), &interrupt).await;
        assert!(r.is_err());
        assert!(r.unwrap_err().is_eof());
    }
}
