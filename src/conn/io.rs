//! The byte-stream I/O adapter: input/output buffers over any
//! `AsyncRead + AsyncWrite` duplex stream (plain TCP, Unix socket, or a
//! TLS-wrapped stream), with an optional read-idle timeout.

use bytes::{Buf, BytesMut};
use std::io;
use std::pin::Pin;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const READ_CHUNK: usize = 8 * 1024;

trait AsyncDuplex: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncDuplex for T {}

/// What came back from a single adapter poll.
pub(crate) enum IoEvent {
    /// Bytes were appended to the input buffer.
    Readable(usize),
    /// The peer closed its write half (EOF).
    Eof,
    /// The read timed out without any bytes arriving.
    TimedOut,
}

pub(crate) struct ConnIo {
    stream: Pin<Box<dyn AsyncDuplex>>,
    pub(crate) in_buf: BytesMut,
    pub(crate) out_buf: BytesMut,
    read_timeout: Option<Duration>,
    last_error: Option<String>,
}

impl ConnIo {
    pub(crate) fn new(stream: impl AsyncRead + AsyncWrite + Unpin + Send + 'static) -> Self {
        ConnIo {
            stream: Box::pin(stream),
            in_buf: BytesMut::with_capacity(READ_CHUNK),
            out_buf: BytesMut::new(),
            read_timeout: None,
            last_error: None,
        }
    }

    #[cfg(test)]
    pub(crate) fn for_test() -> Self {
        let (a, _b) = tokio::io::duplex(64 * 1024);
        ConnIo::new(a)
    }

    pub(crate) fn set_read_timeout(&mut self, timeout: Option<Duration>) {
        self.read_timeout = timeout;
    }

    /// Reads whatever is available into `in_buf`. Returns `Eof` on a clean
    /// peer shutdown and `TimedOut` if `read_timeout` elapses first.
    pub(crate) async fn poll_read(&mut self) -> io::Result<IoEvent> {
        let mut chunk = [0u8; READ_CHUNK];
        let read = match self.read_timeout {
            Some(dur) => match tokio::time::timeout(dur, self.stream.read(&mut chunk)).await {
                Ok(Ok(n)) => n,
                Ok(Err(e)) => {
                    self.record_error(&e);
                    return Err(e);
                }
                Err(_elapsed) => return Ok(IoEvent::TimedOut),
            },
            None => match self.stream.read(&mut chunk).await {
                Ok(n) => n,
                Err(e) => {
                    self.record_error(&e);
                    return Err(e);
                }
            },
        };
        if read == 0 {
            return Ok(IoEvent::Eof);
        }
        self.in_buf.extend_from_slice(&chunk[..read]);
        Ok(IoEvent::Readable(read))
    }

    /// Writes as much of `out_buf` as the stream will accept right now.
    pub(crate) async fn flush_write(&mut self) -> io::Result<()> {
        while !self.out_buf.is_empty() {
            let written = match self.stream.write(&self.out_buf).await {
                Ok(n) => n,
                Err(e) => {
                    self.record_error(&e);
                    return Err(e);
                }
            };
            if written == 0 {
                let e = io::Error::new(io::ErrorKind::WriteZero, "write returned 0");
                self.record_error(&e);
                return Err(e);
            }
            self.out_buf.advance(written);
        }
        match self.stream.flush().await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.record_error(&e);
                Err(e)
            }
        }
    }

    pub(crate) fn queue_output(&mut self, bytes: &[u8]) {
        self.out_buf.extend_from_slice(bytes);
    }

    pub(crate) fn output_pending(&self) -> bool {
        !self.out_buf.is_empty()
    }

    fn record_error(&mut self, e: &io::Error) {
        self.last_error = Some(e.to_string());
    }

    /// Takes whatever I/O error (including a TLS handshake/record error
    /// surfaced through the adapter's `AsyncRead`/`AsyncWrite` impl) was last
    /// observed on this connection, clearing it. Used once at teardown to
    /// report a pending TLS error.
    pub(crate) fn take_last_error(&mut self) -> Option<String> {
        self.last_error.take()
    }

    pub(crate) async fn shutdown(&mut self) {
        let _ = self.stream.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn read_then_write_roundtrip() {
        let (mut client, server) = tokio::io::duplex(1024);
        let mut io = ConnIo::new(server);

        client.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();
        let ev = io.poll_read().await.unwrap();
        assert!(matches!(ev, IoEvent::Readable(n) if n > 0));
        assert_eq!(&io.in_buf[..], b"GET / HTTP/1.1\r\n\r\n");

        io.queue_output(b"HTTP/1.1 200 OK\r\n\r\n");
        io.flush_write().await.unwrap();

        let mut buf = [0u8; 64];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"HTTP/1.1 200 OK\r\n\r\n");
    }

    #[tokio::test]
    async fn eof_is_reported() {
        let (client, server) = tokio::io::duplex(16);
        drop(client);
        let mut io = ConnIo::new(server);
        let ev = io.poll_read().await.unwrap();
        assert!(matches!(ev, IoEvent::Eof));
    }
}
