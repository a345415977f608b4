//! Outbound side of a connection.

use crate::http::response::read_full;
use std::{
    fs::File,
    io::{self, Write},
};

/// Writable end of a connection, provided by the transport.
///
/// Writes are ordered and complete: a successful `write_all` means the
/// bytes were accepted in full. After [`close`](Sink::close) every write
/// fails.
pub trait Sink {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Sends the first `len` bytes of `file`.
    ///
    /// Transports with a zero-copy path override this; the default copies
    /// through a buffer. A file shorter than `len` is an `UnexpectedEof`.
    fn send_file(&mut self, file: &mut File, len: u64) -> io::Result<()> {
        let mut buf = [0u8; 8192];
        let mut remaining = len;
        while remaining > 0 {
            let want = buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));
            let n = read_full(file, &mut buf[..want])?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "file ended before its announced length",
                ));
            }
            self.write_all(&buf[..n])?;
            remaining -= n as u64;
        }
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()>;

    /// Closes the connection once pending writes are flushed. Idempotent.
    fn close(&mut self);

    fn is_open(&self) -> bool;
}

/// [`Sink`] over any blocking [`Write`], e.g. a `TcpStream`.
#[derive(Debug)]
pub struct WriteSink<W: Write> {
    inner: Option<W>,
}

impl<W: Write> WriteSink<W> {
    #[inline]
    pub fn new(inner: W) -> Self {
        WriteSink { inner: Some(inner) }
    }

    /// Returns the writer unless the sink was closed.
    #[inline]
    pub fn into_inner(self) -> Option<W> {
        self.inner
    }

    #[inline]
    fn writer(&mut self) -> io::Result<&mut W> {
        self.inner
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "sink is closed"))
    }
}

impl<W: Write> Sink for WriteSink<W> {
    #[inline]
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.writer()?.write_all(bytes)
    }

    #[inline]
    fn flush(&mut self) -> io::Result<()> {
        self.writer()?.flush()
    }

    fn close(&mut self) {
        if let Some(mut inner) = self.inner.take() {
            if let Err(err) = inner.flush() {
                tracing::debug!(%err, "flush on close failed");
            }
        }
    }

    #[inline]
    fn is_open(&self) -> bool {
        self.inner.is_some()
    }
}
