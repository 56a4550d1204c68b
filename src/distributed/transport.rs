//! Byte transport capability
//!
//! The engines only need a reliable, ordered byte stream. Anything that is
//! `AsyncRead + AsyncWrite + Unpin + Send` qualifies: TCP streams in
//! production, `tokio::io::duplex` pairs and [`FaultyStream`] in tests.
//!
//! Reads and writes block until the transport completes or fails. There is
//! no timeout anywhere on this path: a silent peer blocks its counterpart
//! indefinitely.

use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Reliable ordered byte transport
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// Stream wrapper with injectable faults
///
/// Wraps any transport and can:
/// - Cap the size of each read or write (forces partial transfers)
/// - Return `Interrupted` a number of times before real I/O
/// - Report end of stream after a number of bytes were read
/// - Fail with `ConnectionReset` after a number of bytes were read
/// - Refuse further writes (zero-length write) after a number of bytes
#[derive(Debug)]
pub struct FaultyStream<S> {
    inner: S,
    read_chunk: Option<usize>,
    write_chunk: Option<usize>,
    read_interrupts: usize,
    write_interrupts: usize,
    close_reads_after: Option<usize>,
    fail_reads_after: Option<usize>,
    close_writes_after: Option<usize>,
    bytes_read: usize,
    bytes_written: usize,
}

impl<S> FaultyStream<S> {
    /// Wrap a stream with no faults enabled
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            read_chunk: None,
            write_chunk: None,
            read_interrupts: 0,
            write_interrupts: 0,
            close_reads_after: None,
            fail_reads_after: None,
            close_writes_after: None,
            bytes_read: 0,
            bytes_written: 0,
        }
    }

    pub fn with_read_chunk(mut self, max: usize) -> Self {
        self.read_chunk = Some(max.max(1));
        self
    }

    pub fn with_write_chunk(mut self, max: usize) -> Self {
        self.write_chunk = Some(max.max(1));
        self
    }

    pub fn interrupt_reads(mut self, count: usize) -> Self {
        self.read_interrupts = count;
        self
    }

    pub fn interrupt_writes(mut self, count: usize) -> Self {
        self.write_interrupts = count;
        self
    }

    /// Simulate the peer closing after `bytes` have been read
    pub fn close_reads_after(mut self, bytes: usize) -> Self {
        self.close_reads_after = Some(bytes);
        self
    }

    /// Simulate a transport failure after `bytes` have been read
    pub fn fail_reads_after(mut self, bytes: usize) -> Self {
        self.fail_reads_after = Some(bytes);
        self
    }

    /// Simulate a peer that stops accepting data after `bytes` were written
    pub fn close_writes_after(mut self, bytes: usize) -> Self {
        self.close_writes_after = Some(bytes);
        self
    }

    pub fn bytes_read(&self) -> usize {
        self.bytes_read
    }

    pub fn bytes_written(&self) -> usize {
        self.bytes_written
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for FaultyStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        if this.read_interrupts > 0 {
            this.read_interrupts -= 1;
            return Poll::Ready(Err(io::Error::from(io::ErrorKind::Interrupted)));
        }

        let mut limit = buf.remaining();
        if let Some(chunk) = this.read_chunk {
            limit = limit.min(chunk);
        }
        if let Some(at) = this.fail_reads_after {
            if this.bytes_read >= at {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "injected transport fault",
                )));
            }
            limit = limit.min(at - this.bytes_read);
        }
        if let Some(at) = this.close_reads_after {
            if this.bytes_read >= at {
                // Nothing filled: end of stream
                return Poll::Ready(Ok(()));
            }
            limit = limit.min(at - this.bytes_read);
        }
        if limit == 0 {
            return Poll::Ready(Ok(()));
        }

        let n = {
            let mut limited = ReadBuf::new(buf.initialize_unfilled_to(limit));
            ready!(Pin::new(&mut this.inner).poll_read(cx, &mut limited))?;
            limited.filled().len()
        };
        buf.advance(n);
        this.bytes_read += n;

        Poll::Ready(Ok(()))
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for FaultyStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();

        if this.write_interrupts > 0 {
            this.write_interrupts -= 1;
            return Poll::Ready(Err(io::Error::from(io::ErrorKind::Interrupted)));
        }

        let mut len = data.len();
        if let Some(chunk) = this.write_chunk {
            len = len.min(chunk);
        }
        if let Some(at) = this.close_writes_after {
            if this.bytes_written >= at {
                return Poll::Ready(Ok(0));
            }
            len = len.min(at - this.bytes_written);
        }

        let n = ready!(Pin::new(&mut this.inner).poll_write(cx, &data[..len]))?;
        this.bytes_written += n;

        Poll::Ready(Ok(n))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
