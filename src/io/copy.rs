//! One-direction copy strategies for relaying TCP streams
//!
//! Both strategies copy from a reader into a writer through a caller-supplied
//! buffer (borrowed from the [`BufferPool`](super::BufferPool)) and stop at
//! end-of-stream or at the first read/write failure. End-of-stream is success.
//!
//! - [`CopyMode::Buffered`]: a poll-driven copy that tolerates short writes
//!   and flushes the writer once the reader is exhausted.
//! - [`CopyMode::Manual`]: a plain `read` then `write` loop.
//!
//! Neither ever writes more than what the last read produced.

use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::str::FromStr;
use std::task::{ready, Context, Poll};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};

/// Copy strategy used by relay sessions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CopyMode {
    /// Poll-driven buffered copy
    #[default]
    Buffered,
    /// Read-then-write loop
    Manual,
}

impl CopyMode {
    /// Map the `--iohack` toggle onto a copy mode
    #[must_use]
    pub const fn from_iohack(iohack: bool) -> Self {
        if iohack {
            Self::Manual
        } else {
            Self::Buffered
        }
    }

    /// Run this strategy over `buf` until EOF or failure.
    pub async fn copy<R, W>(self, reader: &mut R, writer: &mut W, buf: &mut [u8]) -> Transfer
    where
        R: AsyncRead + Unpin + ?Sized,
        W: AsyncWrite + Unpin + ?Sized,
    {
        match self {
            Self::Buffered => copy_buffered(reader, writer, buf).await,
            Self::Manual => copy_manual(reader, writer, buf).await,
        }
    }
}

impl fmt::Display for CopyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buffered => write!(f, "buffered"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

impl FromStr for CopyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "buffered" => Ok(Self::Buffered),
            "manual" | "iohack" => Ok(Self::Manual),
            other => Err(format!("unknown copy mode: {other}")),
        }
    }
}

/// Outcome of copying one direction
#[derive(Debug)]
pub struct Transfer {
    /// Bytes written to the destination
    pub bytes: u64,
    /// Failure that ended the copy, `None` on end-of-stream
    pub error: Option<io::Error>,
}

impl Transfer {
    /// Copy reached end-of-stream
    #[must_use]
    pub const fn completed(bytes: u64) -> Self {
        Self { bytes, error: None }
    }

    /// Copy stopped on an error
    #[must_use]
    pub const fn failed(bytes: u64, error: io::Error) -> Self {
        Self {
            bytes,
            error: Some(error),
        }
    }

    /// Whether the copy ended at end-of-stream
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Byte totals for a finished session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyResult {
    /// Bytes transferred from client to upstream
    pub client_to_upstream: u64,
    /// Bytes transferred from upstream to client
    pub upstream_to_client: u64,
}

impl CopyResult {
    /// Total bytes transferred in both directions
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.client_to_upstream + self.upstream_to_client
    }
}

/// Copy state machine over a borrowed buffer
struct CopyBuffer<'a, R: ?Sized, W: ?Sized> {
    reader: &'a mut R,
    writer: &'a mut W,
    buf: &'a mut [u8],
    read_done: bool,
    pos: usize,
    cap: usize,
    amt: u64,
}

impl<R, W> CopyBuffer<'_, R, W>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    fn poll_copy(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        loop {
            // Refill only once everything read so far has been written
            if self.pos == self.cap && !self.read_done {
                let mut read_buf = ReadBuf::new(self.buf);
                ready!(Pin::new(&mut *self.reader).poll_read(cx, &mut read_buf))?;
                let n = read_buf.filled().len();
                if n == 0 {
                    self.read_done = true;
                } else {
                    self.pos = 0;
                    self.cap = n;
                }
            }

            while self.pos < self.cap {
                let n = ready!(
                    Pin::new(&mut *self.writer).poll_write(cx, &self.buf[self.pos..self.cap])
                )?;
                if n == 0 {
                    return Poll::Ready(Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "write zero bytes",
                    )));
                }
                self.pos += n;
                self.amt += n as u64;
            }

            if self.read_done {
                ready!(Pin::new(&mut *self.writer).poll_flush(cx))?;
                return Poll::Ready(Ok(()));
            }
        }
    }
}

impl<R, W> Future for CopyBuffer<'_, R, W>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    type Output = Transfer;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        match ready!(this.poll_copy(cx)) {
            Ok(()) => Poll::Ready(Transfer::completed(this.amt)),
            Err(e) => Poll::Ready(Transfer::failed(this.amt, e)),
        }
    }
}

/// Buffered copy from `reader` to `writer` through `buf`.
///
/// Short writes are retried from the unwritten offset; the writer is flushed
/// when the reader reports end-of-stream.
pub async fn copy_buffered<R, W>(reader: &mut R, writer: &mut W, buf: &mut [u8]) -> Transfer
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    CopyBuffer {
        reader,
        writer,
        buf,
        read_done: false,
        pos: 0,
        cap: 0,
        amt: 0,
    }
    .await
}

/// Manual copy: read a chunk, write exactly that chunk, repeat.
///
/// Partial writes count toward [`Transfer::bytes`] even when a later write
/// of the same chunk fails.
pub async fn copy_manual<R, W>(reader: &mut R, writer: &mut W, buf: &mut [u8]) -> Transfer
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut bytes = 0u64;
    loop {
        let n = match reader.read(buf).await {
            Ok(0) => return Transfer::completed(bytes),
            Ok(n) => n,
            Err(e) => return Transfer::failed(bytes, e),
        };

        let mut pos = 0;
        while pos < n {
            match writer.write(&buf[pos..n]).await {
                Ok(0) => {
                    return Transfer::failed(bytes, io::ErrorKind::WriteZero.into());
                }
                Ok(written) => {
                    pos += written;
                    bytes += written as u64;
                }
                Err(e) => return Transfer::failed(bytes, e),
            }
        }
    }
}
