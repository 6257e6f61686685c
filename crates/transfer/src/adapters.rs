//! Synthetic endpoints for throughput testing.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Bounded source producing exactly `size` bytes, then end-of-stream.
///
/// Stands in for `/dev/zero` on the sending side. The produced bytes are
/// zero-filled, but callers must not depend on the content.
#[derive(Debug, Clone)]
pub struct ZeroSource {
    size: u64,
    produced: u64,
}

impl ZeroSource {
    pub fn new(size: u64) -> Self {
        Self { size, produced: 0 }
    }

    /// Bytes still to be produced.
    pub fn remaining(&self) -> u64 {
        self.size - self.produced
    }
}

impl AsyncRead for ZeroSource {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let n = this.remaining().min(buf.remaining() as u64) as usize;
        if n > 0 {
            buf.initialize_unfilled_to(n);
            buf.advance(n);
            this.produced += n as u64;
        }
        Poll::Ready(Ok(()))
    }
}

/// Sink that accepts and drops every byte.
///
/// Stands in for `/dev/null` on the receiving side; never touches the
/// filesystem.
#[derive(Debug, Clone, Default)]
pub struct DiscardSink {
    discarded: u64,
}

impl DiscardSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn discarded(&self) -> u64 {
        self.discarded
    }
}

impl AsyncWrite for DiscardSink {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.get_mut().discarded += buf.len() as u64;
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
