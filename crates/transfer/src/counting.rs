use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::AsyncWrite;

use crate::ProgressCounter;

/// Writer wrapper that records every accepted byte.
///
/// Bytes are counted as soon as the inner writer accepts them, both in the
/// wrapper's own total and in the shared [`ProgressCounter`].
#[derive(Debug)]
pub struct CountingWriter<W> {
    inner: W,
    counter: ProgressCounter,
    written: u64,
}

impl<W> CountingWriter<W> {
    pub fn new(inner: W, counter: ProgressCounter) -> Self {
        Self {
            inner,
            counter,
            written: 0,
        }
    }

    /// Bytes accepted by the inner writer so far.
    pub fn written(&self) -> u64 {
        self.written
    }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for CountingWriter<W> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = &poll {
            this.written += *n as u64;
            this.counter.add(*n as u64);
        }
        poll
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
