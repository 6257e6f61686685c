//! Buffered receive pipeline.
//!
//! A reader task pulls the body from the connection in [`CHUNK_SIZE`]
//! reads and hands owned copies to a writer task through a bounded queue.
//! Either task reports its first failure on a single-slot error channel;
//! later failures are dropped.
//!
//! ```text
//!  socket ──► reader task ──[mpsc, HANDOFF_DEPTH]──► writer task ──► destination
//!                 │                                      │
//!                 └──────────► error (cap 1) ◄───────────┘
//! ```

use ftrs_transfer::ProgressCounter;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::TransferError;
use crate::{CHUNK_SIZE, HANDOFF_DEPTH};

/// Result of one pipeline run.
#[derive(Debug)]
pub struct PipelineOutcome {
    /// Bytes the writer task accepted into the destination.
    pub written: u64,
    /// First failure reported by either task.
    pub error: Option<TransferError>,
}

/// Copies up to `size` bytes from `reader` to `writer` on two tasks.
///
/// Returns once the reader has reached `size` or end-of-stream and the
/// writer has drained the queue, or as soon as either task fails. Both
/// tasks have ended when this returns.
pub async fn run_pipeline<R, W>(
    reader: R,
    writer: W,
    size: u64,
    counter: ProgressCounter,
) -> PipelineOutcome
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (chunk_tx, mut chunk_rx) = mpsc::channel::<Vec<u8>>(HANDOFF_DEPTH);
    let (err_tx, mut err_rx) = mpsc::channel::<TransferError>(1);
    let (done_tx, done_rx) = oneshot::channel::<u64>();

    let reader_err = err_tx.clone();
    let reader_task = tokio::spawn(async move {
        let mut reader = reader;
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut received = 0u64;

        while received < size {
            let want = (size - received).min(CHUNK_SIZE as u64) as usize;
            match reader.read(&mut buf[..want]).await {
                Ok(0) => break,
                Ok(n) => {
                    received += n as u64;
                    // The buffer is reused, so the writer gets its own copy.
                    if chunk_tx.send(buf[..n].to_vec()).await.is_err() {
                        // Writer is gone and has reported why.
                        return;
                    }
                }
                Err(source) => {
                    let _ = reader_err.try_send(TransferError::Receive { received, source });
                    return;
                }
            }
        }

        drop(chunk_tx);
        let _ = done_tx.send(received);
    });

    let writer_counter = counter.clone();
    let writer_task = tokio::spawn(async move {
        let mut writer = writer;
        let mut written = 0u64;

        while let Some(chunk) = chunk_rx.recv().await {
            if let Err(source) = writer.write_all(&chunk).await {
                let _ = err_tx.try_send(TransferError::DestinationWrite { written, source });
                return written;
            }
            written += chunk.len() as u64;
            writer_counter.add(chunk.len() as u64);
        }

        if let Err(source) = writer.flush().await {
            let _ = err_tx.try_send(TransferError::DestinationWrite { written, source });
        }
        written
    });

    let mut error = tokio::select! {
        Some(err) = err_rx.recv() => Some(err),
        done = done_rx => match done {
            Ok(received) => {
                debug!(received, "pipeline reader finished");
                None
            }
            // Reader ended without completing; its error (or the writer's)
            // is already queued unless both tasks vanished.
            Err(_) => Some(err_rx.recv().await.unwrap_or(TransferError::PipelineAborted)),
        },
    };

    if error.is_some() {
        reader_task.abort();
    }
    let _ = reader_task.await;

    let written = match writer_task.await {
        Ok(written) => written,
        Err(e) => {
            warn!(error = %e, "pipeline writer ended abnormally");
            if error.is_none() {
                error = Some(TransferError::PipelineAborted);
            }
            counter.get()
        }
    };

    if error.is_none() {
        // A flush failure after the reader finished.
        error = err_rx.try_recv().ok();
    }

    PipelineOutcome { written, error }
}
