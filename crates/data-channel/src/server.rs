//! Receiving server loop.
//!
//! Accepts connections strictly one at a time: the next accept is only
//! issued once the previous connection has fully finished.

use std::net::SocketAddr;

use ftrs_transfer::{ProgressCallback, ReceiverStats, format_with_commas, mib_per_sec};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ReceiveConfig;
use crate::error::TransferError;
use crate::receiver::{ReceivedFile, receive_connection};

/// Outcome of one connection, published after it finishes.
#[derive(Debug)]
pub struct ConnectionReport {
    pub peer: SocketAddr,
    pub outcome: Result<ReceivedFile, TransferError>,
    /// Totals including this connection.
    pub stats: ReceiverStats,
}

/// Serial receiver for single-file connections.
pub struct ReceiveServer {
    config: ReceiveConfig,
    events: Option<mpsc::Sender<ConnectionReport>>,
    progress: Option<ProgressCallback>,
}

impl ReceiveServer {
    pub fn new(config: ReceiveConfig) -> Self {
        Self {
            config,
            events: None,
            progress: None,
        }
    }

    /// Publishes a [`ConnectionReport`] per connection (non-blocking; reports
    /// are dropped when the channel is full).
    pub fn with_events(mut self, events: mpsc::Sender<ConnectionReport>) -> Self {
        self.events = Some(events);
        self
    }

    /// Progress callback used for every connection's body transfer.
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Binds the listening socket.
    pub async fn bind(addr: &str) -> Result<TcpListener, TransferError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| TransferError::Listen {
                addr: addr.to_string(),
                source,
            })?;
        if let Ok(local) = listener.local_addr() {
            info!(%local, "receiver listening");
        }
        Ok(listener)
    }

    /// Serves connections until `cancel` fires.
    ///
    /// Per-connection failures are logged and never end the loop. A
    /// transfer in progress always runs to completion; cancellation is only
    /// observed between connections. Returns the final totals.
    pub async fn serve(&self, listener: TcpListener, cancel: CancellationToken) -> ReceiverStats {
        let mut stats = ReceiverStats::new();

        loop {
            let (stream, peer) = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(files = stats.files(), "receiver shutting down");
                    break;
                }
                result = listener.accept() => match result {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        continue;
                    }
                },
            };

            info!(%peer, "connection accepted");
            let outcome = receive_connection(stream, peer, &self.config, self.progress.clone()).await;

            match &outcome {
                Ok(file) => {
                    stats.record(file.bytes);
                    info!(
                        files = stats.files(),
                        bytes = %format_with_commas(stats.bytes()),
                        mib_per_sec = %format!("{:.2}", mib_per_sec(stats.average_bytes_per_sec())),
                        "receiver totals"
                    );
                }
                Err(e) => warn!(%peer, kind = %e.kind(), error = %e, "connection failed"),
            }

            if let Some(events) = &self.events {
                let report = ConnectionReport {
                    peer,
                    outcome,
                    stats: stats.clone(),
                };
                if events.try_send(report).is_err() {
                    debug!(%peer, "connection report dropped");
                }
            }
        }

        stats
    }
}
