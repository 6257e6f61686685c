//! Receiver engine: one complete file receipt per accepted connection.

use std::fs::OpenOptions as StdOpenOptions;
use std::io;
use std::net::SocketAddr;
use std::os::fd::{AsFd, BorrowedFd};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use ftrs_transfer::{DiscardSink, ProgressCallback, ProgressCounter, ProgressTracker, mib_per_sec};
use ftrs_zerocopy::{KernelCopy, PIPE_CAPACITY};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWrite, Interest};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::config::{Destination, NULL_DEVICE, NamePolicy, ReceiveConfig};
use crate::error::{SpliceStage, TransferError};
use crate::pipeline::run_pipeline;
use crate::wire::read_header;
use crate::{CHUNK_SIZE, Strategy, socket};

/// Summary of one successful receipt.
#[derive(Debug, Clone)]
pub struct ReceivedFile {
    pub name: String,
    /// Destination path; `None` when discarding.
    pub path: Option<PathBuf>,
    pub bytes: u64,
    pub elapsed: Duration,
    pub strategy: Strategy,
}

impl ReceivedFile {
    pub fn bytes_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.bytes as f64 / secs
    }
}

/// Opened destination for one receipt.
enum Sink {
    File { file: File, path: PathBuf },
    Discard,
}

/// Receives one file from `stream`.
///
/// Errors concern this connection only. The socket, destination file,
/// pipe and progress task are all released before this returns.
pub async fn receive_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    config: &ReceiveConfig,
    progress: Option<ProgressCallback>,
) -> Result<ReceivedFile, TransferError> {
    if let Some(size) = config.recv_buffer {
        socket::tune_recv_buffer(&stream, size);
    }

    let header = read_header(&mut stream).await?;
    debug!(%peer, name_len = header.name.len(), "received name length");
    debug!(%peer, name = %header.name, "received name");
    debug!(%peer, size = header.size, "received size");
    let size = header.size;

    let sink = open_sink(config, &header.name, size).await?;
    let path = match &sink {
        Sink::File { path, .. } => Some(path.clone()),
        Sink::Discard => None,
    };

    let started = Instant::now();
    if size == 0 {
        info!(%peer, name = %header.name, "empty file received");
        return Ok(ReceivedFile {
            name: header.name,
            path,
            bytes: 0,
            elapsed: started.elapsed(),
            strategy: Strategy::Empty,
        });
    }

    let strategy = if config.use_splice && config.kernel.supports_splice() {
        Strategy::Splice
    } else {
        Strategy::Buffered
    };
    if strategy == Strategy::Buffered && config.direct_io {
        warn!(%peer, "direct I/O requested with the buffered path; writes may fail alignment checks");
    }
    info!(%peer, name = %header.name, size, %strategy, "receiving body");

    let counter = ProgressCounter::new();
    let tracker = ProgressTracker::start(
        size,
        counter.clone(),
        started,
        config.progress_interval,
        progress,
    );

    let received = match strategy {
        Strategy::Splice => {
            let null;
            let target = match &sink {
                Sink::File { file, .. } => file.as_fd(),
                Sink::Discard => {
                    null = StdOpenOptions::new()
                        .write(true)
                        .open(NULL_DEVICE)
                        .map_err(|e| TransferError::file(NULL_DEVICE, e))?;
                    null.as_fd()
                }
            };
            receive_with_splice(&stream, target, size, &counter, config.kernel).await?
        }
        _ => {
            let (read_half, _write_half) = stream.into_split();
            let writer: Box<dyn AsyncWrite + Unpin + Send> = match sink {
                Sink::File { file, .. } => Box::new(file),
                Sink::Discard => Box::new(DiscardSink::new()),
            };
            let outcome = run_pipeline(read_half, writer, size, counter.clone()).await;
            if let Some(err) = outcome.error {
                return Err(err);
            }
            outcome.written
        }
    };

    let last = tracker.finish().await;

    if received != size {
        return Err(TransferError::SizeMismatch {
            transferred: received,
            declared: size,
        });
    }

    let file = ReceivedFile {
        name: header.name,
        path,
        bytes: received,
        elapsed: last.elapsed,
        strategy,
    };
    info!(
        %peer,
        name = %file.name,
        bytes = file.bytes,
        mib_per_sec = %format!("{:.2}", mib_per_sec(file.bytes_per_sec())),
        "file received"
    );
    Ok(file)
}

async fn open_sink(config: &ReceiveConfig, name: &str, size: u64) -> Result<Sink, TransferError> {
    let dir = match &config.destination {
        Destination::Discard => return Ok(Sink::Discard),
        Destination::Directory(dir) => dir,
    };

    if config.name_policy == NamePolicy::Strict {
        ftrs_transfer::validate_received_name(name)?;
    }

    let path = dir.join(name);
    let parent = path.parent().unwrap_or(dir.as_path());
    tokio::fs::create_dir_all(parent)
        .await
        .map_err(|e| TransferError::file(parent, e))?;

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true).mode(0o644);
    if config.direct_io {
        request_direct_io(&mut options);
    }
    let file = options
        .open(&path)
        .await
        .map_err(|e| TransferError::file(&path, e))?;

    if size > 0 {
        if let Err(source) = config.kernel.preallocate(file.as_fd(), size) {
            let err = TransferError::Advisory {
                what: "preallocation",
                source,
            };
            warn!(path = %path.display(), size, kind = %err.kind(), "{err}");
        }
    }

    Ok(Sink::File { file, path })
}

#[cfg(target_os = "linux")]
fn request_direct_io(options: &mut OpenOptions) {
    options.custom_flags(libc::O_DIRECT);
}

#[cfg(not(target_os = "linux"))]
fn request_direct_io(_options: &mut OpenOptions) {
    warn!("direct I/O is not available on this platform");
}

/// Moves the body socket → pipe → `target`, one chunk at a time.
///
/// A zero-byte move from the socket ends the loop; the caller's size
/// check reports any shortfall.
async fn receive_with_splice(
    stream: &TcpStream,
    target: BorrowedFd<'_>,
    size: u64,
    counter: &ProgressCounter,
    kernel: &dyn KernelCopy,
) -> Result<u64, TransferError> {
    let pipe = kernel.pipe().map_err(TransferError::Pipe)?;
    match kernel.grow_pipe(&pipe, PIPE_CAPACITY) {
        Ok(granted) => debug!(granted, "splice pipe enlarged"),
        Err(e) => debug!(error = %e, "keeping default pipe capacity"),
    }

    let mut received = 0u64;
    while received < size {
        let want = (size - received).min(CHUNK_SIZE as u64) as usize;
        stream.readable().await.map_err(|source| TransferError::Splice {
            stage: SpliceStage::SocketToPipe,
            received,
            source,
        })?;

        let result = stream.try_io(Interest::READABLE, || {
            kernel.splice(stream.as_fd(), pipe.write.as_fd(), want, true)
        });
        let moved = match result {
            Ok(0) => {
                debug!(received, declared = size, "peer closed the connection");
                break;
            }
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
            Err(source) => {
                return Err(TransferError::Splice {
                    stage: SpliceStage::SocketToPipe,
                    received,
                    source,
                });
            }
        };

        let written = kernel
            .splice(pipe.read.as_fd(), target, moved, false)
            .map_err(|source| TransferError::Splice {
                stage: SpliceStage::PipeToDestination,
                received,
                source,
            })?;
        if written != moved {
            return Err(TransferError::PartialSplice { moved, written });
        }

        received += moved as u64;
        counter.add(moved as u64);
    }

    Ok(received)
}
