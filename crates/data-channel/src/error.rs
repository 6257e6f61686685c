//! Error types for the transfer engines.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use ftrs_transfer::InvalidName;
use ftrs_zerocopy::{is_connection_lost, is_device_error};

use crate::wire::WireError;

/// Closed classification of every [`TransferError`].
///
/// Callers branch on this tag instead of inspecting error internals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad configuration, caught before any network activity.
    Setup,
    /// Dial or listen failure.
    Connect,
    /// Malformed or truncated header.
    Protocol,
    /// Stat/open/create failure on a local file or directory.
    File,
    /// The peer went away (broken pipe, connection reset).
    ConnectionLost,
    /// Device-level read failure during a zero-copy send.
    DeviceIo,
    /// Bytes moved did not match the declared size.
    Integrity,
    /// Any other body transfer failure.
    Transfer,
    /// Best-effort tuning that failed; never fatal.
    Advisory,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Setup => "setup",
            Self::Connect => "connect",
            Self::Protocol => "protocol",
            Self::File => "file",
            Self::ConnectionLost => "connection-lost",
            Self::DeviceIo => "device-io",
            Self::Integrity => "integrity",
            Self::Transfer => "transfer",
            Self::Advisory => "advisory",
        })
    }
}

/// Side of the splice pipe that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpliceStage {
    SocketToPipe,
    PipeToDestination,
}

impl fmt::Display for SpliceStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SocketToPipe => "socket to pipe",
            Self::PipeToDestination => "pipe to destination",
        })
    }
}

/// Errors produced by the sender and receiver engines.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("configuration error: {0}")]
    Setup(String),

    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("timed out connecting to {addr} after {timeout:?}")]
    ConnectTimeout { addr: String, timeout: Duration },

    #[error("failed to listen on {addr}: {source}")]
    Listen {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("protocol error: {0}")]
    Protocol(#[from] WireError),

    #[error("rejected received name: {0}")]
    InvalidName(#[from] InvalidName),

    #[error("file '{}': {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("connection lost: {0}")]
    ConnectionLost(#[source] io::Error),

    #[error("file '{}' I/O error at offset {offset}: {source}", path.display())]
    DeviceIo {
        path: PathBuf,
        offset: u64,
        #[source]
        source: io::Error,
    },

    #[error("sendfile failed at offset {offset}: {source}")]
    SendFile {
        offset: u64,
        #[source]
        source: io::Error,
    },

    #[error("sendfile stalled: returned 0 with {sent} of {declared} bytes sent")]
    Stalled { sent: u64, declared: u64 },

    #[error("write to connection failed after {sent} bytes: {source}")]
    Send {
        sent: u64,
        #[source]
        source: io::Error,
    },

    #[error("reading source failed after {read} bytes: {source}")]
    SourceRead {
        read: u64,
        #[source]
        source: io::Error,
    },

    #[error("reading from connection failed after {received} bytes: {source}")]
    Receive {
        received: u64,
        #[source]
        source: io::Error,
    },

    #[error("writing destination failed after {written} bytes: {source}")]
    DestinationWrite {
        written: u64,
        #[source]
        source: io::Error,
    },

    #[error("failed to create splice pipe: {0}")]
    Pipe(#[source] io::Error),

    #[error("splice {stage} failed after {received} bytes: {source}")]
    Splice {
        stage: SpliceStage,
        received: u64,
        #[source]
        source: io::Error,
    },

    #[error("incomplete splice to destination: moved {moved}, wrote {written}")]
    PartialSplice { moved: usize, written: usize },

    #[error("buffered pipeline ended without a result")]
    PipelineAborted,

    #[error("size mismatch: transferred {transferred} bytes, declared {declared}")]
    SizeMismatch { transferred: u64, declared: u64 },

    #[error("{what} failed: {source}")]
    Advisory {
        what: &'static str,
        #[source]
        source: io::Error,
    },
}

impl TransferError {
    /// Returns the classification tag of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Setup(_) => ErrorKind::Setup,
            Self::Connect { .. } | Self::ConnectTimeout { .. } | Self::Listen { .. } => {
                ErrorKind::Connect
            }
            Self::Protocol(_) | Self::InvalidName(_) => ErrorKind::Protocol,
            Self::File { .. } => ErrorKind::File,
            Self::ConnectionLost(_) => ErrorKind::ConnectionLost,
            Self::DeviceIo { .. } => ErrorKind::DeviceIo,
            Self::PartialSplice { .. } | Self::SizeMismatch { .. } => ErrorKind::Integrity,
            Self::SendFile { .. }
            | Self::Stalled { .. }
            | Self::Send { .. }
            | Self::SourceRead { .. }
            | Self::Receive { .. }
            | Self::DestinationWrite { .. }
            | Self::Pipe(_)
            | Self::Splice { .. }
            | Self::PipelineAborted => ErrorKind::Transfer,
            Self::Advisory { .. } => ErrorKind::Advisory,
        }
    }

    /// Whether the error belongs in the persistent failure log.
    ///
    /// Only device-level I/O failures qualify: they point at a file an
    /// operator has to look at.
    pub fn is_failure_logged(&self) -> bool {
        self.kind() == ErrorKind::DeviceIo
    }

    pub(crate) fn file(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::File {
            path: path.into(),
            source,
        }
    }

    /// Classifies a failed write of body or header bytes to the connection.
    pub(crate) fn send(source: io::Error, sent: u64) -> Self {
        if is_connection_lost(&source) {
            Self::ConnectionLost(source)
        } else {
            Self::Send { sent, source }
        }
    }

    /// Classifies a failed read from the local source on the buffered path.
    pub(crate) fn source_read(source: io::Error, path: Option<&std::path::Path>, read: u64) -> Self {
        match path {
            Some(path) if is_device_error(&source) => Self::DeviceIo {
                path: path.to_path_buf(),
                offset: read,
                source,
            },
            _ => Self::SourceRead { read, source },
        }
    }

    /// Classifies a failed `sendfile` chunk starting at `offset`.
    pub(crate) fn send_file(source: io::Error, path: &std::path::Path, offset: u64) -> Self {
        if is_device_error(&source) {
            Self::DeviceIo {
                path: path.to_path_buf(),
                offset,
                source,
            }
        } else if is_connection_lost(&source) {
            Self::ConnectionLost(source)
        } else {
            Self::SendFile { offset, source }
        }
    }
}
