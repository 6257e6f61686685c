//! Engine configuration.
//!
//! Both engines take every setting through these values; nothing inside the
//! engines reads process-wide state.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ftrs_transfer::DEFAULT_INTERVAL;
use ftrs_zerocopy::KernelCopy;
use tracing::warn;

use crate::error::TransferError;

/// Source path that selects the synthetic zero generator.
pub const ZERO_DEVICE: &str = "/dev/zero";

/// Destination directory that selects the discarding sink.
pub const NULL_DEVICE: &str = "/dev/null";

/// Name announced for the synthetic zero source.
pub const ZERO_SOURCE_NAME: &str = "zero.dat";

/// What the sender streams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// A regular file; size comes from its metadata.
    File(PathBuf),
    /// The synthetic generator producing `size` bytes.
    Zero { size: u64 },
}

impl Source {
    /// Resolves a command-line source path and optional size spec.
    ///
    /// `/dev/zero` requires a size. A size given for any other path is
    /// ignored with a warning.
    pub fn resolve(path: impl Into<PathBuf>, size_spec: Option<&str>) -> Result<Self, TransferError> {
        let path = path.into();
        if path == Path::new(ZERO_DEVICE) {
            let spec = size_spec.ok_or_else(|| {
                TransferError::Setup(format!("a size is required when sending {ZERO_DEVICE}"))
            })?;
            return Ok(Self::Zero {
                size: parse_size(spec)?,
            });
        }

        if let Some(spec) = size_spec {
            warn!(size = spec, path = %path.display(), "size ignored for a regular file");
        }
        Ok(Self::File(path))
    }

    /// Name written into the header.
    ///
    /// The wire carries UTF-8 names, so a file whose name is not valid
    /// UTF-8 is rejected instead of being renamed.
    pub fn name(&self) -> Result<String, TransferError> {
        match self {
            Self::File(path) => {
                let name = path.file_name().ok_or_else(|| {
                    TransferError::file(
                        path,
                        io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"),
                    )
                })?;
                name.to_str().map(str::to_owned).ok_or_else(|| {
                    TransferError::file(
                        path,
                        io::Error::new(io::ErrorKind::InvalidData, "file name is not valid UTF-8"),
                    )
                })
            }
            Self::Zero { .. } => Ok(ZERO_SOURCE_NAME.to_string()),
        }
    }
}

/// Where the receiver puts body bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// Files are created under this directory.
    Directory(PathBuf),
    /// Bytes are dropped; nothing is created on disk.
    Discard,
}

impl Destination {
    pub fn resolve(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        if dir == Path::new(NULL_DEVICE) {
            Self::Discard
        } else {
            Self::Directory(dir)
        }
    }
}

/// How received names are turned into destination paths.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NamePolicy {
    /// Reject names that could escape the destination directory.
    #[default]
    Strict,
    /// Join the name onto the directory unchanged.
    Trusted,
}

/// Settings for one [`send_file`](crate::send_file) call.
#[derive(Debug, Clone)]
pub struct SendConfig {
    /// `host:port` of the receiver.
    pub addr: String,
    pub source: Source,
    /// Requested `SO_SNDBUF`, if any.
    pub send_buffer: Option<usize>,
    /// Issue a read-ahead hint over the source file before sending.
    pub prewarm: bool,
    pub progress_interval: Duration,
    pub kernel: &'static dyn KernelCopy,
}

impl SendConfig {
    pub fn new(addr: impl Into<String>, source: Source) -> Self {
        Self {
            addr: addr.into(),
            source,
            send_buffer: None,
            prewarm: false,
            progress_interval: DEFAULT_INTERVAL,
            kernel: ftrs_zerocopy::kernel(),
        }
    }

    /// Overrides the kernel capabilities, e.g. with
    /// [`Unsupported`](ftrs_zerocopy::Unsupported) to force buffered sends.
    pub fn with_kernel(mut self, kernel: &'static dyn KernelCopy) -> Self {
        self.kernel = kernel;
        self
    }
}

/// Settings shared by every connection a receiver handles.
#[derive(Debug, Clone)]
pub struct ReceiveConfig {
    pub destination: Destination,
    /// Use the socket → pipe → file path when the kernel supports it.
    pub use_splice: bool,
    /// Requested `SO_RCVBUF`, if any.
    pub recv_buffer: Option<usize>,
    /// Open destination files with `O_DIRECT`.
    pub direct_io: bool,
    pub name_policy: NamePolicy,
    pub progress_interval: Duration,
    pub kernel: &'static dyn KernelCopy,
}

impl ReceiveConfig {
    pub fn new(destination: Destination) -> Self {
        Self {
            destination,
            use_splice: true,
            recv_buffer: None,
            direct_io: false,
            name_policy: NamePolicy::default(),
            progress_interval: DEFAULT_INTERVAL,
            kernel: ftrs_zerocopy::kernel(),
        }
    }

    pub fn with_kernel(mut self, kernel: &'static dyn KernelCopy) -> Self {
        self.kernel = kernel;
        self
    }
}

/// Parses a size like `512`, `64K`, `10m` or `2G` (powers of 1024).
pub fn parse_size(spec: &str) -> Result<u64, TransferError> {
    let normalized = spec.trim().to_ascii_uppercase();
    let invalid = || TransferError::Setup(format!("invalid size {spec:?}"));

    let (digits, multiplier) = match normalized.as_bytes().last() {
        Some(b'K') => (&normalized[..normalized.len() - 1], 1u64 << 10),
        Some(b'M') => (&normalized[..normalized.len() - 1], 1u64 << 20),
        Some(b'G') => (&normalized[..normalized.len() - 1], 1u64 << 30),
        _ => (normalized.as_str(), 1),
    };

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }

    let value: u64 = digits.parse().map_err(|_| invalid())?;
    if value == 0 {
        return Err(TransferError::Setup(format!("size must be positive: {spec:?}")));
    }
    value
        .checked_mul(multiplier)
        .ok_or_else(|| TransferError::Setup(format!("size overflows: {spec:?}")))
}
