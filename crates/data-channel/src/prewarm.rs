//! Page-cache prewarm for the sender.

use std::io;
use std::os::fd::AsFd;
use std::path::{Path, PathBuf};

use ftrs_zerocopy::KernelCopy;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::TransferError;

/// Issues a read-ahead hint over the whole file on a blocking thread.
///
/// Fire-and-forget: the transfer never waits on the returned handle and
/// failures only produce a warning.
pub fn prewarm(path: PathBuf, kernel: &'static dyn KernelCopy) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || match read_ahead(&path, kernel) {
        Ok(len) => debug!(path = %path.display(), len, "read-ahead hint issued"),
        Err(source) => {
            let err = TransferError::Advisory {
                what: "prewarm",
                source,
            };
            warn!(path = %path.display(), kind = %err.kind(), "{err}");
        }
    })
}

fn read_ahead(path: &Path, kernel: &dyn KernelCopy) -> io::Result<u64> {
    let file = std::fs::File::open(path)?;
    let len = file.metadata()?.len();
    if len > 0 {
        kernel.read_ahead(file.as_fd(), len)?;
    }
    Ok(len)
}
