//! Kernel-assisted copy primitives for the transfer engine.
//!
//! Every primitive is exposed through the [`KernelCopy`] trait. The
//! implementation for the running platform is returned by [`kernel`];
//! [`Unsupported`] reports every primitive as unavailable and is what
//! callers use to force the buffered paths.
//!
//! Selection of a strategy happens once per transfer by asking the
//! `supports_*` methods, never per chunk.

use std::fmt;
use std::io;
use std::os::fd::{BorrowedFd, OwnedFd};

#[cfg(target_os = "linux")]
#[path = "linux.rs"]
mod platform;

#[cfg(not(target_os = "linux"))]
#[path = "other.rs"]
mod platform;

pub use platform::Platform;

/// Capacity requested for the intermediate splice pipe (4 × 64 KiB).
pub const PIPE_CAPACITY: usize = 4 * 64 * 1024;

/// An unnamed pipe used as the kernel-side buffer between two descriptors.
///
/// Both ends are closed when the value is dropped.
#[derive(Debug)]
pub struct Pipe {
    pub read: OwnedFd,
    pub write: OwnedFd,
}

/// Kernel copy capabilities.
///
/// Default methods report the primitive as unsupported, so a platform only
/// overrides what it actually provides.
pub trait KernelCopy: fmt::Debug + Send + Sync {
    /// Short platform label for logs.
    fn name(&self) -> &'static str;

    /// Whether [`send_file`](Self::send_file) is available.
    fn supports_send_file(&self) -> bool {
        false
    }

    /// Whether [`pipe`](Self::pipe) and [`splice`](Self::splice) are available.
    fn supports_splice(&self) -> bool {
        false
    }

    /// Copies up to `count` bytes from `file` at `*offset` into `socket`.
    ///
    /// On success `*offset` is advanced by the returned byte count.
    fn send_file(
        &self,
        socket: BorrowedFd<'_>,
        file: BorrowedFd<'_>,
        offset: &mut u64,
        count: usize,
    ) -> io::Result<usize> {
        let _ = (socket, file, offset, count);
        Err(unsupported("sendfile"))
    }

    /// Creates an intermediate pipe for [`splice`](Self::splice).
    fn pipe(&self) -> io::Result<Pipe> {
        Err(unsupported("pipe"))
    }

    /// Requests a larger pipe buffer. Returns the capacity actually granted.
    fn grow_pipe(&self, pipe: &Pipe, capacity: usize) -> io::Result<usize> {
        let _ = (pipe, capacity);
        Err(unsupported("F_SETPIPE_SZ"))
    }

    /// Moves up to `count` bytes from `from` to `to`; one side must be a pipe.
    ///
    /// With `nonblocking` set the call returns `WouldBlock` instead of
    /// waiting on the non-pipe descriptor.
    fn splice(
        &self,
        from: BorrowedFd<'_>,
        to: BorrowedFd<'_>,
        count: usize,
        nonblocking: bool,
    ) -> io::Result<usize> {
        let _ = (from, to, count, nonblocking);
        Err(unsupported("splice"))
    }

    /// Reserves `len` bytes of disk space for `file`.
    fn preallocate(&self, file: BorrowedFd<'_>, len: u64) -> io::Result<()> {
        let _ = (file, len);
        Err(unsupported("fallocate"))
    }

    /// Asks the kernel to start reading `len` bytes of `file` into the page cache.
    fn read_ahead(&self, file: BorrowedFd<'_>, len: u64) -> io::Result<()> {
        let _ = (file, len);
        Err(unsupported("readahead"))
    }
}

/// A platform with no kernel copy support at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unsupported;

impl KernelCopy for Unsupported {
    fn name(&self) -> &'static str {
        "unsupported"
    }
}

/// Returns the kernel capabilities of the running platform.
pub fn kernel() -> &'static dyn KernelCopy {
    static PLATFORM: Platform = Platform;
    &PLATFORM
}

/// Returns `true` if `err` means the peer went away (broken pipe or reset).
pub fn is_connection_lost(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset
    ) || matches!(err.raw_os_error(), Some(libc::EPIPE) | Some(libc::ECONNRESET))
}

/// Returns `true` if `err` is a device-level I/O failure (`EIO`).
pub fn is_device_error(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::EIO)
}

fn unsupported(what: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::Unsupported,
        format!("{what} is not available on this platform"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::fd::AsFd;

    #[test]
    fn unsupported_reports_nothing() {
        let k = Unsupported;
        assert!(!k.supports_send_file());
        assert!(!k.supports_splice());
        let err = k.pipe().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
    }

    #[test]
    fn unsupported_primitives_fail() {
        let file = tempfile::tempfile().unwrap();
        let k = Unsupported;
        assert!(k.preallocate(file.as_fd(), 10).is_err());
        assert!(k.read_ahead(file.as_fd(), 10).is_err());
        let mut offset = 0;
        assert!(k.send_file(file.as_fd(), file.as_fd(), &mut offset, 1).is_err());
        assert_eq!(offset, 0);
    }

    #[test]
    fn connection_lost_classification() {
        assert!(is_connection_lost(&io::Error::from(io::ErrorKind::BrokenPipe)));
        assert!(is_connection_lost(&io::Error::from_raw_os_error(libc::ECONNRESET)));
        assert!(!is_connection_lost(&io::Error::from(io::ErrorKind::TimedOut)));
    }

    #[test]
    fn device_error_classification() {
        assert!(is_device_error(&io::Error::from_raw_os_error(libc::EIO)));
        assert!(!is_device_error(&io::Error::from_raw_os_error(libc::EPIPE)));
        assert!(!is_device_error(&io::Error::other("eio")));
    }
}
