//! Linux implementation: `sendfile(2)`, `splice(2)`, `fallocate(2)` and
//! `readahead(2)`.

use std::io;
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd};
use std::ptr;

use crate::{KernelCopy, Pipe};

/// Kernel copy support of the running Linux kernel.
#[derive(Debug, Clone, Copy, Default)]
pub struct Platform;

impl KernelCopy for Platform {
    fn name(&self) -> &'static str {
        "linux"
    }

    fn supports_send_file(&self) -> bool {
        true
    }

    fn supports_splice(&self) -> bool {
        true
    }

    fn send_file(
        &self,
        socket: BorrowedFd<'_>,
        file: BorrowedFd<'_>,
        offset: &mut u64,
        count: usize,
    ) -> io::Result<usize> {
        let mut off = to_off_t(*offset)?;
        // SAFETY: both descriptors are borrowed for the duration of the call
        // and `off` is a valid, exclusively borrowed offset.
        let n = unsafe { libc::sendfile(socket.as_raw_fd(), file.as_raw_fd(), &mut off, count) };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        *offset = off as u64;
        Ok(n as usize)
    }

    fn pipe(&self) -> io::Result<Pipe> {
        let mut fds = [0 as libc::c_int; 2];
        // SAFETY: `fds` has room for the two descriptors pipe2 writes.
        if unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) } < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: pipe2 succeeded, so both descriptors are open and owned by us.
        let (read, write) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
        Ok(Pipe { read, write })
    }

    fn grow_pipe(&self, pipe: &Pipe, capacity: usize) -> io::Result<usize> {
        let capacity = libc::c_int::try_from(capacity)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pipe capacity too large"))?;
        // SAFETY: plain fcntl on a descriptor we own.
        let granted = unsafe { libc::fcntl(pipe.write.as_raw_fd(), libc::F_SETPIPE_SZ, capacity) };
        if granted < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(granted as usize)
    }

    fn splice(
        &self,
        from: BorrowedFd<'_>,
        to: BorrowedFd<'_>,
        count: usize,
        nonblocking: bool,
    ) -> io::Result<usize> {
        let mut flags = libc::SPLICE_F_MOVE | libc::SPLICE_F_MORE;
        if nonblocking {
            flags |= libc::SPLICE_F_NONBLOCK;
        }
        // SAFETY: null offsets mean "use and advance the descriptor offsets".
        let n = unsafe {
            libc::splice(
                from.as_raw_fd(),
                ptr::null_mut(),
                to.as_raw_fd(),
                ptr::null_mut(),
                count,
                flags,
            )
        };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(n as usize)
    }

    fn preallocate(&self, file: BorrowedFd<'_>, len: u64) -> io::Result<()> {
        let len = to_off_t(len)?;
        // SAFETY: plain fallocate on a borrowed descriptor, mode 0.
        if unsafe { libc::fallocate(file.as_raw_fd(), 0, 0, len) } < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn read_ahead(&self, file: BorrowedFd<'_>, len: u64) -> io::Result<()> {
        let len = usize::try_from(len).unwrap_or(usize::MAX);
        // SAFETY: readahead only reads the descriptor; it has no memory arguments.
        if unsafe { libc::readahead(file.as_raw_fd(), 0, len) } < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

fn to_off_t(value: u64) -> io::Result<libc::off_t> {
    libc::off_t::try_from(value)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "offset out of range"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Seek, SeekFrom, Write};
    use std::os::fd::AsFd;
    use std::os::unix::net::UnixStream;

    fn file_with(data: &[u8]) -> std::fs::File {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(data).unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();
        file
    }

    #[test]
    fn send_file_advances_offset() {
        let file = file_with(b"hello sendfile");
        let (tx, mut rx) = UnixStream::pair().unwrap();

        let mut offset = 6;
        let n = Platform
            .send_file(tx.as_fd(), file.as_fd(), &mut offset, 64)
            .unwrap();
        assert_eq!(n, 8);
        assert_eq!(offset, 14);
        drop(tx);

        let mut out = Vec::new();
        rx.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"sendfile");
    }

    #[test]
    fn send_file_at_eof_returns_zero() {
        let file = file_with(b"abc");
        let (tx, _rx) = UnixStream::pair().unwrap();
        let mut offset = 3;
        let n = Platform
            .send_file(tx.as_fd(), file.as_fd(), &mut offset, 16)
            .unwrap();
        assert_eq!(n, 0);
        assert_eq!(offset, 3);
    }

    #[test]
    fn splice_through_pipe_into_file() {
        let source = file_with(b"spliced bytes");
        let mut dest = tempfile::tempfile().unwrap();

        let pipe = Platform.pipe().unwrap();
        let _ = Platform.grow_pipe(&pipe, crate::PIPE_CAPACITY);

        let moved = Platform
            .splice(source.as_fd(), pipe.write.as_fd(), 64, false)
            .unwrap();
        assert_eq!(moved, 13);
        let written = Platform
            .splice(pipe.read.as_fd(), dest.as_fd(), moved, false)
            .unwrap();
        assert_eq!(written, moved);

        dest.seek(SeekFrom::Start(0)).unwrap();
        let mut out = String::new();
        dest.read_to_string(&mut out).unwrap();
        assert_eq!(out, "spliced bytes");
    }

    #[test]
    fn grow_pipe_grants_at_least_default() {
        let pipe = Platform.pipe().unwrap();
        match Platform.grow_pipe(&pipe, crate::PIPE_CAPACITY) {
            Ok(granted) => assert!(granted >= 64 * 1024),
            // Unprivileged processes may be capped by pipe-max-size.
            Err(e) => assert_eq!(e.raw_os_error(), Some(libc::EPERM)),
        }
    }

    #[test]
    fn preallocate_extends_file() {
        let file = tempfile::tempfile().unwrap();
        match Platform.preallocate(file.as_fd(), 4096) {
            Ok(()) => assert_eq!(file.metadata().unwrap().len(), 4096),
            // Not every filesystem backing the temp dir implements fallocate.
            Err(e) => assert_eq!(e.raw_os_error(), Some(libc::EOPNOTSUPP)),
        }
    }

    #[test]
    fn read_ahead_accepts_regular_file() {
        let file = file_with(&[7u8; 8192]);
        if let Err(e) = Platform.read_ahead(file.as_fd(), 8192) {
            // Some in-memory filesystems reject readahead.
            assert_eq!(e.raw_os_error(), Some(libc::EINVAL));
        }
    }
}
