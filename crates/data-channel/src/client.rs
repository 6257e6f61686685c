//! Sender engine.
//!
//! Connects to a receiver, writes the header and streams the body of one
//! source. Regular files go through `sendfile` when the kernel provides
//! it; the synthetic source and unsupported platforms use a buffered copy.

use std::io;
use std::os::fd::AsFd;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use ftrs_transfer::{CountingWriter, ProgressCallback, ProgressCounter, ProgressTracker, ZeroSource};
use ftrs_zerocopy::KernelCopy;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, Interest};
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::config::{SendConfig, Source};
use crate::error::TransferError;
use crate::wire::{TransferHeader, encode_header};
use crate::{CHUNK_SIZE, CONNECT_TIMEOUT, Strategy, prewarm, socket};

/// Summary of a completed send.
#[derive(Debug, Clone)]
pub struct SendReport {
    pub name: String,
    pub bytes: u64,
    pub elapsed: Duration,
    pub strategy: Strategy,
}

/// An opened source, ready to stream.
enum Body {
    File { file: File, path: PathBuf },
    Zero(ZeroSource),
}

/// Sends one source to the receiver at `config.addr`.
///
/// The source is opened before connecting, so a missing file never
/// reaches the receiver as a truncated header.
pub async fn send_file(
    config: &SendConfig,
    progress: Option<ProgressCallback>,
) -> Result<SendReport, TransferError> {
    let name = config.source.name()?;
    let (body, size) = open_source(&config.source).await?;

    if config.prewarm {
        if let Body::File { path, .. } = &body {
            drop(prewarm::prewarm(path.clone(), config.kernel));
        }
    }

    let mut stream = socket::connect(&config.addr, CONNECT_TIMEOUT).await?;
    info!(addr = %config.addr, "connected to receiver");
    if let Some(size) = config.send_buffer {
        socket::tune_send_buffer(&stream, size);
    }

    let header = TransferHeader::new(name.as_str(), size);
    let bytes = encode_header(&header)?;
    debug!(name_len = header.name.len(), "sending name length");
    debug!(name = %header.name, "sending name");
    debug!(size, "sending size");
    stream
        .write_all(&bytes)
        .await
        .map_err(|e| TransferError::send(e, 0))?;

    let started = Instant::now();
    if size == 0 {
        info!(name = %name, "empty source, no body to send");
        return Ok(SendReport {
            name,
            bytes: 0,
            elapsed: started.elapsed(),
            strategy: Strategy::Empty,
        });
    }

    let strategy = match &body {
        Body::File { .. } if config.kernel.supports_send_file() => Strategy::SendFile,
        _ => Strategy::Buffered,
    };
    info!(name = %name, size, %strategy, "sending body");

    let counter = ProgressCounter::new();
    let tracker = ProgressTracker::start(
        size,
        counter.clone(),
        started,
        config.progress_interval,
        progress,
    );

    let sent = match body {
        Body::File { file, path } if strategy == Strategy::SendFile => {
            send_with_sendfile(&stream, &file, &path, size, &counter, config.kernel).await?
        }
        Body::File { mut file, path } => {
            send_buffered(&mut file, Some(&path), &mut stream, counter.clone()).await?
        }
        Body::Zero(mut source) => {
            send_buffered(&mut source, None, &mut stream, counter.clone()).await?
        }
    };

    let last = tracker.finish().await;
    let _ = stream.shutdown().await;

    if sent != size {
        return Err(TransferError::SizeMismatch {
            transferred: sent,
            declared: size,
        });
    }

    info!(
        name = %name,
        bytes = sent,
        elapsed_ms = last.elapsed.as_millis() as u64,
        "send complete"
    );
    Ok(SendReport {
        name,
        bytes: sent,
        elapsed: last.elapsed,
        strategy,
    })
}

async fn open_source(source: &Source) -> Result<(Body, u64), TransferError> {
    match source {
        Source::Zero { size } => Ok((Body::Zero(ZeroSource::new(*size)), *size)),
        Source::File(path) => {
            let file = File::open(path)
                .await
                .map_err(|e| TransferError::file(path, e))?;
            let meta = file
                .metadata()
                .await
                .map_err(|e| TransferError::file(path, e))?;
            if !meta.is_file() {
                return Err(TransferError::file(
                    path,
                    io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
                ));
            }
            Ok((
                Body::File {
                    file,
                    path: path.clone(),
                },
                meta.len(),
            ))
        }
    }
}

/// Copies the file to the socket with `sendfile`, one chunk per call.
async fn send_with_sendfile(
    stream: &TcpStream,
    file: &File,
    path: &Path,
    size: u64,
    counter: &ProgressCounter,
    kernel: &dyn KernelCopy,
) -> Result<u64, TransferError> {
    let mut offset = 0u64;
    let mut sent = 0u64;

    while sent < size {
        let chunk = (size - sent).min(CHUNK_SIZE as u64) as usize;
        stream
            .writable()
            .await
            .map_err(|e| TransferError::send(e, sent))?;

        let start = offset;
        let result = stream.try_io(Interest::WRITABLE, || {
            kernel.send_file(stream.as_fd(), file.as_fd(), &mut offset, chunk)
        });
        match result {
            Ok(0) => {
                return Err(TransferError::Stalled {
                    sent,
                    declared: size,
                });
            }
            Ok(n) => {
                sent += n as u64;
                counter.add(n as u64);
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
            Err(e) => return Err(TransferError::send_file(e, path, start)),
        }
    }

    Ok(sent)
}

/// Copies `source` to the socket through a user-space buffer until EOF.
async fn send_buffered<R: AsyncRead + Unpin>(
    source: &mut R,
    path: Option<&Path>,
    stream: &mut TcpStream,
    counter: ProgressCounter,
) -> Result<u64, TransferError> {
    let mut writer = CountingWriter::new(stream, counter);
    let mut buf = vec![0u8; CHUNK_SIZE];

    loop {
        let n = source
            .read(&mut buf)
            .await
            .map_err(|e| TransferError::source_read(e, path, writer.written()))?;
        if n == 0 {
            break;
        }
        writer
            .write_all(&buf[..n])
            .await
            .map_err(|e| TransferError::send(e, writer.written()))?;
    }

    writer
        .flush()
        .await
        .map_err(|e| TransferError::send(e, writer.written()))?;
    Ok(writer.written())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use crate::wire::read_header;
    use ftrs_transfer::ProgressSnapshot;
    use ftrs_zerocopy::Unsupported;
    use tokio::net::TcpListener;

    /// Claims sendfile support but never moves a byte.
    #[derive(Debug)]
    struct StalledKernel;

    impl KernelCopy for StalledKernel {
        fn name(&self) -> &'static str {
            "stalled"
        }

        fn supports_send_file(&self) -> bool {
            true
        }

        fn send_file(
            &self,
            _socket: std::os::fd::BorrowedFd<'_>,
            _file: std::os::fd::BorrowedFd<'_>,
            _offset: &mut u64,
            _count: usize,
        ) -> io::Result<usize> {
            Ok(0)
        }
    }

    async fn capture(listener: TcpListener) -> (TransferHeader, Vec<u8>) {
        let (mut stream, _) = listener.accept().await.unwrap();
        let header = read_header(&mut stream).await.unwrap();
        let mut body = Vec::new();
        stream.read_to_end(&mut body).await.unwrap();
        (header, body)
    }

    #[tokio::test]
    async fn sends_file_with_kernel_copy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payload.bin");
        let data: Vec<u8> = (0..150_000u32).map(|i| (i * 7 % 256) as u8).collect();
        std::fs::write(&path, &data).unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let server = tokio::spawn(capture(listener));

        let config = SendConfig::new(addr, Source::File(path));
        let report = send_file(&config, None).await.unwrap();
        let (header, body) = server.await.unwrap();

        assert_eq!(header, TransferHeader::new("payload.bin", data.len() as u64));
        assert_eq!(body, data);
        assert_eq!(report.bytes, data.len() as u64);
        let expected = if ftrs_zerocopy::kernel().supports_send_file() {
            Strategy::SendFile
        } else {
            Strategy::Buffered
        };
        assert_eq!(report.strategy, expected);
    }

    #[tokio::test]
    async fn sends_file_buffered() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("small.txt");
        std::fs::write(&path, b"hello over tcp").unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let server = tokio::spawn(capture(listener));

        let config = SendConfig::new(addr, Source::File(path)).with_kernel(&Unsupported);
        let report = send_file(&config, None).await.unwrap();
        let (_, body) = server.await.unwrap();

        assert_eq!(body, b"hello over tcp");
        assert_eq!(report.strategy, Strategy::Buffered);
    }

    #[tokio::test]
    async fn zero_source_is_announced_as_zero_dat() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let server = tokio::spawn(capture(listener));

        let config = SendConfig::new(addr, Source::Zero { size: 100_000 });
        let report = send_file(&config, None).await.unwrap();
        let (header, body) = server.await.unwrap();

        assert_eq!(header.name, crate::config::ZERO_SOURCE_NAME);
        assert_eq!(header.size, 100_000);
        assert_eq!(body.len(), 100_000);
        assert_eq!(report.strategy, Strategy::Buffered);
    }

    #[tokio::test]
    async fn empty_file_sends_header_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.bin");
        std::fs::write(&path, b"").unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            stream.read_to_end(&mut raw).await.unwrap();
            raw
        });

        let report = send_file(&SendConfig::new(addr, Source::File(path)), None)
            .await
            .unwrap();
        let raw = server.await.unwrap();

        assert_eq!(report.strategy, Strategy::Empty);
        assert_eq!(report.bytes, 0);
        assert_eq!(
            raw,
            [0x00, 0x05, 0x61, 0x2E, 0x62, 0x69, 0x6E, 0, 0, 0, 0, 0, 0, 0, 0]
        );
    }

    #[tokio::test]
    async fn zero_byte_sendfile_is_a_stall() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stuck.bin");
        std::fs::write(&path, vec![5u8; 4096]).unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let server = tokio::spawn(capture(listener));

        let config = SendConfig::new(addr, Source::File(path)).with_kernel(&StalledKernel);
        let err = send_file(&config, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transfer, "{err}");
        assert!(matches!(
            err,
            TransferError::Stalled {
                sent: 0,
                declared: 4096
            }
        ));

        let (header, body) = server.await.unwrap();
        assert_eq!(header.size, 4096);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn missing_file_fails_before_connecting() {
        let dir = tempfile::tempdir().unwrap();
        let config = SendConfig::new("127.0.0.1:1", Source::File(dir.path().join("nope")));
        let err = send_file(&config, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::File);
    }

    #[tokio::test]
    async fn directory_source_is_a_file_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = SendConfig::new("127.0.0.1:1", Source::File(dir.path().to_path_buf()));
        let err = send_file(&config, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::File);
    }

    #[tokio::test]
    async fn progress_reaches_completion() {
        use std::sync::{Arc, Mutex};

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let server = tokio::spawn(capture(listener));

        let samples = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&samples);
        let callback: ProgressCallback = Arc::new(move |s: &ProgressSnapshot| sink.lock().unwrap().push(*s));

        let config = SendConfig::new(addr, Source::Zero { size: 300_000 });
        send_file(&config, Some(callback)).await.unwrap();
        server.await.unwrap();

        let samples = samples.lock().unwrap();
        let last = samples.last().unwrap();
        assert!(last.finished);
        assert_eq!(last.transferred, 300_000);
        assert_eq!(last.percent, 100.0);
    }
}
