//! Connection setup and best-effort socket tuning.

use std::io;
use std::time::Duration;

use socket2::SockRef;
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::error::TransferError;

/// Dials `addr`, giving up after `timeout`.
pub(crate) async fn connect(addr: &str, timeout: Duration) -> Result<TcpStream, TransferError> {
    match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(source)) => Err(TransferError::Connect {
            addr: addr.to_string(),
            source,
        }),
        Err(_) => Err(TransferError::ConnectTimeout {
            addr: addr.to_string(),
            timeout,
        }),
    }
}

/// Requests `SO_SNDBUF`; failures are logged and ignored.
pub(crate) fn tune_send_buffer(stream: &TcpStream, size: usize) {
    let sock = SockRef::from(stream);
    // The kernel may double or clamp the requested value.
    match sock
        .set_send_buffer_size(size)
        .and_then(|()| sock.send_buffer_size())
    {
        Ok(granted) => debug!(requested = size, granted, "send buffer set"),
        Err(source) => warn_advisory("setting the send buffer size", source),
    }
}

/// Requests `SO_RCVBUF`; failures are logged and ignored.
pub(crate) fn tune_recv_buffer(stream: &TcpStream, size: usize) {
    let sock = SockRef::from(stream);
    match sock
        .set_recv_buffer_size(size)
        .and_then(|()| sock.recv_buffer_size())
    {
        Ok(granted) => debug!(requested = size, granted, "receive buffer set"),
        Err(source) => warn_advisory("setting the receive buffer size", source),
    }
}

fn warn_advisory(what: &'static str, source: io::Error) {
    let err = TransferError::Advisory { what, source };
    warn!(kind = %err.kind(), "{err}");
}
