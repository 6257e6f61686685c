//! Single-file TCP transfer engines.
//!
//! A sender connects, writes a [`TransferHeader`] and streams the file
//! body; a receiver accepts connections one at a time and writes each body
//! to a destination directory or discards it.
//!
//! Headers always travel through ordinary socket reads and writes. Only the
//! body picks a [`Strategy`]: `sendfile` on the sender and `splice` through
//! a pipe on the receiver when the kernel provides them, otherwise a
//! buffered copy.
//!
//! # Wire format
//!
//! See the [`wire`] module for the byte layout.

pub mod client;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod prewarm;
pub mod receiver;
pub mod server;
mod socket;
pub mod wire;

pub use client::{SendReport, send_file};
pub use config::{Destination, NamePolicy, ReceiveConfig, SendConfig, Source, parse_size};
pub use error::{ErrorKind, TransferError};
pub use receiver::{ReceivedFile, receive_connection};
pub use server::{ConnectionReport, ReceiveServer};
pub use wire::TransferHeader;

use std::fmt;
use std::time::Duration;

/// Chunk size for every body transfer path (64 KiB).
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Timeout for the TCP connection attempt.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Depth of the reader → writer handoff queue in the buffered pipeline.
pub const HANDOFF_DEPTH: usize = 8;

/// How a transfer body was moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Declared size was zero; no body bytes were moved.
    Empty,
    /// Kernel file-to-socket copy (sender).
    SendFile,
    /// Socket → pipe → destination (receiver).
    Splice,
    /// User-space buffer copy.
    Buffered,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Empty => "empty",
            Self::SendFile => "sendfile",
            Self::Splice => "splice",
            Self::Buffered => "buffered",
        })
    }
}
