//! TCP wire format for a single-file transfer.
//!
//! # Wire format
//!
//! ```text
//! PER CONNECTION (Sender -> Receiver):
//!   [2 bytes BE: name_len]
//!   [name_len bytes: file name UTF-8]
//!   [8 bytes BE: size]
//!   [size bytes: raw file data]
//! ```
//!
//! There is no version, checksum or end marker; the connection is closed
//! after the body.

use std::fmt;
use std::io;
use std::string::FromUtf8Error;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Width of the name length field.
pub const NAME_LEN_FIELD: usize = 2;

/// Width of the size field.
pub const SIZE_FIELD: usize = 8;

/// The header framing one transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferHeader {
    /// File name announced by the sender.
    pub name: String,
    /// Exact number of body bytes that follow.
    pub size: u64,
}

impl TransferHeader {
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
        }
    }

    /// Encoded length of this header in bytes.
    pub fn encoded_len(&self) -> usize {
        NAME_LEN_FIELD + self.name.len() + SIZE_FIELD
    }
}

/// Header field being decoded, for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderField {
    NameLength,
    Name,
    Size,
}

impl fmt::Display for HeaderField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NameLength => "name length",
            Self::Name => "name",
            Self::Size => "size",
        })
    }
}

/// Errors produced by the header codec.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("name too long: {0} bytes (max {max})", max = u16::MAX)]
    NameTooLong(usize),

    #[error("stream closed before the {0} field was complete")]
    Truncated(HeaderField),

    #[error("I/O error reading the {field} field: {source}")]
    Io {
        field: HeaderField,
        #[source]
        source: io::Error,
    },

    #[error("I/O error writing header: {0}")]
    Write(#[source] io::Error),

    #[error("invalid UTF-8 name: {0}")]
    InvalidName(#[from] FromUtf8Error),
}

/// Encodes a header into its wire bytes.
pub fn encode_header(header: &TransferHeader) -> Result<Vec<u8>, WireError> {
    let name = header.name.as_bytes();
    let name_len = u16::try_from(name.len()).map_err(|_| WireError::NameTooLong(name.len()))?;

    let mut buf = Vec::with_capacity(header.encoded_len());
    buf.extend_from_slice(&name_len.to_be_bytes());
    buf.extend_from_slice(name);
    buf.extend_from_slice(&header.size.to_be_bytes());
    Ok(buf)
}

/// Writes a header to the stream in a single write.
pub async fn write_header<W: AsyncWrite + Unpin>(
    writer: &mut W,
    header: &TransferHeader,
) -> Result<(), WireError> {
    let buf = encode_header(header)?;
    writer.write_all(&buf).await.map_err(WireError::Write)
}

/// Reads a header from the stream.
///
/// Reads exactly the header bytes and nothing more, so the body can be
/// taken from the same descriptor afterwards. A stream that ends inside
/// any field is [`WireError::Truncated`].
pub async fn read_header<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<TransferHeader, WireError> {
    let mut len_buf = [0u8; NAME_LEN_FIELD];
    read_field(reader, &mut len_buf, HeaderField::NameLength).await?;
    let name_len = u16::from_be_bytes(len_buf) as usize;

    let mut name_buf = vec![0u8; name_len];
    read_field(reader, &mut name_buf, HeaderField::Name).await?;
    let name = String::from_utf8(name_buf)?;

    let mut size_buf = [0u8; SIZE_FIELD];
    read_field(reader, &mut size_buf, HeaderField::Size).await?;
    let size = u64::from_be_bytes(size_buf);

    Ok(TransferHeader { name, size })
}

async fn read_field<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut [u8],
    field: HeaderField,
) -> Result<(), WireError> {
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(WireError::Truncated(field)),
        Err(source) => Err(WireError::Io { field, source }),
    }
}
