//! Length-prefixed framing over a byte stream
//!
//! Each frame is `[length: u16 big-endian][payload]`. Short reads and short
//! writes are absorbed here so callers only ever see whole payloads.

use crate::error::{ProtocolError, Result};
use log::debug;
use std::io::ErrorKind;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a frame payload, type byte included
pub const MAX_MESSAGE_SIZE: usize = 8192;

/// Width of the length prefix
pub const LENGTH_PREFIX_LEN: usize = 2;

/// Writes one frame and flushes it
pub async fn send<W>(writer: &mut W, payload: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge(payload.len()));
    }

    let mut frame = Vec::with_capacity(LENGTH_PREFIX_LEN + payload.len());
    frame.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    frame.extend_from_slice(payload);

    writer.write_all(&frame).await.map_err(map_io_error)?;
    writer.flush().await.map_err(map_io_error)?;

    debug!("Sent frame with {} payload bytes", payload.len());
    Ok(())
}

/// Reads exactly one frame and returns its payload
pub async fn receive<R>(reader: &mut R) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; LENGTH_PREFIX_LEN];
    reader.read_exact(&mut prefix).await.map_err(map_io_error)?;

    let len = u16::from_be_bytes(prefix) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge(len));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await.map_err(map_io_error)?;

    debug!("Received frame with {} payload bytes", len);
    Ok(payload)
}

/// Premature end of stream and zero-progress writes both mean the peer is gone
fn map_io_error(err: std::io::Error) -> ProtocolError {
    match err.kind() {
        ErrorKind::UnexpectedEof
        | ErrorKind::WriteZero
        | ErrorKind::BrokenPipe
        | ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted => ProtocolError::ConnectionClosed,
        _ => ProtocolError::Io(err),
    }
}
