//! Length-prefixed frames.
//!
//! Wire format: `[4-byte length as u32 big-endian] + [payload]`.
//!
//! The handshake options, every header and every body travel as one frame
//! each, so a reader always knows where a value ends even when it cannot (or
//! does not want to) decode it.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::protocol::error::{Result, RpcError};

/// Maximum frame payload (100 MB). Larger frames poison the stream.
pub const MAX_FRAME_SIZE: usize = 100 * 1024 * 1024;

/// Writes one frame. Does not flush.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    if payload.len() > MAX_FRAME_SIZE {
        return Err(RpcError::MessageTooLarge(payload.len(), MAX_FRAME_SIZE));
    }
    let len = payload.len() as u32;

    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;

    Ok(())
}

/// Reads one frame.
///
/// # Errors
///
/// - `Io(UnexpectedEof)` if the stream ends, cleanly or mid-frame
/// - `MessageTooLarge` if the prefix announces more than [`MAX_FRAME_SIZE`]
pub async fn read_frame<R>(reader: &mut R) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(RpcError::MessageTooLarge(len, MAX_FRAME_SIZE));
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;

    Ok(buf)
}
