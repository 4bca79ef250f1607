use crate::wire::Message;
use bytes::{Bytes, BytesMut};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Duration;

/// Upper bound on a single frame. A full catch-up batch of 10 000 entries
/// fits comfortably below this; anything larger is a protocol violation.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("connection i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("connection read timed out")]
    Timeout,
    #[error("peer closed the connection")]
    Closed,
    #[error("frame of {0} bytes exceeds the {MAX_FRAME_LEN} byte cap")]
    Oversized(usize),
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Writes one length-prefixed message: 4-byte big-endian length, then the
/// JSON document.
pub async fn write_message<W>(writer: &mut W, message: &Message) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    let payload = Bytes::from(serde_json::to_vec(message)?);
    if payload.len() > MAX_FRAME_LEN {
        return Err(WireError::Oversized(payload.len()));
    }

    writer.write_all(&(payload.len() as u32).to_be_bytes()).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one length-prefixed message. The whole read (prefix and payload) is
/// bounded by `read_timeout`; a clean EOF before the first prefix byte is
/// reported as `Closed`.
pub async fn read_message<R>(reader: &mut R, read_timeout: Duration) -> Result<Message, WireError>
where
    R: AsyncRead + Unpin,
{
    match tokio::time::timeout(read_timeout, read_frame(reader)).await {
        Ok(result) => result,
        Err(_elapsed) => Err(WireError::Timeout),
    }
}

async fn read_frame<R>(reader: &mut R) -> Result<Message, WireError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    if let Err(e) = reader.read_exact(&mut len_buf).await {
        return match e.kind() {
            io::ErrorKind::UnexpectedEof => Err(WireError::Closed),
            _ => Err(WireError::Io(e)),
        };
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(WireError::Oversized(len));
    }

    let mut payload = BytesMut::zeroed(len);
    reader.read_exact(&mut payload).await?;

    Ok(serde_json::from_slice(&payload)?)
}

/// One request/response exchange on an established connection.
pub async fn exchange<S>(
    stream: &mut S,
    request: &Message,
    read_timeout: Duration,
) -> Result<Message, WireError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    write_message(stream, request).await?;
    read_message(stream, read_timeout).await
}
