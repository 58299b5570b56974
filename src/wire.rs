//! Transport framing for frame groups over a plain TCP stream.
//!
//! The reference transport frames multipart messages itself; plain TCP does
//! not, so each frame group is written as one logical unit: a big-endian
//! `u32` frame count, then per frame a big-endian `u32` length and the frame
//! bytes. This framing is local to this implementation, not part of the
//! wire protocol proper.

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum number of frames accepted in a single group. Guards against a
/// corrupt or hostile length prefix driving an unbounded allocation.
const MAX_FRAMES: u32 = 64;

/// Maximum size of a single frame, in bytes.
const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

pub async fn write_frame_group<W: AsyncWrite + Unpin>(
    writer: &mut W,
    frames: &[Bytes],
) -> std::io::Result<()> {
    writer.write_u32(frames.len() as u32).await?;
    for frame in frames {
        writer.write_u32(frame.len() as u32).await?;
        writer.write_all(frame).await?;
    }
    writer.flush().await
}

/// Reads one frame group, or `Ok(None)` if the peer closed the connection
/// cleanly before sending a new group.
pub async fn read_frame_group<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> std::io::Result<Option<Vec<Bytes>>> {
    let count = match reader.read_u32().await {
        Ok(count) => count,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    };
    if count > MAX_FRAMES {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("frame group claims {count} frames, limit is {MAX_FRAMES}"),
        ));
    }
    let mut frames = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let len = reader.read_u32().await?;
        if len > MAX_FRAME_LEN {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("frame claims {len} bytes, limit is {MAX_FRAME_LEN}"),
            ));
        }
        let mut buf = vec![0u8; len as usize];
        reader.read_exact(&mut buf).await?;
        frames.push(Bytes::from(buf));
    }
    Ok(Some(frames))
}
