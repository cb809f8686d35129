//! MySQL packet codec (read/write)
//!
//! This is a generic "length header describes the frame" codec adapted to
//! the MySQL header, where the 3-byte little-endian length field counts the
//! payload but **not** the sequence byte that follows it. Because the
//! codec's frame unit is `[sequence, payload...]`, the decoded length must
//! be incremented by one on read and the encoded length decremented by one
//! on write. This correction must hold in both directions or framing
//! desynchronizes after the first packet.
//!
//! Reference: <https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_basic_packets.html>

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{ProxyError, Result};
use crate::protocol::MAX_FRAME_SIZE;

/// Wire header length (3 length bytes; the sequence byte belongs to the frame)
pub const HEADER_LEN: usize = 3;

/// Read one packet, returning the frame `[sequence, payload...]`.
///
/// Returns `Ok(None)` on a clean disconnect at a packet boundary; a stream
/// that ends inside the header or the frame body is a framing error.
pub async fn read_packet<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut first = [0u8; 1];
    let n = reader.read(&mut first).await?;
    if n == 0 {
        return Ok(None);
    }

    let mut rest = [0u8; 2];
    reader.read_exact(&mut rest).await.map_err(framing_eof)?;

    let payload_len = u32::from_le_bytes([first[0], rest[0], rest[1], 0]);

    // The header does not count the sequence byte; the frame does.
    let frame_len = payload_len as u64 + 1;
    if frame_len > MAX_FRAME_SIZE {
        return Err(ProxyError::FrameTooLarge {
            size: frame_len,
            max: MAX_FRAME_SIZE,
        });
    }

    let mut frame = vec![0u8; frame_len as usize];
    reader.read_exact(&mut frame).await.map_err(framing_eof)?;

    Ok(Some(frame))
}

/// Write one packet from a frame `[sequence, payload...]`.
///
/// The encoded length is the frame length minus the sequence byte.
pub async fn write_packet<W: AsyncWrite + Unpin>(writer: &mut W, frame: &[u8]) -> Result<()> {
    if frame.is_empty() {
        return Err(ProxyError::Framing(
            "packet frame must carry a sequence byte".into(),
        ));
    }
    if frame.len() as u64 > MAX_FRAME_SIZE {
        return Err(ProxyError::FrameTooLarge {
            size: frame.len() as u64,
            max: MAX_FRAME_SIZE,
        });
    }

    let payload_len = (frame.len() - 1) as u32;
    let header = [
        (payload_len & 0xFF) as u8,
        ((payload_len >> 8) & 0xFF) as u8,
        ((payload_len >> 16) & 0xFF) as u8,
    ];

    writer.write_all(&header).await?;
    writer.write_all(frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Build a frame from a sequence id and payload.
pub fn build_frame(sequence: u8, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(1 + payload.len());
    frame.push(sequence);
    frame.extend_from_slice(payload);
    frame
}

/// The sequence id of a frame.
pub fn sequence_id(frame: &[u8]) -> Option<u8> {
    frame.first().copied()
}

/// The command byte of a client command frame (first payload byte).
pub fn command_byte(frame: &[u8]) -> Option<u8> {
    frame.get(1).copied()
}

fn framing_eof(e: std::io::Error) -> ProxyError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        ProxyError::Framing("stream ended mid-packet".into())
    } else {
        ProxyError::Io(e)
    }
}
