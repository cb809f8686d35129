//! PostgreSQL frame codec (read/write)
//!
//! Framing only: a frame is a 1-byte type tag followed by a 4-byte
//! big-endian length that counts itself plus the payload. The startup
//! message is the single untagged frame and has its own entry points.
//!
//! A clean disconnect exactly at a frame boundary decodes as `Ok(None)`;
//! a stream that ends mid-header or mid-payload is a framing error.
//!
//! Reference: <https://www.postgresql.org/docs/current/protocol-message-formats.html>

use std::collections::HashMap;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{ProxyError, Result};
use crate::protocol::postgres::constants::*;
use crate::protocol::postgres::messages::{read_cstring_from_buf, CancelRequest, StartupMessage};
use crate::protocol::MAX_FRAME_SIZE;

/// Minimum value of the length field (it counts itself)
const MIN_FRAME_LENGTH: u32 = 4;

/// One decoded frame: type tag plus raw payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Message type tag
    pub tag: u8,
    /// Payload bytes, without tag or length header
    pub payload: Vec<u8>,
}

/// What arrived in place of a startup message.
#[derive(Debug)]
pub enum StartupFrame {
    /// Regular startup message with connection parameters
    Startup(StartupMessage),
    /// TLS upgrade request
    SslRequest,
    /// Query cancellation request
    CancelRequest(CancelRequest),
}

/// Read one byte, distinguishing end-of-stream from an I/O error.
///
/// Returns `Ok(None)` when the peer closed the connection before sending
/// anything, which is the only place a disconnect is clean.
async fn read_first_byte<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<u8>> {
    let mut buf = [0u8; 1];
    let n = reader.read(&mut buf).await?;
    if n == 0 {
        return Ok(None);
    }
    Ok(Some(buf[0]))
}

/// `read_exact` that reports a mid-frame end-of-stream as a framing error.
async fn read_exact_framed<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut [u8],
    what: &str,
) -> Result<()> {
    reader.read_exact(buf).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            ProxyError::Framing(format!("stream ended mid-{}", what))
        } else {
            ProxyError::Io(e)
        }
    })?;
    Ok(())
}

fn check_frame_length(length: u32) -> Result<()> {
    if length < MIN_FRAME_LENGTH {
        return Err(ProxyError::Framing(format!(
            "invalid frame length: {}",
            length
        )));
    }
    if length as u64 > MAX_FRAME_SIZE {
        return Err(ProxyError::FrameTooLarge {
            size: length as u64,
            max: MAX_FRAME_SIZE,
        });
    }
    Ok(())
}

/// Read a typed frame (tag byte + length + payload).
///
/// Returns `Ok(None)` on a clean disconnect at a frame boundary.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Frame>> {
    let tag = match read_first_byte(reader).await? {
        Some(tag) => tag,
        None => return Ok(None),
    };

    let mut len_buf = [0u8; 4];
    read_exact_framed(reader, &mut len_buf, "header").await?;
    let length = u32::from_be_bytes(len_buf);
    check_frame_length(length)?;

    // Length counts itself but not the tag byte
    let payload_len = (length - 4) as usize;
    let mut payload = vec![0u8; payload_len];
    if payload_len > 0 {
        read_exact_framed(reader, &mut payload, "payload").await?;
    }

    Ok(Some(Frame { tag, payload }))
}

/// Write a typed frame (tag byte + length + payload).
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    tag: u8,
    payload: &[u8],
) -> Result<()> {
    let length = (payload.len() + 4) as u64;
    if length > MAX_FRAME_SIZE {
        return Err(ProxyError::FrameTooLarge {
            size: length,
            max: MAX_FRAME_SIZE,
        });
    }

    writer.write_all(&[tag]).await?;
    writer.write_all(&(length as u32).to_be_bytes()).await?;
    if !payload.is_empty() {
        writer.write_all(payload).await?;
    }
    writer.flush().await?;
    Ok(())
}

/// Read a startup-phase frame (no tag byte; length counts itself).
///
/// Discriminates SSLRequest and CancelRequest from a regular startup
/// message. Returns `Ok(None)` on a clean disconnect before any byte.
pub async fn read_startup_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<StartupFrame>> {
    let first = match read_first_byte(reader).await? {
        Some(b) => b,
        None => return Ok(None),
    };

    let mut rest = [0u8; 3];
    read_exact_framed(reader, &mut rest, "header").await?;
    let length = u32::from_be_bytes([first, rest[0], rest[1], rest[2]]);

    if length < 8 {
        return Err(ProxyError::Framing(format!(
            "startup frame too short: {} bytes",
            length
        )));
    }
    if length as u64 > MAX_FRAME_SIZE {
        return Err(ProxyError::FrameTooLarge {
            size: length as u64,
            max: MAX_FRAME_SIZE,
        });
    }

    let mut code_buf = [0u8; 4];
    read_exact_framed(reader, &mut code_buf, "header").await?;
    let code = u32::from_be_bytes(code_buf);

    if code == SSL_REQUEST_CODE {
        return Ok(Some(StartupFrame::SslRequest));
    }

    if code == CANCEL_REQUEST_CODE {
        let mut body = [0u8; 8];
        read_exact_framed(reader, &mut body, "payload").await?;
        let process_id = u32::from_be_bytes([body[0], body[1], body[2], body[3]]);
        let secret_key = u32::from_be_bytes([body[4], body[5], body[6], body[7]]);
        return Ok(Some(StartupFrame::CancelRequest(CancelRequest {
            process_id,
            secret_key,
        })));
    }

    if code != PROTOCOL_VERSION_3_0 {
        return Err(ProxyError::Framing(format!(
            "unsupported protocol version: {} (expected {})",
            code, PROTOCOL_VERSION_3_0
        )));
    }

    let remaining = (length - 8) as usize;
    let mut buf = vec![0u8; remaining];
    read_exact_framed(reader, &mut buf, "payload").await?;

    // Parameters are key\0value\0 pairs, ending with an empty key
    let mut parameters = HashMap::new();
    let mut offset = 0;

    while offset < buf.len() {
        let (key, key_len) = read_cstring_from_buf(&buf, offset)?;
        offset += key_len;

        if key.is_empty() {
            break;
        }

        if offset >= buf.len() {
            return Err(ProxyError::Framing("missing value for parameter".into()));
        }
        let (value, value_len) = read_cstring_from_buf(&buf, offset)?;
        offset += value_len;

        parameters.insert(key, value);
    }

    Ok(Some(StartupFrame::Startup(StartupMessage {
        protocol_version: code,
        parameters,
    })))
}

/// Write a startup message (untagged; length counts itself).
pub async fn write_startup_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    msg: &StartupMessage,
) -> Result<()> {
    let mut content = Vec::new();
    content.extend_from_slice(&msg.protocol_version.to_be_bytes());

    for (key, value) in &msg.parameters {
        content.extend_from_slice(key.as_bytes());
        content.push(0);
        content.extend_from_slice(value.as_bytes());
        content.push(0);
    }
    content.push(0);

    let length = (content.len() + 4) as u32;
    writer.write_all(&length.to_be_bytes()).await?;
    writer.write_all(&content).await?;
    writer.flush().await?;
    Ok(())
}

/// Write an SSLRequest (sent to a backend before its TLS upgrade).
pub async fn write_ssl_request<W: AsyncWrite + Unpin>(writer: &mut W) -> Result<()> {
    writer.write_all(&8u32.to_be_bytes()).await?;
    writer.write_all(&SSL_REQUEST_CODE.to_be_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn test_frame_round_trip() {
        for payload in [&b""[..], b"x", b"SELECT 1\0", &[0u8; 8192]] {
            let mut buf = Vec::new();
            write_frame(&mut buf, MSG_QUERY, payload).await.unwrap();

            let mut cursor = Cursor::new(&buf);
            let frame = read_frame(&mut cursor).await.unwrap().unwrap();
            assert_eq!(frame.tag, MSG_QUERY);
            assert_eq!(frame.payload, payload);
        }
    }

    #[tokio::test]
    async fn test_frame_round_trip_at_maximum_size() {
        // Largest payload the length field may describe
        let payload = vec![0x42u8; (MAX_FRAME_SIZE - 4) as usize];
        let mut buf = Vec::new();
        write_frame(&mut buf, b'd', &payload).await.unwrap();

        let mut cursor = Cursor::new(&buf);
        let frame = read_frame(&mut cursor).await.unwrap().unwrap();
        assert_eq!(frame.payload.len(), payload.len());
        assert_eq!(frame.payload, payload);
    }

    #[tokio::test]
    async fn test_clean_eof_at_boundary() {
        let mut cursor = Cursor::new(Vec::new());
        assert!(read_frame(&mut cursor).await.unwrap().is_none());
        let mut cursor = Cursor::new(Vec::new());
        assert!(read_startup_frame(&mut cursor).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_eof_mid_header_is_framing_error() {
        // Tag plus two length bytes, then the stream ends
        let mut cursor = Cursor::new(vec![b'Q', 0x00, 0x00]);
        let err = read_frame(&mut cursor).await.unwrap_err();
        assert!(matches!(err, ProxyError::Framing(_)));
    }

    #[tokio::test]
    async fn test_eof_mid_payload_is_framing_error() {
        // Header promises 16 payload bytes, only 3 arrive
        let mut buf = vec![b'Q'];
        buf.extend_from_slice(&20u32.to_be_bytes());
        buf.extend_from_slice(b"abc");
        let mut cursor = Cursor::new(buf);
        let err = read_frame(&mut cursor).await.unwrap_err();
        assert!(matches!(err, ProxyError::Framing(_)));
    }

    #[tokio::test]
    async fn test_undersized_length_rejected() {
        let mut buf = vec![b'Q'];
        buf.extend_from_slice(&1u32.to_be_bytes());
        let mut cursor = Cursor::new(buf);
        let err = read_frame(&mut cursor).await.unwrap_err();
        assert!(matches!(err, ProxyError::Framing(_)));
    }

    #[tokio::test]
    async fn test_oversized_length_rejected() {
        let mut buf = vec![b'Q'];
        buf.extend_from_slice(&(MAX_FRAME_SIZE as u32 + 1).to_be_bytes());
        let mut cursor = Cursor::new(buf);
        let err = read_frame(&mut cursor).await.unwrap_err();
        assert!(matches!(err, ProxyError::FrameTooLarge { .. }));
    }

    #[tokio::test]
    async fn test_startup_round_trip() {
        let msg = StartupMessage::with_database("operator", "orders");
        let mut buf = Vec::new();
        write_startup_frame(&mut buf, &msg).await.unwrap();

        let mut cursor = Cursor::new(&buf);
        match read_startup_frame(&mut cursor).await.unwrap().unwrap() {
            StartupFrame::Startup(startup) => {
                assert_eq!(startup.protocol_version, PROTOCOL_VERSION_3_0);
                assert_eq!(startup.user(), Some("operator"));
                assert_eq!(startup.database(), Some("orders"));
            }
            other => panic!("expected Startup, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_read_ssl_request() {
        let mut buf = Vec::new();
        write_ssl_request(&mut buf).await.unwrap();

        let mut cursor = Cursor::new(&buf);
        let result = read_startup_frame(&mut cursor).await.unwrap().unwrap();
        assert!(matches!(result, StartupFrame::SslRequest));
    }

    #[tokio::test]
    async fn test_read_cancel_request() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&16u32.to_be_bytes());
        buf.extend_from_slice(&CANCEL_REQUEST_CODE.to_be_bytes());
        buf.extend_from_slice(&42u32.to_be_bytes());
        buf.extend_from_slice(&7u32.to_be_bytes());

        let mut cursor = Cursor::new(&buf);
        match read_startup_frame(&mut cursor).await.unwrap().unwrap() {
            StartupFrame::CancelRequest(req) => {
                assert_eq!(req.process_id, 42);
                assert_eq!(req.secret_key, 7);
            }
            other => panic!("expected CancelRequest, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_protocol_version_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&9u32.to_be_bytes());
        buf.extend_from_slice(&0x0002_0000u32.to_be_bytes());
        buf.push(0);

        let mut cursor = Cursor::new(&buf);
        let err = read_startup_frame(&mut cursor).await.unwrap_err();
        assert!(matches!(err, ProxyError::Framing(_)));
    }
}
