//! Length-prefixed framing for the reliable stream
//!
//! Format: [4 bytes little-endian length][bincode payload]

use std::io;

use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::game::constants::net::{MAX_DATAGRAM_SIZE, MAX_MESSAGE_SIZE};
use crate::net::protocol::{self, DecodeError, EncodeError};

/// Errors that can occur during message framing
#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Message too large: {0} bytes (max {1})")]
    MessageTooLarge(usize, usize),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl FramingError {
    /// Whether the stream can keep being read after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(self, FramingError::Decode(_))
    }
}

/// Read one raw frame, rejecting payloads longer than `max_len`
pub async fn read_frame<R: AsyncRead + Unpin>(
    stream: &mut R,
    max_len: usize,
) -> Result<Vec<u8>, FramingError> {
    let mut len_buf = [0u8; 4];
    match stream.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            return Err(FramingError::ConnectionClosed);
        }
        Err(e) => return Err(FramingError::Io(e)),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > max_len {
        return Err(FramingError::MessageTooLarge(len, max_len));
    }
    if len == 0 {
        return Ok(Vec::new());
    }

    let mut buf = vec![0u8; len];
    match stream.read_exact(&mut buf).await {
        Ok(_) => Ok(buf),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(FramingError::ConnectionClosed),
        Err(e) => Err(FramingError::Io(e)),
    }
}

/// Write one raw frame and flush
pub async fn write_frame<W: AsyncWrite + Unpin>(stream: &mut W, data: &[u8]) -> Result<(), FramingError> {
    if data.len() > MAX_MESSAGE_SIZE {
        return Err(FramingError::MessageTooLarge(data.len(), MAX_MESSAGE_SIZE));
    }

    stream.write_all(&(data.len() as u32).to_le_bytes()).await?;
    stream.write_all(data).await?;
    stream.flush().await?;
    Ok(())
}

/// Read and decode one message.
///
/// A frame that arrives intact but does not decode yields
/// `FramingError::Decode`; the stream stays aligned and the caller may
/// keep reading.
pub async fn read_message<T, R>(stream: &mut R, max_len: usize) -> Result<T, FramingError>
where
    T: DeserializeOwned,
    R: AsyncRead + Unpin,
{
    let frame = read_frame(stream, max_len).await?;
    Ok(protocol::decode(&frame)?)
}

/// Encode and write one message
pub async fn write_message<T, W>(stream: &mut W, message: &T) -> Result<(), FramingError>
where
    T: Serialize,
    W: AsyncWrite + Unpin,
{
    let bytes = protocol::encode(message)?;
    write_frame(stream, &bytes).await
}

/// Validate datagram size (for unreliable messages)
pub fn validate_datagram_size(data: &[u8]) -> Result<(), FramingError> {
    if data.len() > MAX_DATAGRAM_SIZE {
        Err(FramingError::MessageTooLarge(data.len(), MAX_DATAGRAM_SIZE))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::constants::net::MAX_CLIENT_MESSAGE_SIZE;
    use crate::net::protocol::{ClientMessage, SteerInput};
    use std::io::Cursor;

    #[tokio::test]
    async fn test_message_through_frame() {
        let mut buffer = Vec::new();
        write_message(&mut buffer, &ClientMessage::Ping { timestamp: 77 }).await.unwrap();

        // Length prefix matches payload
        let len = u32::from_le_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]) as usize;
        assert_eq!(len, buffer.len() - 4);

        let mut cursor = Cursor::new(buffer);
        let msg: ClientMessage = read_message(&mut cursor, MAX_CLIENT_MESSAGE_SIZE).await.unwrap();
        assert!(matches!(msg, ClientMessage::Ping { timestamp: 77 }));
    }

    #[tokio::test]
    async fn test_empty_frame() {
        let mut buffer = Vec::new();
        write_frame(&mut buffer, b"").await.unwrap();

        let mut cursor = Cursor::new(buffer);
        assert!(read_frame(&mut cursor, MAX_CLIENT_MESSAGE_SIZE).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_write_too_large() {
        let large = vec![0u8; MAX_MESSAGE_SIZE + 1];
        let mut buffer = Vec::new();
        let result = write_frame(&mut buffer, &large).await;
        assert!(matches!(result, Err(FramingError::MessageTooLarge(_, _))));
    }

    #[tokio::test]
    async fn test_client_limit_enforced() {
        let mut buffer = Vec::new();
        buffer.extend_from_slice(&((MAX_CLIENT_MESSAGE_SIZE + 1) as u32).to_le_bytes());
        let mut cursor = Cursor::new(buffer);

        let result = read_frame(&mut cursor, MAX_CLIENT_MESSAGE_SIZE).await;
        assert!(matches!(result, Err(FramingError::MessageTooLarge(_, MAX_CLIENT_MESSAGE_SIZE))));
    }

    #[tokio::test]
    async fn test_read_truncated_length() {
        let mut cursor = Cursor::new(vec![0u8; 2]);
        let result = read_frame(&mut cursor, MAX_CLIENT_MESSAGE_SIZE).await;
        assert!(matches!(result, Err(FramingError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_read_truncated_payload() {
        let mut buffer = Vec::new();
        buffer.extend_from_slice(&10u32.to_le_bytes());
        buffer.extend_from_slice(&[1, 2, 3]);

        let mut cursor = Cursor::new(buffer);
        let result = read_frame(&mut cursor, MAX_CLIENT_MESSAGE_SIZE).await;
        assert!(matches!(result, Err(FramingError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_garbage_frame_keeps_stream_aligned() {
        let mut buffer = Vec::new();
        write_frame(&mut buffer, &[0xFF, 0xFE, 0xFD]).await.unwrap();
        write_message(
            &mut buffer,
            &ClientMessage::Steer(SteerInput {
                sequence: 1,
                heading: 0.5,
                boost: false,
            }),
        )
        .await
        .unwrap();

        let mut cursor = Cursor::new(buffer);
        let first: Result<ClientMessage, _> = read_message(&mut cursor, MAX_CLIENT_MESSAGE_SIZE).await;
        let err = first.unwrap_err();
        assert!(err.is_recoverable());

        let second: ClientMessage = read_message(&mut cursor, MAX_CLIENT_MESSAGE_SIZE).await.unwrap();
        assert!(matches!(second, ClientMessage::Steer(SteerInput { sequence: 1, .. })));
    }

    #[test]
    fn test_validate_datagram_size() {
        assert!(validate_datagram_size(&[0u8; 100]).is_ok());
        assert!(validate_datagram_size(&vec![0u8; MAX_DATAGRAM_SIZE + 1]).is_err());
    }
}
