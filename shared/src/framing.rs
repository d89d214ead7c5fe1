//! Stream framing: every packet travels as `[len:u16][len bytes]`

use crate::protocol::PACKET_HEADER_SIZE;
use std::fmt;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest frame on the wire, length prefix included
pub const MAX_FRAME_SIZE: usize = 1300;
pub const FRAME_PREFIX_SIZE: usize = 2;
pub const MAX_FRAME_BODY: usize = MAX_FRAME_SIZE - FRAME_PREFIX_SIZE;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame of {0} bytes exceeds limit of {MAX_FRAME_BODY}")]
    TooLarge(usize),
    #[error("frame of {0} bytes cannot hold a packet")]
    TooSmall(usize),
    #[error("connection closed")]
    Closed,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to listen on {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },
    #[error("not connected")]
    NotConnected,
}

impl TransportError {
    pub fn reason(&self) -> DisconnectReason {
        match self {
            TransportError::Connect { .. } => DisconnectReason::FailedToConnect,
            TransportError::Bind { .. } | TransportError::NotConnected => {
                DisconnectReason::Unknown
            }
        }
    }
}

/// Why a connection ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    Unknown,
    FailedToConnect,
    Graceful,
    ServerFull,
    ProtocolViolation,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DisconnectReason::Unknown => "connection lost",
            DisconnectReason::FailedToConnect => "failed to connect",
            DisconnectReason::Graceful => "closed",
            DisconnectReason::ServerFull => "server full",
            DisconnectReason::ProtocolViolation => "protocol violation",
        };
        f.write_str(text)
    }
}

pub fn encode_frame(packet: &[u8]) -> Result<Vec<u8>, FrameError> {
    if packet.len() > MAX_FRAME_BODY {
        return Err(FrameError::TooLarge(packet.len()));
    }
    let mut frame = Vec::with_capacity(FRAME_PREFIX_SIZE + packet.len());
    frame.extend_from_slice(&(packet.len() as u16).to_le_bytes());
    frame.extend_from_slice(packet);
    Ok(frame)
}

pub async fn write_frame<W>(writer: &mut W, packet: &[u8]) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(packet)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads exactly one frame body.
///
/// A clean end of stream before the length prefix is `Closed`; anything
/// shorter than a full frame after that is an IO error.
pub async fn read_frame<R>(reader: &mut R) -> Result<Vec<u8>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; FRAME_PREFIX_SIZE];
    match reader.read_exact(&mut prefix).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(FrameError::Closed)
        }
        Err(e) => return Err(e.into()),
    }

    let len = u16::from_le_bytes(prefix) as usize;
    if len > MAX_FRAME_BODY {
        return Err(FrameError::TooLarge(len));
    }
    if len <= PACKET_HEADER_SIZE {
        return Err(FrameError::TooSmall(len));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[test]
    fn test_encode_frame_prefix() {
        let frame = encode_frame(&[1, 2, 3, 4, 5]).unwrap();
        assert_eq!(frame, vec![5, 0, 1, 2, 3, 4, 5]);
        assert!(matches!(
            encode_frame(&vec![0; MAX_FRAME_BODY + 1]),
            Err(FrameError::TooLarge(_))
        ));
    }

    #[tokio::test]
    async fn test_read_frame_across_partial_reads() {
        let mut stream = Builder::new()
            .read(&[6])
            .read(&[0, 1, 2])
            .read(&[3, 4, 5, 6])
            .build();
        let body = read_frame(&mut stream).await.unwrap();
        assert_eq!(body, vec![1, 2, 3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn test_read_two_frames() {
        let mut stream = Builder::new()
            .read(&[5, 0, 9, 9, 9, 9, 9, 5, 0])
            .read(&[8, 8, 8, 8, 8])
            .build();
        assert_eq!(read_frame(&mut stream).await.unwrap(), vec![9; 5]);
        assert_eq!(read_frame(&mut stream).await.unwrap(), vec![8; 5]);
        assert!(matches!(
            read_frame(&mut stream).await,
            Err(FrameError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_truncated_body_is_an_error() {
        let mut stream = Builder::new().read(&[10, 0, 1, 2, 3]).build();
        assert!(matches!(read_frame(&mut stream).await, Err(FrameError::Io(_))));
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let len = (MAX_FRAME_BODY as u16 + 1).to_le_bytes();
        let mut stream = Builder::new().read(&len).build();
        assert!(matches!(
            read_frame(&mut stream).await,
            Err(FrameError::TooLarge(_))
        ));
    }

    #[tokio::test]
    async fn test_write_frame() {
        let mut stream = Builder::new().write(&[2, 0, 7, 8]).build();
        write_frame(&mut stream, &[7, 8]).await.unwrap();
    }
}
