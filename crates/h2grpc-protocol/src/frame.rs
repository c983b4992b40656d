// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Wire format for gRPC message framing.
//!
//! Request and response bodies carry a sequence of frames:
//! - 1 byte: compressed flag (0 = plain, 1 = compressed)
//! - 4 bytes: payload length (big-endian)
//! - N bytes: payload, compressed when the flag is set

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Frame prefix size (1 byte flag + 4 bytes length)
pub const HEADER_SIZE: usize = 5;

/// Default ceiling for a single inbound frame (4 MB, the usual gRPC receive limit)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 4 * 1024 * 1024;

const FLAG_PLAIN: u8 = 0;
const FLAG_COMPRESSED: u8 = 1;

/// Errors that can occur during frame encoding/decoding
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("invalid frame flag: {0:#04x}")]
    InvalidFlag(u8),

    #[error("truncated frame header: got {0} of {HEADER_SIZE} bytes")]
    TruncatedHeader(usize),

    #[error("unexpected end of stream: expected {expected} payload bytes, got {received}")]
    UnexpectedEof { expected: usize, received: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One length-prefixed message on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub compressed: bool,
    pub payload: Bytes,
}

impl Frame {
    /// Create a frame, rejecting payloads whose length does not fit the 4-byte prefix
    pub fn new(compressed: bool, payload: impl Into<Bytes>) -> Result<Self, FrameError> {
        let payload = payload.into();
        if payload.len() > u32::MAX as usize {
            return Err(FrameError::FrameTooLarge {
                size: payload.len(),
                max: u32::MAX as usize,
            });
        }
        Ok(Self {
            compressed,
            payload,
        })
    }

    /// Payload length as transmitted in the prefix
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Encode the frame to bytes for wire transmission
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + self.payload.len());
        buf.put_u8(if self.compressed {
            FLAG_COMPRESSED
        } else {
            FLAG_PLAIN
        });
        buf.put_u32(self.payload.len() as u32);
        buf.put(self.payload.clone());
        buf.freeze()
    }

    /// Decode exactly one frame from a complete buffer
    pub fn decode_from_bytes(mut bytes: Bytes, max_frame_size: usize) -> Result<Self, FrameError> {
        if bytes.len() < HEADER_SIZE {
            return Err(FrameError::TruncatedHeader(bytes.len()));
        }

        let (compressed, length) = parse_header(&bytes[..HEADER_SIZE], max_frame_size)?;
        bytes.advance(HEADER_SIZE);

        if bytes.len() < length {
            return Err(FrameError::UnexpectedEof {
                expected: length,
                received: bytes.len(),
            });
        }

        let payload = bytes.split_to(length);
        Ok(Self {
            compressed,
            payload,
        })
    }
}

/// Prepend the 5-byte prefix to `payload`.
pub fn encode(payload: &[u8], compressed: bool) -> Result<Bytes, FrameError> {
    Ok(Frame::new(compressed, Bytes::copy_from_slice(payload))?.encode())
}

fn parse_header(header: &[u8], max_frame_size: usize) -> Result<(bool, usize), FrameError> {
    let compressed = match header[0] {
        FLAG_PLAIN => false,
        FLAG_COMPRESSED => true,
        other => return Err(FrameError::InvalidFlag(other)),
    };

    let length = u32::from_be_bytes([header[1], header[2], header[3], header[4]]) as usize;
    if length > max_frame_size {
        return Err(FrameError::FrameTooLarge {
            size: length,
            max: max_frame_size,
        });
    }

    Ok((compressed, length))
}

/// Write a frame to an async writer
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    frame: &Frame,
) -> Result<(), FrameError> {
    let encoded = frame.encode();
    writer.write_all(&encoded).await?;
    Ok(())
}

/// Read the next frame from an async reader.
///
/// Returns `Ok(None)` when the reader is exhausted exactly at a frame boundary.
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_frame_size: usize,
) -> Result<Option<Frame>, FrameError> {
    let mut header = [0u8; HEADER_SIZE];
    let filled = read_full(reader, &mut header).await?;
    if filled == 0 {
        return Ok(None);
    }
    if filled < HEADER_SIZE {
        return Err(FrameError::TruncatedHeader(filled));
    }

    let (compressed, length) = parse_header(&header, max_frame_size)?;
    if length == 0 {
        return Ok(Some(Frame {
            compressed,
            payload: Bytes::new(),
        }));
    }

    let mut payload = vec![0u8; length];
    let received = read_full(reader, &mut payload).await?;
    if received < length {
        return Err(FrameError::UnexpectedEof {
            expected: length,
            received,
        });
    }

    Ok(Some(Frame {
        compressed,
        payload: Bytes::from(payload),
    }))
}

/// Like `read_exact`, but reports how far it got instead of failing on EOF.
async fn read_full<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]).await {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_size_constant() {
        assert_eq!(HEADER_SIZE, 5);
    }

    #[test]
    fn test_encode_layout() {
        let frame = Frame::new(true, Bytes::from_static(b"abc")).unwrap();
        let encoded = frame.encode();
        assert_eq!(&encoded[..], &[1, 0, 0, 0, 3, b'a', b'b', b'c']);
    }

    #[test]
    fn test_encode_uncompressed_flag() {
        let encoded = encode(b"hi", false).unwrap();
        assert_eq!(encoded[0], 0);
        assert_eq!(u32::from_be_bytes([encoded[1], encoded[2], encoded[3], encoded[4]]), 2);
    }

    #[test]
    fn test_decode_rejects_reserved_flag_bits() {
        let data = Bytes::from_static(&[0x02, 0, 0, 0, 0]);
        let result = Frame::decode_from_bytes(data, DEFAULT_MAX_FRAME_SIZE);
        assert!(matches!(result, Err(FrameError::InvalidFlag(0x02))));
    }

    #[test]
    fn test_decode_rejects_oversized_length() {
        let data = Bytes::from_static(&[0, 0, 0, 0x01, 0x00]);
        let result = Frame::decode_from_bytes(data, 16);
        assert!(matches!(
            result,
            Err(FrameError::FrameTooLarge { size: 256, max: 16 })
        ));
    }

    #[test]
    fn test_decode_truncated_header() {
        let data = Bytes::from_static(&[0, 0, 0]);
        let result = Frame::decode_from_bytes(data, DEFAULT_MAX_FRAME_SIZE);
        assert!(matches!(result, Err(FrameError::TruncatedHeader(3))));
    }

    #[tokio::test]
    async fn test_read_frame_clean_eof() {
        let mut reader: &[u8] = &[];
        let frame = read_frame(&mut reader, DEFAULT_MAX_FRAME_SIZE).await.unwrap();
        assert!(frame.is_none());
    }

    #[tokio::test]
    async fn test_read_frame_partial_header() {
        let mut reader: &[u8] = &[0, 0];
        let result = read_frame(&mut reader, DEFAULT_MAX_FRAME_SIZE).await;
        assert!(matches!(result, Err(FrameError::TruncatedHeader(2))));
    }

    #[tokio::test]
    async fn test_read_frame_partial_payload() {
        let mut reader: &[u8] = &[0, 0, 0, 0, 4, 1, 2];
        let result = read_frame(&mut reader, DEFAULT_MAX_FRAME_SIZE).await;
        assert!(matches!(
            result,
            Err(FrameError::UnexpectedEof {
                expected: 4,
                received: 2
            })
        ));
    }

    #[tokio::test]
    async fn test_read_frame_empty_payload() {
        let mut reader: &[u8] = &[0, 0, 0, 0, 0];
        let frame = read_frame(&mut reader, DEFAULT_MAX_FRAME_SIZE)
            .await
            .unwrap()
            .unwrap();
        assert!(!frame.compressed);
        assert!(frame.is_empty());
    }

    #[tokio::test]
    async fn test_read_consecutive_frames() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&encode(b"one", false).unwrap());
        wire.extend_from_slice(&encode(b"two", true).unwrap());

        let mut reader = wire.as_slice();
        let first = read_frame(&mut reader, 64).await.unwrap().unwrap();
        let second = read_frame(&mut reader, 64).await.unwrap().unwrap();
        let end = read_frame(&mut reader, 64).await.unwrap();

        assert_eq!(first.payload, Bytes::from_static(b"one"));
        assert!(!first.compressed);
        assert_eq!(second.payload, Bytes::from_static(b"two"));
        assert!(second.compressed);
        assert!(end.is_none());
    }

    #[test]
    fn test_frame_error_display() {
        let err = FrameError::FrameTooLarge { size: 10, max: 5 };
        assert_eq!(err.to_string(), "frame too large: 10 bytes (max: 5)");

        let err = FrameError::TruncatedHeader(2);
        assert_eq!(err.to_string(), "truncated frame header: got 2 of 5 bytes");
    }
}
