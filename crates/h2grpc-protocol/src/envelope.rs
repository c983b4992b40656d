// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Message envelopes: codec + optional compressor + frame prefix.

use bytes::Bytes;
use thiserror::Error;
use tracing::trace;

use crate::codec::{Codec, CodecError, Message};
use crate::compression::{CompressionError, Compressor};
use crate::frame::{Frame, FrameError};

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("compression error: {0}")]
    Compression(#[from] CompressionError),

    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("received compressed message without a negotiated grpc-encoding")]
    MissingCompressor,
}

/// Marshal `message` and wrap it in a frame, compressing when a compressor is given.
pub fn seal(
    codec: &dyn Codec,
    compressor: Option<&dyn Compressor>,
    message: &dyn Message,
) -> Result<Bytes, EnvelopeError> {
    let payload = codec.marshal(message)?;
    let frame = match compressor {
        Some(compressor) => Frame::new(true, compressor.compress(&payload)?)?,
        None => Frame::new(false, payload)?,
    };
    trace!(
        codec = codec.name(),
        compressed = frame.compressed,
        len = frame.len(),
        "sealed message"
    );
    Ok(frame.encode())
}

/// Decompress (if flagged) and unmarshal a received frame into `target`.
///
/// Decompressed payloads are held to the same `max_message_size` as frames.
pub fn open(
    frame: Frame,
    codec: &dyn Codec,
    compressor: Option<&dyn Compressor>,
    max_message_size: usize,
    target: &mut dyn Message,
) -> Result<(), EnvelopeError> {
    let payload = if frame.compressed {
        let compressor = compressor.ok_or(EnvelopeError::MissingCompressor)?;
        compressor.decompress(&frame.payload, max_message_size)?
    } else {
        frame.payload
    };
    codec.unmarshal(payload, target)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ProtoCodec;
    use crate::compression::GzipCompressor;
    use crate::frame::{DEFAULT_MAX_FRAME_SIZE, HEADER_SIZE};

    #[derive(Clone, PartialEq, prost::Message)]
    struct HelloRequest {
        #[prost(string, tag = "1")]
        name: String,
    }

    fn request() -> HelloRequest {
        HelloRequest {
            name: "world".repeat(64),
        }
    }

    #[test]
    fn test_seal_plain() {
        let sealed = seal(&ProtoCodec, None, &request()).unwrap();
        assert_eq!(sealed[0], 0);

        let frame = Frame::decode_from_bytes(sealed, DEFAULT_MAX_FRAME_SIZE).unwrap();
        let mut decoded = HelloRequest::default();
        open(frame, &ProtoCodec, None, DEFAULT_MAX_FRAME_SIZE, &mut decoded).unwrap();
        assert_eq!(decoded, request());
    }

    #[test]
    fn test_seal_compressed() {
        let gzip = GzipCompressor::new();
        let sealed = seal(&ProtoCodec, Some(&gzip), &request()).unwrap();
        assert_eq!(sealed[0], 1);
        assert!(sealed.len() - HEADER_SIZE < request().name.len());

        let frame = Frame::decode_from_bytes(sealed, DEFAULT_MAX_FRAME_SIZE).unwrap();
        let mut decoded = HelloRequest::default();
        open(frame, &ProtoCodec, Some(&gzip), DEFAULT_MAX_FRAME_SIZE, &mut decoded).unwrap();
        assert_eq!(decoded, request());
    }

    #[test]
    fn test_open_compressed_without_compressor() {
        let gzip = GzipCompressor::new();
        let sealed = seal(&ProtoCodec, Some(&gzip), &request()).unwrap();
        let frame = Frame::decode_from_bytes(sealed, DEFAULT_MAX_FRAME_SIZE).unwrap();

        let mut decoded = HelloRequest::default();
        let result = open(frame, &ProtoCodec, None, DEFAULT_MAX_FRAME_SIZE, &mut decoded);
        assert!(matches!(result, Err(EnvelopeError::MissingCompressor)));
    }

    #[test]
    fn test_open_decompression_bomb() {
        let gzip = GzipCompressor::new();
        let sealed = seal(&ProtoCodec, Some(&gzip), &request()).unwrap();
        let frame = Frame::decode_from_bytes(sealed, DEFAULT_MAX_FRAME_SIZE).unwrap();

        let mut decoded = HelloRequest::default();
        let result = open(frame, &ProtoCodec, Some(&gzip), 32, &mut decoded);
        assert!(matches!(
            result,
            Err(EnvelopeError::Compression(CompressionError::LimitExceeded { limit: 32 }))
        ));
    }
}
