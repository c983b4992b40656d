// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! h2grpc Protocol - gRPC wire format over HTTP/2
//!
//! This crate holds everything that is visible on the wire and independent of
//! any particular HTTP stack:
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    h2grpc-protocol                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Envelope: codec + compressor + frame prefix                │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Serialization: Protobuf (prost), JSON (serde_json)         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Compression: gzip, deflate (flate2)                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Metadata: grpc-status / grpc-message / grpc-timeout        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use h2grpc_protocol::{ProtoCodec, envelope};
//!
//! let wire = envelope::seal(&ProtoCodec, None, &request)?;
//! ```

pub mod codec;
pub mod compression;
pub mod envelope;
pub mod frame;
pub mod metadata;
pub mod status;
pub mod timeout;

// Re-export main types
pub use codec::{Codec, CodecError, CodecRegistry, Json, JsonCodec, Message, ProtoCodec};
pub use compression::{
    CompressionError, Compressor, CompressorRegistry, DeflateCompressor, GzipCompressor,
};
pub use envelope::EnvelopeError;
pub use frame::{DEFAULT_MAX_FRAME_SIZE, Frame, FrameError, HEADER_SIZE};
pub use status::{Code, Status};
