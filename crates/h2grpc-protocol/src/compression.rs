// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-message compression.
//!
//! A [`Compressor`] is negotiated per call through `grpc-encoding` and applied
//! to every frame whose compressed flag is set. `gzip` and `deflate` (zlib
//! format) ship built in; [`CompressorRegistry`] maps names to instances.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use flate2::Compression;
use flate2::read::{GzDecoder, ZlibDecoder};
use flate2::write::{GzEncoder, ZlibEncoder};
use thiserror::Error;

/// Name reserved for "no compression"
pub const IDENTITY: &str = "identity";

/// Buffers kept per compressor for reuse between messages
const POOL_CAPACITY: usize = 16;

#[derive(Debug, Error)]
pub enum CompressionError {
    #[error("{codec} failed: {source}")]
    Codec {
        codec: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("decompressed message exceeds {limit} bytes")]
    LimitExceeded { limit: usize },

    #[error("unsupported compressor: {0}")]
    Unsupported(String),
}

/// Compresses and decompresses whole message payloads
pub trait Compressor: Send + Sync + 'static {
    /// Name used in `grpc-encoding`; must not change between calls
    fn name(&self) -> &str;

    fn compress(&self, data: &[u8]) -> Result<Bytes, CompressionError>;

    /// Decompress `data`, failing once the output grows past `limit` bytes
    fn decompress(&self, data: &[u8], limit: usize) -> Result<Bytes, CompressionError>;
}

/// Pool of scratch buffers shared by concurrent calls
#[derive(Default)]
struct BufferPool {
    buffers: Mutex<Vec<Vec<u8>>>,
}

impl BufferPool {
    fn checkout(&self) -> PooledBuffer<'_> {
        let buf = self
            .buffers
            .lock()
            .ok()
            .and_then(|mut buffers| buffers.pop())
            .unwrap_or_default();
        PooledBuffer { pool: self, buf }
    }
}

struct PooledBuffer<'a> {
    pool: &'a BufferPool,
    buf: Vec<u8>,
}

impl Drop for PooledBuffer<'_> {
    fn drop(&mut self) {
        let mut buf = std::mem::take(&mut self.buf);
        buf.clear();
        if let Ok(mut buffers) = self.pool.buffers.lock()
            && buffers.len() < POOL_CAPACITY
        {
            buffers.push(buf);
        }
    }
}

fn read_limited<R: Read>(
    codec: &'static str,
    reader: R,
    limit: usize,
    out: &mut Vec<u8>,
) -> Result<Bytes, CompressionError> {
    let ceiling = (limit as u64).saturating_add(1);
    reader
        .take(ceiling)
        .read_to_end(out)
        .map_err(|source| CompressionError::Codec { codec, source })?;
    if out.len() > limit {
        return Err(CompressionError::LimitExceeded { limit });
    }
    Ok(Bytes::copy_from_slice(out))
}

/// gzip (RFC 1952)
pub struct GzipCompressor {
    level: Compression,
    pool: BufferPool,
}

impl GzipCompressor {
    pub fn new() -> Self {
        Self::with_level(Compression::default())
    }

    pub fn with_level(level: Compression) -> Self {
        Self {
            level,
            pool: BufferPool::default(),
        }
    }
}

impl Default for GzipCompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl Compressor for GzipCompressor {
    fn name(&self) -> &str {
        "gzip"
    }

    fn compress(&self, data: &[u8]) -> Result<Bytes, CompressionError> {
        let map_err = |source| CompressionError::Codec {
            codec: "gzip",
            source,
        };
        let mut scratch = self.pool.checkout();
        let mut encoder = GzEncoder::new(&mut scratch.buf, self.level);
        encoder.write_all(data).map_err(map_err)?;
        encoder.finish().map_err(map_err)?;
        Ok(Bytes::copy_from_slice(&scratch.buf))
    }

    fn decompress(&self, data: &[u8], limit: usize) -> Result<Bytes, CompressionError> {
        let mut scratch = self.pool.checkout();
        read_limited("gzip", GzDecoder::new(data), limit, &mut scratch.buf)
    }
}

/// deflate in zlib framing (RFC 1950), as gRPC's `deflate` encoding specifies
pub struct DeflateCompressor {
    level: Compression,
    pool: BufferPool,
}

impl DeflateCompressor {
    pub fn new() -> Self {
        Self::with_level(Compression::default())
    }

    pub fn with_level(level: Compression) -> Self {
        Self {
            level,
            pool: BufferPool::default(),
        }
    }
}

impl Default for DeflateCompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl Compressor for DeflateCompressor {
    fn name(&self) -> &str {
        "deflate"
    }

    fn compress(&self, data: &[u8]) -> Result<Bytes, CompressionError> {
        let map_err = |source| CompressionError::Codec {
            codec: "deflate",
            source,
        };
        let mut scratch = self.pool.checkout();
        let mut encoder = ZlibEncoder::new(&mut scratch.buf, self.level);
        encoder.write_all(data).map_err(map_err)?;
        encoder.finish().map_err(map_err)?;
        Ok(Bytes::copy_from_slice(&scratch.buf))
    }

    fn decompress(&self, data: &[u8], limit: usize) -> Result<Bytes, CompressionError> {
        let mut scratch = self.pool.checkout();
        read_limited("deflate", ZlibDecoder::new(data), limit, &mut scratch.buf)
    }
}

/// Name → compressor map
#[derive(Clone, Default)]
pub struct CompressorRegistry {
    compressors: BTreeMap<String, Arc<dyn Compressor>>,
}

impl CompressorRegistry {
    /// Empty registry: only identity is accepted
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding `gzip` and `deflate`
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(GzipCompressor::new());
        registry.register(DeflateCompressor::new());
        registry
    }

    /// Register a compressor, replacing any compressor with the same name
    pub fn register<C: Compressor>(&mut self, compressor: C) {
        self.register_arc(Arc::new(compressor));
    }

    pub fn register_arc(&mut self, compressor: Arc<dyn Compressor>) {
        self.compressors
            .insert(compressor.name().to_string(), compressor);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Compressor>> {
        self.compressors.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.compressors.keys().map(String::as_str)
    }

    /// Comma-separated names for `grpc-accept-encoding`, identity included
    pub fn accept_encoding_header(&self) -> String {
        std::iter::once(IDENTITY)
            .chain(self.names())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Resolve a `grpc-encoding` value. Absent, empty and `identity` mean no
    /// compression; unknown names are an error.
    pub fn resolve(
        &self,
        encoding: Option<&str>,
    ) -> Result<Option<Arc<dyn Compressor>>, CompressionError> {
        match encoding.map(str::trim) {
            None | Some("") | Some(IDENTITY) => Ok(None),
            Some(name) => self
                .get(name)
                .map(Some)
                .ok_or_else(|| CompressionError::Unsupported(name.to_string())),
        }
    }
}

impl fmt::Debug for CompressorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.compressors.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<u8> {
        b"the quick brown fox jumps over the lazy dog "
            .iter()
            .copied()
            .cycle()
            .take(4096)
            .collect()
    }

    #[test]
    fn test_gzip_round_trip() {
        let gzip = GzipCompressor::new();
        let data = sample();
        let compressed = gzip.compress(&data).unwrap();
        assert!(compressed.len() < data.len());
        assert_eq!(&compressed[..2], &[0x1f, 0x8b]);

        let restored = gzip.decompress(&compressed, data.len()).unwrap();
        assert_eq!(&restored[..], &data[..]);
    }

    #[test]
    fn test_deflate_uses_zlib_framing() {
        let deflate = DeflateCompressor::new();
        let data = sample();
        let compressed = deflate.compress(&data).unwrap();
        assert_eq!(compressed[0] & 0x0f, 8);
        assert_eq!(u16::from_be_bytes([compressed[0], compressed[1]]) % 31, 0);

        let restored = deflate.decompress(&compressed, data.len()).unwrap();
        assert_eq!(&restored[..], &data[..]);
    }

    #[test]
    fn test_decompress_enforces_limit() {
        let gzip = GzipCompressor::new();
        let data = sample();
        let compressed = gzip.compress(&data).unwrap();

        let result = gzip.decompress(&compressed, data.len() - 1);
        assert!(matches!(
            result,
            Err(CompressionError::LimitExceeded { limit }) if limit == data.len() - 1
        ));
    }

    #[test]
    fn test_decompress_garbage() {
        let result = DeflateCompressor::new().decompress(b"not zlib", 1024);
        assert!(matches!(result, Err(CompressionError::Codec { codec: "deflate", .. })));
    }

    #[test]
    fn test_pool_reuses_buffers() {
        let gzip = GzipCompressor::new();
        for _ in 0..4 {
            gzip.compress(b"payload").unwrap();
        }
        assert_eq!(gzip.pool.buffers.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_registry_resolve() {
        let registry = CompressorRegistry::with_defaults();
        assert!(registry.resolve(None).unwrap().is_none());
        assert!(registry.resolve(Some("")).unwrap().is_none());
        assert!(registry.resolve(Some("identity")).unwrap().is_none());
        assert_eq!(registry.resolve(Some("gzip")).unwrap().unwrap().name(), "gzip");
        assert!(matches!(
            registry.resolve(Some("br")),
            Err(CompressionError::Unsupported(name)) if name == "br"
        ));
    }

    #[test]
    fn test_accept_encoding_header() {
        assert_eq!(CompressorRegistry::new().accept_encoding_header(), "identity");
        assert_eq!(
            CompressorRegistry::with_defaults().accept_encoding_header(),
            "identity,deflate,gzip"
        );
    }
}
