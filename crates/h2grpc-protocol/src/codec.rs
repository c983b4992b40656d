// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Payload codecs.
//!
//! A [`Codec`] turns a [`Message`] into payload bytes and back. Codecs are
//! selected per call by name (the `+name` suffix of the content type), so the
//! trait is object-safe and works on `&dyn Message`. A message type opts into
//! the formats it supports:
//!
//! - every `prost::Message + Default` type speaks protobuf (`"proto"`)
//! - [`Json<T>`] wraps any serde type for the `"json"` codec

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Errors that can occur while marshaling or unmarshaling a payload
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("message type does not support the {format} format")]
    Unsupported { format: &'static str },

    #[error("protobuf decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Custom(String),
}

/// Message capability shared by all codecs.
///
/// Each method defaults to [`CodecError::Unsupported`]; implementations
/// override the formats they can produce.
pub trait Message: Send + Sync + 'static {
    fn encode_protobuf(&self) -> Result<Vec<u8>, CodecError> {
        Err(CodecError::Unsupported { format: "proto" })
    }

    fn merge_protobuf(&mut self, _data: Bytes) -> Result<(), CodecError> {
        Err(CodecError::Unsupported { format: "proto" })
    }

    fn encode_json(&self) -> Result<Vec<u8>, CodecError> {
        Err(CodecError::Unsupported { format: "json" })
    }

    fn merge_json(&mut self, _data: &[u8]) -> Result<(), CodecError> {
        Err(CodecError::Unsupported { format: "json" })
    }
}

impl<T> Message for T
where
    T: prost::Message + Default + 'static,
{
    fn encode_protobuf(&self) -> Result<Vec<u8>, CodecError> {
        Ok(prost::Message::encode_to_vec(self))
    }

    fn merge_protobuf(&mut self, data: Bytes) -> Result<(), CodecError> {
        prost::Message::merge(self, data)?;
        Ok(())
    }
}

/// Serde-backed message for the JSON codec
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Json<T>(pub T);

impl<T> Json<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Message for Json<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn encode_json(&self) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(&self.0)?)
    }

    fn merge_json(&mut self, data: &[u8]) -> Result<(), CodecError> {
        self.0 = serde_json::from_slice(data)?;
        Ok(())
    }
}

/// Marshals messages for one content subtype
pub trait Codec: Send + Sync + 'static {
    /// Name used in `application/grpc+<name>`; must not change between calls
    fn name(&self) -> &str;

    fn marshal(&self, message: &dyn Message) -> Result<Bytes, CodecError>;

    fn unmarshal(&self, data: Bytes, target: &mut dyn Message) -> Result<(), CodecError>;
}

/// Protocol Buffers codec, the mandatory default
#[derive(Debug, Clone, Copy, Default)]
pub struct ProtoCodec;

impl Codec for ProtoCodec {
    fn name(&self) -> &str {
        "proto"
    }

    fn marshal(&self, message: &dyn Message) -> Result<Bytes, CodecError> {
        Ok(Bytes::from(message.encode_protobuf()?))
    }

    fn unmarshal(&self, data: Bytes, target: &mut dyn Message) -> Result<(), CodecError> {
        target.merge_protobuf(data)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn name(&self) -> &str {
        "json"
    }

    fn marshal(&self, message: &dyn Message) -> Result<Bytes, CodecError> {
        Ok(Bytes::from(message.encode_json()?))
    }

    fn unmarshal(&self, data: Bytes, target: &mut dyn Message) -> Result<(), CodecError> {
        target.merge_json(&data)
    }
}

/// Name → codec map. Always holds the protobuf codec.
#[derive(Clone)]
pub struct CodecRegistry {
    codecs: BTreeMap<String, Arc<dyn Codec>>,
}

impl CodecRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            codecs: BTreeMap::new(),
        };
        registry.register(ProtoCodec);
        registry
    }

    /// Register a codec, replacing any codec with the same name
    pub fn register<C: Codec>(&mut self, codec: C) {
        self.register_arc(Arc::new(codec));
    }

    pub fn register_arc(&mut self, codec: Arc<dyn Codec>) {
        self.codecs.insert(codec.name().to_string(), codec);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Codec>> {
        self.codecs.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.codecs.keys().map(String::as_str)
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.codecs.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Clone, PartialEq, prost::Message)]
    struct Point {
        #[prost(int32, tag = "1")]
        latitude: i32,
        #[prost(int32, tag = "2")]
        longitude: i32,
    }

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Note {
        text: String,
    }

    #[test]
    fn test_proto_codec_round_trip() {
        let codec = ProtoCodec;
        let point = Point {
            latitude: 409146138,
            longitude: -746188906,
        };

        let bytes = codec.marshal(&point).unwrap();
        let mut decoded = Point::default();
        codec.unmarshal(bytes, &mut decoded).unwrap();
        assert_eq!(decoded, point);
    }

    #[test]
    fn test_json_codec_round_trip() {
        let codec = JsonCodec;
        let note = Json(Note {
            text: "first message".to_string(),
        });

        let bytes = codec.marshal(&note).unwrap();
        assert_eq!(&bytes[..], br#"{"text":"first message"}"#);

        let mut decoded = Json::<Note>::default();
        codec.unmarshal(bytes, &mut decoded).unwrap();
        assert_eq!(decoded, note);
    }

    #[test]
    fn test_codec_rejects_unsupported_format() {
        let point = Point::default();
        let result = JsonCodec.marshal(&point);
        assert!(matches!(result, Err(CodecError::Unsupported { format: "json" })));

        let mut note = Json::<Note>::default();
        let result = ProtoCodec.unmarshal(Bytes::new(), &mut note);
        assert!(matches!(result, Err(CodecError::Unsupported { format: "proto" })));
    }

    #[test]
    fn test_proto_decode_error() {
        let mut point = Point::default();
        let result = ProtoCodec.unmarshal(Bytes::from_static(&[0x08]), &mut point);
        assert!(matches!(result, Err(CodecError::Decode(_))));
    }

    #[test]
    fn test_registry_defaults_to_proto() {
        let registry = CodecRegistry::default();
        assert!(registry.get("proto").is_some());
        assert!(registry.get("json").is_none());
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["proto"]);
    }

    #[test]
    fn test_registry_register() {
        let mut registry = CodecRegistry::new();
        registry.register(JsonCodec);
        assert_eq!(registry.get("json").unwrap().name(), "json");
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["json", "proto"]);
    }
}
