// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Frame and envelope tests for h2grpc-protocol.

use bytes::Bytes;
use h2grpc_protocol::frame::{self, Frame, FrameError, HEADER_SIZE, read_frame, write_frame};
use h2grpc_protocol::{Code, CompressorRegistry, EnvelopeError, Json, JsonCodec, envelope};
use proptest::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Feature {
    name: String,
    latitude: i32,
    longitude: i32,
}

#[test]
fn test_frame_header_format() {
    let frame = Frame::new(false, Bytes::from_static(b"hello")).unwrap();
    let encoded = frame.encode();

    assert_eq!(encoded.len(), HEADER_SIZE + 5);
    assert_eq!(encoded[0], 0);
    assert_eq!(&encoded[1..5], &5u32.to_be_bytes());
    assert_eq!(&encoded[5..], b"hello");
}

#[test]
fn test_frame_decode_ignores_trailing_bytes() {
    let mut wire = frame::encode(b"first", false).unwrap().to_vec();
    wire.extend_from_slice(b"junk");

    let frame = Frame::decode_from_bytes(Bytes::from(wire), 1024).unwrap();
    assert_eq!(frame.payload, Bytes::from_static(b"first"));
}

#[test]
fn test_frame_decode_truncated_payload() {
    let mut wire = frame::encode(b"payload", false).unwrap().to_vec();
    wire.truncate(HEADER_SIZE + 3);

    let result = Frame::decode_from_bytes(Bytes::from(wire), 1024);
    assert!(matches!(
        result,
        Err(FrameError::UnexpectedEof {
            expected: 7,
            received: 3
        })
    ));
}

#[tokio::test]
async fn test_write_then_read_over_duplex() {
    let (mut client, mut server) = tokio::io::duplex(64);

    let writer = tokio::spawn(async move {
        for i in 0..10u8 {
            let frame = Frame::new(i % 2 == 1, vec![i; i as usize * 10]).unwrap();
            write_frame(&mut client, &frame).await.unwrap();
        }
    });

    let mut seen = 0u8;
    while let Some(frame) = read_frame(&mut server, 4096).await.unwrap() {
        assert_eq!(frame.compressed, seen % 2 == 1);
        assert_eq!(frame.len(), seen as usize * 10);
        assert!(frame.payload.iter().all(|b| *b == seen));
        seen += 1;
    }

    writer.await.unwrap();
    assert_eq!(seen, 10);
}

#[tokio::test]
async fn test_read_frame_rejects_oversized_frame() {
    let wire = frame::encode(&[7u8; 100], false).unwrap();
    let mut reader = &wire[..];

    let result = read_frame(&mut reader, 99).await;
    assert!(matches!(
        result,
        Err(FrameError::FrameTooLarge { size: 100, max: 99 })
    ));
}

#[test]
fn test_json_envelope_with_negotiated_compressor() {
    let registry = CompressorRegistry::with_defaults();
    let deflate = registry.resolve(Some("deflate")).unwrap().unwrap();

    let feature = Json(Feature {
        name: "Patriots Path, Mendham, NJ 07945, USA".to_string(),
        latitude: 407838351,
        longitude: -746143763,
    });
    let sealed = envelope::seal(&JsonCodec, Some(deflate.as_ref()), &feature).unwrap();
    assert_eq!(sealed[0], 1);

    let frame = Frame::decode_from_bytes(sealed, 1024).unwrap();
    let mut decoded = Json::<Feature>::default();
    envelope::open(frame, &JsonCodec, Some(deflate.as_ref()), 1024, &mut decoded).unwrap();
    assert_eq!(decoded, feature);
}

#[test]
fn test_envelope_codec_mismatch() {
    let sealed = envelope::seal(&JsonCodec, None, &Json(Feature::default())).unwrap();
    let frame = Frame::decode_from_bytes(sealed, 1024).unwrap();

    let mut decoded = Json::<Vec<u32>>::default();
    let result = envelope::open(frame, &JsonCodec, None, 1024, &mut decoded);
    assert!(matches!(result, Err(EnvelopeError::Codec(_))));
}

#[test]
fn test_code_values_are_stable() {
    assert_eq!(Code::Ok as u32, 0);
    assert_eq!(Code::Unimplemented as u32, 12);
    assert_eq!(Code::Unauthenticated as u32, 16);
}

proptest! {
    #[test]
    fn prop_frame_survives_encoding(compressed: bool, payload in proptest::collection::vec(any::<u8>(), 0..2048)) {
        let encoded = frame::encode(&payload, compressed).unwrap();
        prop_assert_eq!(encoded.len(), HEADER_SIZE + payload.len());

        let decoded = Frame::decode_from_bytes(encoded, 2048).unwrap();
        prop_assert_eq!(decoded.compressed, compressed);
        prop_assert_eq!(&decoded.payload[..], &payload[..]);
    }

    #[test]
    fn prop_reserved_flags_rejected(flag in 2u8..=255) {
        let wire = Bytes::from(vec![flag, 0, 0, 0, 0]);
        let result = Frame::decode_from_bytes(wire, 16);
        prop_assert!(matches!(result, Err(FrameError::InvalidFlag(f)) if f == flag));
    }
}
