// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Header names and content-type handling shared by client and server.

use http::HeaderName;

pub const GRPC_STATUS: HeaderName = HeaderName::from_static("grpc-status");
pub const GRPC_MESSAGE: HeaderName = HeaderName::from_static("grpc-message");
pub const GRPC_ENCODING: HeaderName = HeaderName::from_static("grpc-encoding");
pub const GRPC_ACCEPT_ENCODING: HeaderName = HeaderName::from_static("grpc-accept-encoding");
pub const GRPC_TIMEOUT: HeaderName = HeaderName::from_static("grpc-timeout");

/// Value of the `Trailer` response header announcing the status fields
pub const TRAILER_FIELDS: &str = "grpc-status, grpc-message";

/// Content type shared by every codec; `+<codec>` selects one
pub const BASE_CONTENT_TYPE: &str = "application/grpc";

/// Codec implied by a bare `application/grpc`
pub const DEFAULT_SUBTYPE: &str = "proto";

/// Extract the codec name from a `Content-Type` value.
///
/// `application/grpc` and `application/grpc;params` select the default codec,
/// `application/grpc+name[;params]` selects `name`. Anything else is not gRPC.
pub fn content_subtype(content_type: &str) -> Option<&str> {
    let rest = content_type.trim().strip_prefix(BASE_CONTENT_TYPE)?;

    if rest.is_empty() || rest.starts_with(';') {
        return Some(DEFAULT_SUBTYPE);
    }

    let subtype = rest.strip_prefix('+')?;
    let subtype = subtype.split(';').next().unwrap_or_default().trim();
    if subtype.is_empty() {
        None
    } else {
        Some(subtype)
    }
}

/// `Content-Type` value for a codec name
pub fn content_type_for(codec_name: &str) -> String {
    format!("{BASE_CONTENT_TYPE}+{codec_name}")
}
