// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Method descriptors shared by client and server.

use std::fmt;

/// Which side of a call streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamShape {
    /// One request, one response
    UnaryUnary,
    /// One request, a stream of responses
    UnaryStream,
    /// A stream of requests, one response
    StreamUnary,
    /// Both directions stream
    StreamStream,
}

impl StreamShape {
    pub fn from_streaming(client_streaming: bool, server_streaming: bool) -> Self {
        match (client_streaming, server_streaming) {
            (false, false) => StreamShape::UnaryUnary,
            (false, true) => StreamShape::UnaryStream,
            (true, false) => StreamShape::StreamUnary,
            (true, true) => StreamShape::StreamStream,
        }
    }

    pub fn client_streaming(self) -> bool {
        matches!(self, StreamShape::StreamUnary | StreamShape::StreamStream)
    }

    pub fn server_streaming(self) -> bool {
        matches!(self, StreamShape::UnaryStream | StreamShape::StreamStream)
    }
}

/// Static description of one registered method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodInfo {
    /// Method name without the service prefix
    pub name: String,
    /// Full path: `/<service>/<method>`
    pub full_method: String,
    pub client_streaming: bool,
    pub server_streaming: bool,
}

impl MethodInfo {
    pub fn new(service: &str, name: &str, shape: StreamShape) -> Self {
        Self {
            name: name.to_string(),
            full_method: format!("/{service}/{name}"),
            client_streaming: shape.client_streaming(),
            server_streaming: shape.server_streaming(),
        }
    }

    pub fn shape(&self) -> StreamShape {
        StreamShape::from_streaming(self.client_streaming, self.server_streaming)
    }
}

impl fmt::Display for MethodInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_method)
    }
}
