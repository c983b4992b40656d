// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! h2grpc - gRPC-compatible RPC over HTTP/2
//!
//! Client and server engines speaking the gRPC wire protocol, for all four
//! stream shapes, on top of hyper's HTTP/2 implementation.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────┐                 ┌──────────────────────────┐
//! │ Channel / ClientStream   │                 │ Server / ServiceDesc     │
//! │  unary: one round trip   │                 │  interceptors → handler  │
//! │  streaming: pipe + task  │                 │  ServerStream            │
//! ├──────────────────────────┤                 ├──────────────────────────┤
//! │ Transport                │  HTTP/2 (h2c)   │ Dispatcher               │
//! │  HttpTransport ──────────┼────────────────►│  content-type, encoding, │
//! │  LocalTransport ─────────┼── in-process ──►│  path, grpc-timeout      │
//! └──────────────────────────┘                 └──────────────────────────┘
//!               framing, codecs, compression: h2grpc-protocol
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use h2grpc::{CallContext, Channel, Server, ServiceDesc, handler};
//!
//! let server = Server::builder()
//!     .service(ServiceDesc::new("helloworld.Greeter").method(
//!         "SayHello",
//!         handler::unary(|_ctx, req: HelloRequest| async move {
//!             Ok(HelloReply { message: format!("Hello {}", req.name) })
//!         }),
//!     ))
//!     .build();
//! tokio::spawn(async move { server.run().await });
//!
//! let channel = Channel::builder("http://127.0.0.1:50051").build()?;
//! let reply: HelloReply = channel
//!     .unary(CallContext::new(), "/helloworld.Greeter/SayHello", &request)
//!     .await?;
//! ```

pub mod body;
pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod method;
pub mod server;
pub mod transport;

pub use client::{Channel, ChannelBuilder, ClientInterceptor, ClientStream, OutgoingCall};
pub use config::{ClientConfig, ConfigError, ServerConfig};
pub use context::CallContext;
pub use error::{BoxError, Error, ErrorKind};
pub use method::{MethodInfo, StreamShape};
pub use server::{
    BoxHandler, Dispatcher, Handler, Interceptor, MethodHandler, RequestStream, ResponseSink,
    Server, ServerBuilder, ServerError, ServerStream, ServiceDesc, handler,
};
pub use transport::{HttpTransport, LocalTransport, Transport};

// Re-export the wire-level crate
pub use h2grpc_protocol as protocol;
pub use h2grpc_protocol::{Code, Json, JsonCodec, Message, ProtoCodec, Status};
