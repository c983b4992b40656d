// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for h2grpc tests.
//!
//! Provides the test messages, a greeter and a math service covering all four
//! stream shapes, and helpers to wire a channel to a server.

#![allow(dead_code)]

use h2grpc::{
    CallContext, Channel, Code, Error, RequestStream, ResponseSink, Server, ServerBuilder,
    ServiceDesc, Status, handler,
};
use tracing_subscriber::EnvFilter;

#[derive(Clone, PartialEq, prost::Message)]
pub struct HelloRequest {
    #[prost(string, tag = "1")]
    pub name: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct HelloReply {
    #[prost(string, tag = "1")]
    pub message: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Number {
    #[prost(int64, tag = "1")]
    pub value: i64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Summary {
    #[prost(int64, tag = "1")]
    pub count: i64,
    #[prost(int64, tag = "2")]
    pub total: i64,
}

pub const SAY_HELLO: &str = "/helloworld.Greeter/SayHello";
pub const SUM: &str = "/test.Math/Sum";
pub const SUM_FAIL: &str = "/test.Math/SumFail";
pub const COUNT: &str = "/test.Math/Count";
pub const COUNT_FAIL: &str = "/test.Math/CountFail";
pub const DOUBLE: &str = "/test.Math/Double";
pub const DOUBLE_FAIL: &str = "/test.Math/DoubleFail";

/// Install a test subscriber once; `RUST_LOG` controls verbosity
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// `SayHello` greets by name and rejects an empty one
pub fn greeter() -> ServiceDesc {
    ServiceDesc::new("helloworld.Greeter").method(
        "SayHello",
        handler::unary(|_ctx: CallContext, req: HelloRequest| async move {
            if req.name.is_empty() {
                return Err(Error::from(Status::invalid_argument("name is required")));
            }
            Ok(HelloReply {
                message: format!("Hello {}", req.name),
            })
        }),
    )
}

async fn sum(mut numbers: RequestStream<Number>) -> Result<Summary, Error> {
    let mut summary = Summary::default();
    while let Some(number) = numbers.recv().await? {
        summary.count += 1;
        summary.total += number.value;
    }
    Ok(summary)
}

async fn double(
    mut numbers: RequestStream<Number>,
    out: ResponseSink<Number>,
) -> Result<usize, Error> {
    let mut seen = 0;
    while let Some(number) = numbers.recv().await? {
        out.send(&Number {
            value: number.value * 2,
        })
        .await?;
        seen += 1;
    }
    Ok(seen)
}

/// One method per shape, plus a variant of each that fails after doing its work
pub fn math() -> ServiceDesc {
    ServiceDesc::new("test.Math")
        .method(
            "Sum",
            handler::client_streaming(|_ctx: CallContext, numbers: RequestStream<Number>| {
                sum(numbers)
            }),
        )
        .method(
            "SumFail",
            handler::client_streaming(
                |_ctx: CallContext, numbers: RequestStream<Number>| async move {
                    let summary = sum(numbers).await?;
                    Err::<Summary, _>(Error::from(Status::failed_precondition(format!(
                        "refusing to sum {} numbers",
                        summary.count
                    ))))
                },
            ),
        )
        .method(
            "Count",
            handler::server_streaming(
                |_ctx: CallContext, limit: Number, out: ResponseSink<Number>| async move {
                    for value in 0..limit.value {
                        out.send(&Number { value }).await?;
                    }
                    Ok::<(), Error>(())
                },
            ),
        )
        .method(
            "CountFail",
            handler::server_streaming(
                |_ctx: CallContext, limit: Number, out: ResponseSink<Number>| async move {
                    for value in 0..limit.value {
                        out.send(&Number { value }).await?;
                    }
                    Err::<(), _>(Error::from(Status::resource_exhausted("count limit reached")))
                },
            ),
        )
        .method(
            "Double",
            handler::streaming(
                |_ctx: CallContext, numbers: RequestStream<Number>, out: ResponseSink<Number>| async move {
                    double(numbers, out).await.map(|_| ())
                },
            ),
        )
        .method(
            "DoubleFail",
            handler::streaming(
                |_ctx: CallContext, numbers: RequestStream<Number>, out: ResponseSink<Number>| async move {
                    let seen = double(numbers, out).await?;
                    Err::<(), _>(Error::from(Status::new(
                        Code::DataLoss,
                        format!("lost after {seen} values"),
                    )))
                },
            ),
        )
}

pub fn test_server_builder() -> ServerBuilder {
    Server::builder().service(greeter()).service(math())
}

pub fn test_server() -> Server {
    test_server_builder().build()
}

/// Channel that calls `server` in-process
pub fn local_channel(server: &Server) -> Channel {
    Channel::builder("http://in-process")
        .transport(server.local_transport())
        .build()
        .expect("local channel")
}
