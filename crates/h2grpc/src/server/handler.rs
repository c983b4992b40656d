// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Method handlers.
//!
//! A [`Handler`] drives one RPC over a raw [`ServerStream`]. The functions in
//! this module wrap typed closures for each stream shape:
//!
//! ```ignore
//! let say_hello = handler::unary(|_ctx, req: HelloRequest| async move {
//!     Ok(HelloReply { message: format!("Hello {}", req.name) })
//! });
//! ```

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use h2grpc_protocol::{Code, Message};

use super::stream::{RequestStream, ResponseSink, ServerStream};
use crate::context::CallContext;
use crate::error::Error;
use crate::method::StreamShape;

/// Serves one RPC. Returning `Ok` ends the call with status OK; an error is
/// reported to the client through [`Error::to_status`].
pub trait Handler: Send + Sync + 'static {
    fn call(&self, stream: ServerStream) -> BoxFuture<'static, Result<(), Error>>;
}

impl<F, Fut> Handler for F
where
    F: Fn(ServerStream) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
{
    fn call(&self, stream: ServerStream) -> BoxFuture<'static, Result<(), Error>> {
        Box::pin(self(stream))
    }
}

pub type BoxHandler = Arc<dyn Handler>;

/// A handler together with the stream shape it serves
#[derive(Clone)]
pub struct MethodHandler {
    pub(crate) shape: StreamShape,
    pub(crate) handler: BoxHandler,
}

impl MethodHandler {
    pub fn new(shape: StreamShape, handler: impl Handler) -> Self {
        Self {
            shape,
            handler: Arc::new(handler),
        }
    }

    pub fn shape(&self) -> StreamShape {
        self.shape
    }
}

/// One request, one response
pub fn unary<Req, Resp, F, Fut>(f: F) -> MethodHandler
where
    Req: Message + Default,
    Resp: Message,
    F: Fn(CallContext, Req) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Resp, Error>> + Send + 'static,
{
    let f = Arc::new(f);
    MethodHandler::new(StreamShape::UnaryUnary, move |stream: ServerStream| {
        let f = f.clone();
        async move {
            let (ctx, mut requests, responses) = stream.into_parts::<Req, Resp>();
            let request = single_request(&mut requests).await?;
            let response = f(ctx, request).await?;
            responses.send(&response).await
        }
    })
}

/// One request, any number of responses pushed through the sink
pub fn server_streaming<Req, Resp, F, Fut>(f: F) -> MethodHandler
where
    Req: Message + Default,
    Resp: Message,
    F: Fn(CallContext, Req, ResponseSink<Resp>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
{
    let f = Arc::new(f);
    MethodHandler::new(StreamShape::UnaryStream, move |stream: ServerStream| {
        let f = f.clone();
        async move {
            let (ctx, mut requests, responses) = stream.into_parts::<Req, Resp>();
            let request = single_request(&mut requests).await?;
            f(ctx, request, responses).await
        }
    })
}

/// A stream of requests, one response
pub fn client_streaming<Req, Resp, F, Fut>(f: F) -> MethodHandler
where
    Req: Message + Default,
    Resp: Message,
    F: Fn(CallContext, RequestStream<Req>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Resp, Error>> + Send + 'static,
{
    let f = Arc::new(f);
    MethodHandler::new(StreamShape::StreamUnary, move |stream: ServerStream| {
        let f = f.clone();
        async move {
            let (ctx, requests, responses) = stream.into_parts::<Req, Resp>();
            let response = f(ctx, requests).await?;
            responses.send(&response).await
        }
    })
}

/// Both directions stream independently
pub fn streaming<Req, Resp, F, Fut>(f: F) -> MethodHandler
where
    Req: Message + Default,
    Resp: Message,
    F: Fn(CallContext, RequestStream<Req>, ResponseSink<Resp>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
{
    let f = Arc::new(f);
    MethodHandler::new(StreamShape::StreamStream, move |stream: ServerStream| {
        let f = f.clone();
        async move {
            let (ctx, requests, responses) = stream.into_parts::<Req, Resp>();
            f(ctx, requests, responses).await
        }
    })
}

async fn single_request<Req: Message + Default>(
    requests: &mut RequestStream<Req>,
) -> Result<Req, Error> {
    requests.recv().await?.ok_or_else(|| {
        Error::protocol(
            Code::Internal,
            "client closed the stream without sending a request",
        )
    })
}
