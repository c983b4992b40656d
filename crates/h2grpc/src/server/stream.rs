// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Server side of one RPC.

use std::marker::PhantomData;
use std::sync::Arc;

use h2grpc_protocol::envelope::{self, EnvelopeError};
use h2grpc_protocol::frame::read_frame;
use h2grpc_protocol::{Code, Codec, Compressor, Message};
use http::HeaderMap;
use http_body::Frame;

use crate::body::{BodyReader, FrameSender};
use crate::context::CallContext;
use crate::error::Error;
use crate::method::MethodInfo;

/// Reads framed request messages from the request body
pub(crate) struct Inbound {
    pub(crate) reader: BodyReader,
    pub(crate) codec: Arc<dyn Codec>,
    pub(crate) compressor: Option<Arc<dyn Compressor>>,
    pub(crate) max_frame_size: usize,
}

impl Inbound {
    async fn recv_into(
        &mut self,
        ctx: &CallContext,
        target: &mut dyn Message,
    ) -> Result<bool, Error> {
        let reader = &mut self.reader;
        let max_frame_size = self.max_frame_size;
        let frame = ctx
            .run(async move { read_frame(reader, max_frame_size).await.map_err(Error::from) })
            .await?;

        let Some(frame) = frame else {
            return Ok(false);
        };
        envelope::open(
            frame,
            self.codec.as_ref(),
            self.compressor.as_deref(),
            self.max_frame_size,
            target,
        )
        .map_err(|e| match e {
            EnvelopeError::Codec(e) => {
                Error::protocol(Code::InvalidArgument, format!("failed to decode request: {e}"))
            }
            other => other.into(),
        })?;
        Ok(true)
    }
}

/// Writes framed response messages into the response body
#[derive(Clone)]
pub(crate) struct Outbound {
    pub(crate) sender: FrameSender,
    pub(crate) codec: Arc<dyn Codec>,
    pub(crate) compressor: Option<Arc<dyn Compressor>>,
}

impl Outbound {
    async fn send(&self, ctx: &CallContext, message: &dyn Message) -> Result<(), Error> {
        let payload =
            envelope::seal(self.codec.as_ref(), self.compressor.as_deref(), message)?;
        let sender = &self.sender;
        ctx.run(async move {
            // The receiver goes away when the client resets or abandons the stream.
            sender
                .send(Ok(Frame::data(payload)))
                .await
                .map_err(|_| Error::Cancelled)
        })
        .await
    }
}

/// An in-flight call as seen by a handler or interceptor
pub struct ServerStream {
    ctx: CallContext,
    method: Arc<MethodInfo>,
    metadata: HeaderMap,
    inbound: Inbound,
    outbound: Outbound,
}

impl ServerStream {
    pub(crate) fn new(
        ctx: CallContext,
        method: Arc<MethodInfo>,
        metadata: HeaderMap,
        inbound: Inbound,
        outbound: Outbound,
    ) -> Self {
        Self {
            ctx,
            method,
            metadata,
            inbound,
            outbound,
        }
    }

    /// Cancelled when the client goes away or the propagated deadline passes
    pub fn context(&self) -> &CallContext {
        &self.ctx
    }

    pub fn method(&self) -> &MethodInfo {
        &self.method
    }

    pub(crate) fn method_arc(&self) -> Arc<MethodInfo> {
        self.method.clone()
    }

    /// Request headers
    pub fn metadata(&self) -> &HeaderMap {
        &self.metadata
    }

    /// Next request message, or `None` once the client closed its side
    pub async fn recv<M: Message + Default>(&mut self) -> Result<Option<M>, Error> {
        let mut message = M::default();
        let received = self.inbound.recv_into(&self.ctx, &mut message).await?;
        Ok(received.then_some(message))
    }

    pub async fn send<M: Message>(&mut self, message: &M) -> Result<(), Error> {
        self.outbound.send(&self.ctx, message).await
    }

    /// Split into typed halves that can be used independently
    pub fn into_parts<Req, Resp>(self) -> (CallContext, RequestStream<Req>, ResponseSink<Resp>)
    where
        Req: Message + Default,
        Resp: Message,
    {
        let requests = RequestStream {
            ctx: self.ctx.clone(),
            inbound: self.inbound,
            _marker: PhantomData,
        };
        let responses = ResponseSink {
            ctx: self.ctx.clone(),
            outbound: self.outbound,
            _marker: PhantomData,
        };
        (self.ctx, requests, responses)
    }
}

/// Typed request half of a [`ServerStream`]
pub struct RequestStream<M> {
    ctx: CallContext,
    inbound: Inbound,
    _marker: PhantomData<fn() -> M>,
}

impl<M: Message + Default> RequestStream<M> {
    /// Next request message, or `None` once the client closed its side
    pub async fn recv(&mut self) -> Result<Option<M>, Error> {
        let mut message = M::default();
        let received = self.inbound.recv_into(&self.ctx, &mut message).await?;
        Ok(received.then_some(message))
    }
}

/// Typed response half of a [`ServerStream`]
pub struct ResponseSink<M> {
    ctx: CallContext,
    outbound: Outbound,
    _marker: PhantomData<fn(M)>,
}

impl<M: Message> ResponseSink<M> {
    pub async fn send(&self, message: &M) -> Result<(), Error> {
        self.outbound.send(&self.ctx, message).await
    }
}

impl<M> Clone for ResponseSink<M> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
            outbound: self.outbound.clone(),
            _marker: PhantomData,
        }
    }
}
