// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Calls with a single request message: UnaryUnary and UnaryStream.
//!
//! The request body is known in full once `send` is called, so the call is a
//! plain round trip. No background task or pipe is involved.

use std::sync::Arc;

use h2grpc_protocol::{Code, Message, envelope};
use http::HeaderMap;
use tracing::debug;

use super::ChannelInner;
use super::response::ResponseReader;
use crate::body;
use crate::context::CallContext;
use crate::error::Error;

enum State {
    Created,
    Receiving(Box<ResponseReader>),
    Failed(Error),
    Closed,
}

pub(crate) struct UnaryCall {
    channel: Arc<ChannelInner>,
    ctx: CallContext,
    path: String,
    metadata: HeaderMap,
    server_streaming: bool,
    state: State,
}

impl UnaryCall {
    pub(crate) fn new(
        channel: Arc<ChannelInner>,
        ctx: CallContext,
        path: String,
        metadata: HeaderMap,
        server_streaming: bool,
    ) -> Self {
        Self {
            channel,
            ctx,
            path,
            metadata,
            server_streaming,
            state: State::Created,
        }
    }

    pub(crate) fn context(&self) -> &CallContext {
        &self.ctx
    }

    /// Send the only request message and wait for the response headers
    pub(crate) async fn send(&mut self, message: &dyn Message) -> Result<(), Error> {
        if !matches!(self.state, State::Created) {
            return Err(Error::already_sent());
        }

        match round_trip(&self.channel, &self.ctx, &self.path, &self.metadata, message).await {
            Ok(reader) => {
                self.state = State::Receiving(Box::new(reader));
                Ok(())
            }
            Err(err) => {
                self.state = State::Failed(err.clone());
                Err(err)
            }
        }
    }

    /// Receive the next response message into `target`
    pub(crate) async fn recv(&mut self, target: &mut dyn Message) -> Result<bool, Error> {
        let ctx = &self.ctx;
        let outcome = match &mut self.state {
            State::Created => {
                return Err(Error::protocol(
                    Code::FailedPrecondition,
                    "recv called before send",
                ));
            }
            State::Failed(err) => return Err(err.clone()),
            State::Closed => return Ok(false),
            State::Receiving(reader) if self.server_streaming => {
                ctx.run(reader.next_message(target)).await
            }
            State::Receiving(reader) => ctx
                .run(async { reader.single_message(target).await.map(|()| true) })
                .await,
        };

        match &outcome {
            Ok(true) if self.server_streaming => {}
            Ok(_) => self.state = State::Closed,
            Err(err) => self.state = State::Failed(err.clone()),
        }
        outcome
    }
}

async fn round_trip(
    channel: &ChannelInner,
    ctx: &CallContext,
    path: &str,
    metadata: &HeaderMap,
    message: &dyn Message,
) -> Result<ResponseReader, Error> {
    let payload = envelope::seal(
        channel.codec.as_ref(),
        channel.compressor.as_deref(),
        message,
    )?;
    let request = channel.request(path, ctx, metadata, body::full(payload))?;

    debug!(%path, "sending request");
    let response = ctx.run(channel.transport.round_trip(request)).await?;
    ResponseReader::new(response, channel)
}
