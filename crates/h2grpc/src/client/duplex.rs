// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Calls with a streaming request: StreamUnary and StreamStream.
//!
//! ```text
//!   send() ──write──► pipe ──► request body ──► transport round trip (task)
//!                                                     │
//!   recv() ◄──────────────── ResponseReader ◄─────────┘ (oneshot)
//! ```
//!
//! The round trip runs in a background task because it only resolves once
//! the server has answered, while the request body is still being written.
//! Three signals connect the task and the caller:
//!
//! - write-ready: the transport started pulling the request body, or the
//!   round trip resolved (an in-process server answers before reading)
//! - read-ready: the response headers arrived (the oneshot above)
//! - done: the task finished; any error it hit is in the [`ErrorSlot`]

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use h2grpc_protocol::{Code, Message, envelope};
use http::{HeaderMap, Request};
use http_body::{Body, Frame, SizeHint};
use http_body_util::BodyExt;
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::ChannelInner;
use super::response::ResponseReader;
use super::signal::{ErrorSlot, ErrorWatch, Ready, Trigger, error_signal, ready_signal};
use crate::body::{self, BoxBody};
use crate::context::CallContext;
use crate::error::{BoxError, Error, ErrorKind};

type ResponseResult = Result<ResponseReader, Error>;

enum ResponseState {
    Pending(oneshot::Receiver<ResponseResult>),
    Receiving(Box<ResponseReader>),
    Failed(Error),
    Closed,
}

pub(crate) struct DuplexCall {
    ctx: CallContext,
    channel: Arc<ChannelInner>,
    server_streaming: bool,
    writer: Option<DuplexStream>,
    write_ready: Ready,
    done: Ready,
    errors: ErrorWatch,
    response: ResponseState,
    terminal: Option<Error>,
    task: JoinHandle<()>,
}

impl DuplexCall {
    /// Start the round trip. The request headers go out right away; messages
    /// follow as they are sent.
    pub(crate) fn open(
        channel: Arc<ChannelInner>,
        ctx: CallContext,
        path: &str,
        metadata: HeaderMap,
        server_streaming: bool,
    ) -> Result<Self, Error> {
        let (writer, pipe) = tokio::io::duplex(channel.pipe_capacity);
        let (write_trigger, write_ready) = ready_signal();
        let request_body = WriteReadyBody {
            inner: body::from_reader(pipe),
            trigger: Some(write_trigger),
        };
        let request = channel.request(path, &ctx, &metadata, request_body.boxed_unsync())?;

        let (error_slot, errors) = error_signal();
        let (done_trigger, done) = ready_signal();
        let (response_tx, response_rx) = oneshot::channel();

        let task = tokio::spawn(round_trip(
            channel.clone(),
            ctx.clone(),
            request,
            error_slot,
            response_tx,
            done_trigger,
        ));

        Ok(Self {
            ctx,
            channel,
            server_streaming,
            writer: Some(writer),
            write_ready,
            done,
            errors,
            response: ResponseState::Pending(response_rx),
            terminal: None,
            task,
        })
    }

    pub(crate) fn context(&self) -> &CallContext {
        &self.ctx
    }

    pub(crate) async fn send(&mut self, message: &dyn Message) -> Result<(), Error> {
        if let Some(err) = &self.terminal {
            return Err(err.clone());
        }
        if let Some(err) = self.errors.get() {
            return Err(Error::poisoned("send", err));
        }
        let payload = envelope::seal(
            self.channel.codec.as_ref(),
            self.channel.compressor.as_deref(),
            message,
        )?;

        let Self {
            ctx,
            writer,
            write_ready,
            done,
            errors,
            ..
        } = self;
        let Some(pipe) = writer.as_mut() else {
            return Err(Error::protocol(
                Code::FailedPrecondition,
                "send called after close_send",
            ));
        };

        let sent = ctx
            .run(async {
                tokio::select! {
                    err = errors.wait() => Err(Error::poisoned("send", err)),
                    written = write(write_ready, done, pipe, &payload) => match written {
                        Ok(()) => Ok(()),
                        Err(e) => {
                            // The transport dropped the request body; the task
                            // knows why.
                            debug!(error = %e, "request pipe closed");
                            done.wait().await;
                            Err(match errors.get() {
                                Some(err) => Error::poisoned("send", err),
                                None => Error::SendClosed,
                            })
                        }
                    },
                }
            })
            .await;

        if let Err(err) = &sent
            && err.kind() == ErrorKind::Context
        {
            self.terminate(err.clone());
        }
        sent
    }

    /// Signal the end of the request stream. Idempotent.
    pub(crate) async fn close_send(&mut self) -> Result<(), Error> {
        if let Some(mut pipe) = self.writer.take()
            && let Err(e) = pipe.shutdown().await
        {
            debug!(error = %e, "failed to close request pipe");
        }
        Ok(())
    }

    pub(crate) async fn recv(&mut self, target: &mut dyn Message) -> Result<bool, Error> {
        if let Some(err) = &self.terminal {
            return Err(err.clone());
        }
        if !self.server_streaming && self.writer.is_some() {
            return Err(Error::protocol(
                Code::FailedPrecondition,
                "close_send must be called before recv",
            ));
        }

        let outcome = self.read(target).await;
        match &outcome {
            Ok(true) if self.server_streaming => {}
            Ok(_) => self.response = ResponseState::Closed,
            Err(err) if err.kind() == ErrorKind::Context => self.terminate(err.clone()),
            Err(err) => self.response = ResponseState::Failed(err.clone()),
        }
        outcome
    }

    async fn read(&mut self, target: &mut dyn Message) -> Result<bool, Error> {
        let ctx = &self.ctx;

        if let ResponseState::Pending(rx) = &mut self.response {
            let received = ctx
                .run(async {
                    match rx.await {
                        Ok(result) => result,
                        Err(_) => Err(Error::protocol(
                            Code::Internal,
                            "call task ended without a response",
                        )),
                    }
                })
                .await;
            self.response = match received {
                Ok(reader) => ResponseState::Receiving(Box::new(reader)),
                Err(err) if err.kind() == ErrorKind::Context => return Err(err),
                Err(err) => return Err(Error::poisoned("recv", err)),
            };
        }

        match &mut self.response {
            ResponseState::Receiving(reader) if self.server_streaming => {
                ctx.run(reader.next_message(target)).await
            }
            ResponseState::Receiving(reader) => {
                ctx.run(async { reader.single_message(target).await.map(|()| true) })
                    .await
            }
            ResponseState::Failed(err) => Err(err.clone()),
            ResponseState::Closed => Ok(false),
            ResponseState::Pending(_) => Err(Error::protocol(
                Code::Internal,
                "response headers not received",
            )),
        }
    }

    /// Give up on the call: both directions are released and the server sees
    /// the stream go away.
    fn terminate(&mut self, err: Error) {
        debug!(error = %err, "abandoning call");
        self.writer = None;
        self.response = ResponseState::Closed;
        self.task.abort();
        self.terminal = Some(err);
    }
}

impl Drop for DuplexCall {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn write(
    write_ready: &mut Ready,
    done: &mut Ready,
    pipe: &mut DuplexStream,
    payload: &[u8],
) -> std::io::Result<()> {
    tokio::select! {
        _ = write_ready.wait() => {}
        _ = done.wait() => {}
    }
    pipe.write_all(payload).await
}

async fn round_trip(
    channel: Arc<ChannelInner>,
    ctx: CallContext,
    request: Request<BoxBody>,
    errors: ErrorSlot,
    response_tx: oneshot::Sender<ResponseResult>,
    _done: Trigger,
) {
    let outcome = match ctx.run(channel.transport.round_trip(request)).await {
        Ok(response) => ResponseReader::new(response, &channel),
        Err(err) => Err(err),
    };

    match outcome {
        Ok(reader) => {
            if let Some(status) = reader.trailers_only_status() {
                debug!(code = %status.code(), "call ended before any response message");
                errors.capture(Error::Application(status));
            }
            let _ = response_tx.send(Ok(reader));
        }
        Err(err) => {
            warn!(error = %err, "round trip failed");
            errors.capture(err.clone());
            let _ = response_tx.send(Err(err));
        }
    }
}

/// Request body that fires the write-ready signal once the transport first
/// polls it, or when it is dropped unpolled.
struct WriteReadyBody {
    inner: BoxBody,
    trigger: Option<Trigger>,
}

impl Body for WriteReadyBody {
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, BoxError>>> {
        let this = self.get_mut();
        if let Some(trigger) = this.trigger.take() {
            trigger.fire();
        }
        Pin::new(&mut this.inner).poll_frame(cx)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::BodyReader;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_write_ready_fires_on_first_poll() {
        let (mut writer, pipe) = tokio::io::duplex(64);
        let (trigger, ready) = ready_signal();
        let body = WriteReadyBody {
            inner: body::from_reader(pipe),
            trigger: Some(trigger),
        };

        assert!(!ready.is_ready());
        writer.write_all(b"abc").await.unwrap();
        drop(writer);

        let mut reader = BodyReader::new(body.boxed_unsync());
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert!(ready.is_ready());
        assert_eq!(out, b"abc");
    }

    #[tokio::test]
    async fn test_write_ready_fires_when_dropped() {
        let (_writer, pipe) = tokio::io::duplex(64);
        let (trigger, ready) = ready_signal();
        let body = WriteReadyBody {
            inner: body::from_reader(pipe),
            trigger: Some(trigger),
        };
        drop(body);
        assert!(ready.is_ready());
    }
}
