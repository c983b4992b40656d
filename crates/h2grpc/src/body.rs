// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP body adapters.
//!
//! - [`BodyReader`] exposes a body's data frames as an `AsyncRead` so the frame
//!   codec can consume it, and keeps the trailers when they arrive.
//! - [`ChannelBody`] is the server's response body, fed frame by frame from
//!   the handler task.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::{Buf, Bytes};
use futures::TryStreamExt;
use http::HeaderMap;
use http_body::{Body, Frame};
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::mpsc;
use tokio_util::io::ReaderStream;

use crate::error::BoxError;

/// Body type used for both requests and responses
pub type BoxBody = http_body_util::combinators::UnsyncBoxBody<Bytes, BoxError>;

/// Frames flowing into a [`ChannelBody`]
pub type FrameSender = mpsc::Sender<Result<Frame<Bytes>, BoxError>>;

pub fn full(data: Bytes) -> BoxBody {
    Full::new(data).map_err(|never| match never {}).boxed_unsync()
}

pub fn empty() -> BoxBody {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// Stream everything written to the other end of `reader` as the body
pub fn from_reader<R>(reader: R) -> BoxBody
where
    R: AsyncRead + Send + 'static,
{
    let stream = ReaderStream::new(reader)
        .map_ok(Frame::data)
        .map_err(|e| Box::new(e) as BoxError);
    StreamBody::new(stream).boxed_unsync()
}

/// Convert any compatible body into a [`BoxBody`]
pub fn boxed<B>(body: B) -> BoxBody
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    body.map_err(Into::into).boxed_unsync()
}

/// `AsyncRead` over the data frames of a body
pub struct BodyReader {
    body: BoxBody,
    chunk: Bytes,
    trailers: Option<HeaderMap>,
    finished: bool,
}

impl BodyReader {
    pub fn new(body: BoxBody) -> Self {
        Self {
            body,
            chunk: Bytes::new(),
            trailers: None,
            finished: false,
        }
    }

    /// Trailers, once the body has been read to the end
    pub fn trailers(&self) -> Option<&HeaderMap> {
        self.trailers.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.finished && self.chunk.is_empty()
    }

    /// Discard the rest of the body so the trailers become available
    pub async fn drain(&mut self) -> Result<(), BoxError> {
        self.chunk.clear();
        while !self.finished {
            match self.body.frame().await {
                Some(Ok(frame)) => {
                    if let Ok(trailers) = frame.into_trailers() {
                        self.trailers = Some(trailers);
                    }
                }
                Some(Err(e)) => {
                    self.finished = true;
                    return Err(e);
                }
                None => self.finished = true,
            }
        }
        Ok(())
    }
}

impl AsyncRead for BodyReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            if !this.chunk.is_empty() {
                let n = this.chunk.len().min(buf.remaining());
                buf.put_slice(&this.chunk[..n]);
                this.chunk.advance(n);
                return Poll::Ready(Ok(()));
            }
            if this.finished {
                return Poll::Ready(Ok(()));
            }

            match ready!(Pin::new(&mut this.body).poll_frame(cx)) {
                Some(Ok(frame)) => match frame.into_data() {
                    Ok(data) => this.chunk = data,
                    Err(frame) => {
                        if let Ok(trailers) = frame.into_trailers() {
                            this.trailers = Some(trailers);
                        }
                    }
                },
                Some(Err(e)) => {
                    this.finished = true;
                    return Poll::Ready(Err(io::Error::other(e)));
                }
                None => this.finished = true,
            }
        }
    }
}

/// Response body fed through an mpsc channel
pub struct ChannelBody {
    rx: mpsc::Receiver<Result<Frame<Bytes>, BoxError>>,
}

impl ChannelBody {
    pub fn channel(capacity: usize) -> (FrameSender, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { rx })
    }
}

impl Body for ChannelBody {
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, BoxError>>> {
        self.rx.poll_recv(cx)
    }
}
