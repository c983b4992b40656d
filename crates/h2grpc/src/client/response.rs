// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Response side of a client call.

use std::sync::Arc;

use h2grpc_protocol::envelope;
use h2grpc_protocol::frame::read_frame;
use h2grpc_protocol::metadata::{GRPC_ENCODING, content_subtype};
use h2grpc_protocol::{Code, Codec, Compressor, Message, Status};
use http::header::CONTENT_TYPE;
use http::{HeaderMap, Response, StatusCode};
use tracing::{debug, warn};

use super::ChannelInner;
use crate::body::{BodyReader, BoxBody};
use crate::error::Error;

/// Validated response: headers checked, body readable frame by frame
pub(crate) struct ResponseReader {
    headers: HeaderMap,
    body: BodyReader,
    codec: Arc<dyn Codec>,
    compressor: Option<Arc<dyn Compressor>>,
    max_frame_size: usize,
}

impl ResponseReader {
    /// Check the status line and headers of a response
    pub(crate) fn new(response: Response<BoxBody>, channel: &ChannelInner) -> Result<Self, Error> {
        let (parts, body) = response.into_parts();

        if parts.status != StatusCode::OK {
            let status = Status::from_header_map(&parts.headers).unwrap_or_else(|| {
                Status::new(
                    Code::from_http_status(parts.status.as_u16()),
                    format!("unexpected HTTP status code {}", parts.status),
                )
            });
            debug!(http_status = %parts.status, "call rejected");
            return Err(Error::Protocol(status));
        }

        let content_type = parts
            .headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if content_subtype(content_type).is_none() {
            return Err(Error::protocol(
                Code::Internal,
                format!("unexpected content-type {content_type:?}"),
            ));
        }

        let encoding = parts
            .headers
            .get(GRPC_ENCODING)
            .and_then(|v| v.to_str().ok());
        let compressor = channel
            .compressors
            .resolve(encoding)
            .map_err(|e| Error::protocol(Code::Internal, format!("response {e}")))?;

        Ok(Self {
            headers: parts.headers,
            body: BodyReader::new(body),
            codec: channel.codec.clone(),
            compressor,
            max_frame_size: channel.max_frame_size,
        })
    }

    /// Non-OK status sent in the response headers, ending the call before
    /// any message
    pub(crate) fn trailers_only_status(&self) -> Option<Status> {
        Status::from_header_map(&self.headers).filter(|status| !status.is_ok())
    }

    /// Read the next message into `target`. `Ok(false)` means the stream
    /// ended with status OK.
    pub(crate) async fn next_message(&mut self, target: &mut dyn Message) -> Result<bool, Error> {
        let frame = match read_frame(&mut self.body, self.max_frame_size).await {
            Ok(frame) => frame,
            Err(e) => return Err(self.fail(e.into()).await),
        };
        let Some(frame) = frame else {
            return self.final_status().map(|()| false);
        };

        let opened = envelope::open(
            frame,
            self.codec.as_ref(),
            self.compressor.as_deref(),
            self.max_frame_size,
            target,
        );
        match opened {
            Ok(()) => Ok(true),
            Err(e) => Err(self.fail(e.into()).await),
        }
    }

    /// Read exactly one message, then the final status
    pub(crate) async fn single_message(&mut self, target: &mut dyn Message) -> Result<(), Error> {
        if !self.next_message(target).await? {
            return Err(Error::protocol(
                Code::Internal,
                "server closed the stream without sending a response",
            ));
        }
        if let Err(e) = self.body.drain().await {
            return Err(Error::transport(e));
        }
        self.final_status()
    }

    /// A local read failure. The server's own non-OK status, if it sent
    /// one, explains the failure better.
    async fn fail(&mut self, local: Error) -> Error {
        if let Err(e) = self.body.drain().await {
            debug!(error = %e, "failed to drain response body");
        }
        match self.remote_status() {
            Some(status) if !status.is_ok() => Error::Application(status),
            _ => {
                warn!(error = %local, "failed to read response");
                local
            }
        }
    }

    fn remote_status(&self) -> Option<Status> {
        self.body
            .trailers()
            .and_then(Status::from_header_map)
            .or_else(|| Status::from_header_map(&self.headers))
    }

    fn final_status(&self) -> Result<(), Error> {
        let status = Status::from_metadata(self.body.trailers(), &self.headers);
        if status.is_ok() {
            Ok(())
        } else {
            Err(Error::Application(status))
        }
    }
}
