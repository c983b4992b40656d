// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Routes HTTP/2 requests to registered handlers.
//!
//! Every accepted request gets its response headers immediately; the handler
//! runs in its own task and feeds the response body through a channel, ending
//! with the status trailers. Requests rejected before dispatch get a
//! trailers-only response instead.

use std::sync::Arc;

use h2grpc_protocol::metadata::{
    GRPC_ACCEPT_ENCODING, GRPC_ENCODING, GRPC_TIMEOUT, TRAILER_FIELDS, content_subtype,
    content_type_for,
};
use h2grpc_protocol::timeout::decode_timeout;
use h2grpc_protocol::{Codec, CodecRegistry, CompressorRegistry, Status};
use http::header::{ALLOW, CONTENT_TYPE, TRAILER};
use http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode};
use http_body::Frame;
use http_body_util::BodyExt;
use tokio::time::Instant;
use tracing::{Instrument, debug, info_span, warn};

use super::handler::BoxHandler;
use super::registry::Registry;
use super::stream::{Inbound, Outbound, ServerStream};
use crate::body::{self, BodyReader, BoxBody, ChannelBody, FrameSender};
use crate::context::CallContext;

/// Response frames buffered between a handler and the connection
const RESPONSE_BUFFER: usize = 16;

/// Maps request paths to handlers and runs them
pub struct Dispatcher {
    registry: Registry,
    codecs: CodecRegistry,
    compressors: CompressorRegistry,
    accept_encoding: HeaderValue,
    max_frame_size: usize,
}

impl Dispatcher {
    pub(crate) fn new(
        registry: Registry,
        codecs: CodecRegistry,
        compressors: CompressorRegistry,
        max_frame_size: usize,
    ) -> Self {
        let accept_encoding = HeaderValue::from_str(&compressors.accept_encoding_header())
            .unwrap_or_else(|_| HeaderValue::from_static("identity"));
        Self {
            registry,
            codecs,
            compressors,
            accept_encoding,
            max_frame_size,
        }
    }

    pub(crate) fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Answer one request. Returns as soon as the response headers are known;
    /// the handler keeps running in a spawned task.
    pub fn handle(&self, request: Request<BoxBody>) -> Response<BoxBody> {
        let (parts, body) = request.into_parts();
        let path = parts.uri.path().to_string();

        if parts.method != Method::POST {
            debug!(%path, method = %parts.method, "rejecting non-POST request");
            let mut response = plain_response(StatusCode::METHOD_NOT_ALLOWED);
            response
                .headers_mut()
                .insert(ALLOW, HeaderValue::from_static("POST"));
            return response;
        }

        let Some(codec) = self.codec_for(&parts.headers) else {
            warn!(%path, content_type = ?parts.headers.get(CONTENT_TYPE), "unsupported content-type");
            return plain_response(StatusCode::UNSUPPORTED_MEDIA_TYPE);
        };

        let mut headers = HeaderMap::new();
        if let Ok(content_type) = HeaderValue::from_str(&content_type_for(codec.name())) {
            headers.insert(CONTENT_TYPE, content_type);
        }
        headers.insert(GRPC_ACCEPT_ENCODING, self.accept_encoding.clone());

        let encoding = parts
            .headers
            .get(GRPC_ENCODING)
            .and_then(|v| v.to_str().ok());
        let compressor = match self.compressors.resolve(encoding) {
            Ok(compressor) => compressor,
            Err(e) => {
                warn!(%path, error = %e, "unsupported request encoding");
                return status_response(headers, Status::unimplemented(e.to_string()));
            }
        };

        let Some(method) = self.registry.get(&path) else {
            debug!(%path, "unknown method");
            return status_response(
                headers,
                Status::unimplemented(format!("unknown method {path}")),
            );
        };

        if let Some(compressor) = &compressor
            && let Ok(name) = HeaderValue::from_str(compressor.name())
        {
            headers.insert(GRPC_ENCODING, name);
        }
        headers.insert(TRAILER, HeaderValue::from_static(TRAILER_FIELDS));

        let ctx = self.call_context(&path, &parts.headers);
        let (tx, response_body) = ChannelBody::channel(RESPONSE_BUFFER);
        let stream = ServerStream::new(
            ctx.clone(),
            method.info.clone(),
            parts.headers,
            Inbound {
                reader: BodyReader::new(body),
                codec: codec.clone(),
                compressor: compressor.clone(),
                max_frame_size: self.max_frame_size,
            },
            Outbound {
                sender: tx.clone(),
                codec,
                compressor,
            },
        );

        let span = info_span!("rpc", method = %path);
        tokio::spawn(run_handler(method.handler.clone(), stream, ctx, tx).instrument(span));

        let mut response = Response::new(response_body.boxed_unsync());
        *response.headers_mut() = headers;
        response
    }

    fn codec_for(&self, headers: &HeaderMap) -> Option<Arc<dyn Codec>> {
        let content_type = headers.get(CONTENT_TYPE)?.to_str().ok()?;
        self.codecs.get(content_subtype(content_type)?)
    }

    fn call_context(&self, path: &str, headers: &HeaderMap) -> CallContext {
        let ctx = CallContext::new();
        let Some(value) = headers.get(GRPC_TIMEOUT) else {
            return ctx;
        };
        let decoded = value
            .to_str()
            .map_err(|e| e.to_string())
            .and_then(|v| decode_timeout(v).map_err(|e| e.to_string()));
        match decoded {
            Ok(timeout) => ctx.deadline_at(Instant::now() + timeout),
            Err(e) => {
                warn!(%path, error = %e, "ignoring malformed grpc-timeout");
                ctx
            }
        }
    }
}

async fn run_handler(handler: BoxHandler, stream: ServerStream, ctx: CallContext, tx: FrameSender) {
    let mut call = handler.call(stream);
    let disconnected = tx.clone();

    let result = tokio::select! {
        result = &mut call => result,
        _ = disconnected.closed() => {
            debug!("client went away, cancelling handler");
            ctx.cancel();
            call.await
        }
    };

    let status = match result {
        Ok(()) => Status::ok(),
        Err(e) => e.to_status(),
    };
    debug!(code = %status.code(), "rpc finished");

    // Fails only when the client is gone; nobody is left to read the status.
    let _ = tx.send(Ok(Frame::trailers(status.to_header_map()))).await;
}

fn plain_response(status: StatusCode) -> Response<BoxBody> {
    let mut response = Response::new(body::empty());
    *response.status_mut() = status;
    response
}

/// Trailers-only response: the status rides in the headers and the stream
/// ends without a body.
fn status_response(mut headers: HeaderMap, status: Status) -> Response<BoxBody> {
    status.write_to(&mut headers);
    let mut response = Response::new(body::empty());
    *response.headers_mut() = headers;
    response
}
