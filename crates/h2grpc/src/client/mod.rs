// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! gRPC client: channels and typed call streams.
//!
//! A [`Channel`] is cheap to clone and can run any number of concurrent
//! calls. Each call is a [`ClientStream`]; the shape decides how it is
//! driven:
//!
//! | Shape        | Request body           | Round trip                 |
//! |--------------|------------------------|----------------------------|
//! | UnaryUnary   | one buffered message   | in `send`                  |
//! | UnaryStream  | one buffered message   | in `send`                  |
//! | StreamUnary  | pipe fed by `send`     | background task from start |
//! | StreamStream | pipe fed by `send`     | background task from start |

mod duplex;
mod interceptor;
mod response;
mod signal;
mod unary;

use std::marker::PhantomData;
use std::sync::Arc;

use h2grpc_protocol::metadata::{GRPC_ACCEPT_ENCODING, GRPC_ENCODING, GRPC_TIMEOUT, content_type_for};
use h2grpc_protocol::timeout::encode_timeout;
use h2grpc_protocol::{
    Code, Codec, Compressor, CompressorRegistry, Message, ProtoCodec,
};
use http::header::{CONTENT_TYPE, TE, USER_AGENT};
use http::{HeaderMap, HeaderValue, Method, Request};
use tracing::{debug, instrument};

use crate::body::BoxBody;
use crate::config::ClientConfig;
use crate::context::CallContext;
use crate::error::Error;
use crate::method::StreamShape;
use crate::transport::{HttpTransport, Transport};

use duplex::DuplexCall;
pub use interceptor::{ClientInterceptor, OutgoingCall};
use unary::UnaryCall;

const DEFAULT_USER_AGENT: &str = concat!("h2grpc/", env!("CARGO_PKG_VERSION"));

/// Settings shared by every call on a channel
pub(crate) struct ChannelInner {
    endpoint: String,
    transport: Arc<dyn Transport>,
    codec: Arc<dyn Codec>,
    compressor: Option<Arc<dyn Compressor>>,
    compressors: CompressorRegistry,
    max_frame_size: usize,
    pipe_capacity: usize,
    content_type: HeaderValue,
    accept_encoding: HeaderValue,
    user_agent: HeaderValue,
    interceptors: Vec<Arc<dyn ClientInterceptor>>,
}

impl ChannelInner {
    /// Build the HTTP request for a call on `path`. `metadata` from
    /// interceptors never replaces protocol headers.
    fn request(
        &self,
        path: &str,
        ctx: &CallContext,
        metadata: &HeaderMap,
        body: BoxBody,
    ) -> Result<Request<BoxBody>, Error> {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(format!("{}{}", self.endpoint, path))
            .header(CONTENT_TYPE, self.content_type.clone())
            .header(TE, HeaderValue::from_static("trailers"))
            .header(USER_AGENT, self.user_agent.clone())
            .header(GRPC_ACCEPT_ENCODING, self.accept_encoding.clone());

        if let Some(compressor) = &self.compressor {
            builder = builder.header(GRPC_ENCODING, compressor.name());
        }
        if let Some(remaining) = ctx.remaining() {
            if remaining.is_zero() {
                return Err(Error::DeadlineExceeded);
            }
            builder = builder.header(GRPC_TIMEOUT, encode_timeout(remaining));
        }

        let mut request = builder
            .body(body)
            .map_err(|e| Error::protocol(Code::Internal, format!("invalid request for {path}: {e}")))?;

        let headers = request.headers_mut();
        for name in metadata.keys() {
            if headers.contains_key(name) || name.as_str().starts_with("grpc-") {
                debug!(header = %name, "ignoring reserved metadata");
                continue;
            }
            for value in metadata.get_all(name) {
                headers.append(name.clone(), value.clone());
            }
        }
        Ok(request)
    }
}

/// Configures a [`Channel`]
pub struct ChannelBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
    codec: Arc<dyn Codec>,
    compressor: Option<Arc<dyn Compressor>>,
    compressors: CompressorRegistry,
    user_agent: String,
    interceptors: Vec<Arc<dyn ClientInterceptor>>,
}

impl ChannelBuilder {
    fn new(config: ClientConfig) -> Self {
        Self {
            config,
            transport: None,
            codec: Arc::new(ProtoCodec),
            compressor: None,
            compressors: CompressorRegistry::with_defaults(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            interceptors: Vec::new(),
        }
    }

    /// Use `transport` instead of connecting to the endpoint over h2c
    pub fn transport(mut self, transport: impl Transport) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Encode requests with `codec` (protobuf by default)
    pub fn codec(mut self, codec: impl Codec) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    /// Compress every request message with `compressor`
    pub fn compressor(mut self, compressor: impl Compressor) -> Self {
        let compressor: Arc<dyn Compressor> = Arc::new(compressor);
        self.compressors.register_arc(compressor.clone());
        self.compressor = Some(compressor);
        self
    }

    /// Response encodings to accept (gzip and deflate by default)
    pub fn accept_compressors(mut self, compressors: CompressorRegistry) -> Self {
        self.compressors = compressors;
        if let Some(compressor) = &self.compressor {
            self.compressors.register_arc(compressor.clone());
        }
        self
    }

    pub fn max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.config.max_frame_size = max_frame_size;
        self
    }

    /// Buffer size between `send` and the request body on streaming calls
    pub fn pipe_capacity(mut self, pipe_capacity: usize) -> Self {
        self.config.pipe_capacity = pipe_capacity;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Add a hook run when each call is opened, after those already added
    pub fn interceptor(mut self, interceptor: impl ClientInterceptor) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    pub fn build(self) -> Result<Channel, Error> {
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(&self.config)?),
        };

        let header = |name: &str, value: String| {
            HeaderValue::try_from(value)
                .map_err(|e| Error::protocol(Code::Internal, format!("invalid {name}: {e}")))
        };
        let content_type = header("codec name", content_type_for(self.codec.name()))?;
        let accept_encoding = header(
            "compressor name",
            self.compressors.accept_encoding_header(),
        )?;
        let user_agent = header("user agent", self.user_agent)?;

        Ok(Channel {
            inner: Arc::new(ChannelInner {
                endpoint: self.config.endpoint.trim_end_matches('/').to_string(),
                transport,
                codec: self.codec,
                compressor: self.compressor,
                compressors: self.compressors,
                max_frame_size: self.config.max_frame_size,
                pipe_capacity: self.config.pipe_capacity.max(1),
                content_type,
                accept_encoding,
                user_agent,
                interceptors: self.interceptors,
            }),
        })
    }
}

/// Handle for making calls to one server
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

impl Channel {
    /// Channel for `endpoint` (`http://host:port`) with default settings
    pub fn builder(endpoint: impl Into<String>) -> ChannelBuilder {
        ChannelBuilder::new(ClientConfig {
            endpoint: endpoint.into(),
            ..Default::default()
        })
    }

    pub fn from_config(config: ClientConfig) -> ChannelBuilder {
        ChannelBuilder::new(config)
    }

    /// h2c channel for `config.endpoint`. The connection is made lazily on
    /// the first call.
    pub fn connect(config: ClientConfig) -> Result<Self, Error> {
        Self::from_config(config).build()
    }

    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    /// Open a call on `path` (`/<service>/<method>`). Streaming-request shapes
    /// start their round trip immediately.
    pub fn new_stream<Req, Resp>(
        &self,
        ctx: CallContext,
        path: &str,
        shape: StreamShape,
    ) -> Result<ClientStream<Req, Resp>, Error>
    where
        Req: Message,
        Resp: Message + Default,
    {
        debug!(%path, ?shape, "opening stream");
        let mut outgoing = OutgoingCall {
            ctx: &ctx,
            path,
            shape,
            metadata: HeaderMap::new(),
        };
        for interceptor in &self.inner.interceptors {
            interceptor.intercept(&mut outgoing)?;
        }
        let metadata = outgoing.metadata;

        let call = if shape.client_streaming() {
            Call::Duplex(DuplexCall::open(
                self.inner.clone(),
                ctx,
                path,
                metadata,
                shape.server_streaming(),
            )?)
        } else {
            Call::Unary(UnaryCall::new(
                self.inner.clone(),
                ctx,
                path.to_string(),
                metadata,
                shape.server_streaming(),
            ))
        };
        Ok(ClientStream {
            call,
            shape,
            _marker: PhantomData,
        })
    }

    /// One request, one response
    #[instrument(skip(self, ctx, request))]
    pub async fn unary<Req, Resp>(
        &self,
        ctx: CallContext,
        path: &str,
        request: &Req,
    ) -> Result<Resp, Error>
    where
        Req: Message,
        Resp: Message + Default,
    {
        let mut stream = self.new_stream::<Req, Resp>(ctx, path, StreamShape::UnaryUnary)?;
        stream.send(request).await?;
        stream.close_and_recv().await
    }

    /// One request, then read responses from the returned stream
    pub async fn server_streaming<Req, Resp>(
        &self,
        ctx: CallContext,
        path: &str,
        request: &Req,
    ) -> Result<ClientStream<Req, Resp>, Error>
    where
        Req: Message,
        Resp: Message + Default,
    {
        let mut stream = self.new_stream(ctx, path, StreamShape::UnaryStream)?;
        stream.send(request).await?;
        stream.close_send().await?;
        Ok(stream)
    }

    /// Send requests, then [`ClientStream::close_and_recv`] for the response
    pub fn client_streaming<Req, Resp>(
        &self,
        ctx: CallContext,
        path: &str,
    ) -> Result<ClientStream<Req, Resp>, Error>
    where
        Req: Message,
        Resp: Message + Default,
    {
        self.new_stream(ctx, path, StreamShape::StreamUnary)
    }

    /// Both directions stream independently
    pub fn streaming<Req, Resp>(
        &self,
        ctx: CallContext,
        path: &str,
    ) -> Result<ClientStream<Req, Resp>, Error>
    where
        Req: Message,
        Resp: Message + Default,
    {
        self.new_stream(ctx, path, StreamShape::StreamStream)
    }
}

enum Call {
    Unary(UnaryCall),
    Duplex(DuplexCall),
}

/// Client side of one call
pub struct ClientStream<Req, Resp> {
    call: Call,
    shape: StreamShape,
    _marker: PhantomData<fn(Req) -> Resp>,
}

impl<Req, Resp> ClientStream<Req, Resp>
where
    Req: Message,
    Resp: Message + Default,
{
    pub fn context(&self) -> &CallContext {
        match &self.call {
            Call::Unary(call) => call.context(),
            Call::Duplex(call) => call.context(),
        }
    }

    pub fn shape(&self) -> StreamShape {
        self.shape
    }

    /// Send one request message. Single-request shapes accept exactly one.
    pub async fn send(&mut self, message: &Req) -> Result<(), Error> {
        match &mut self.call {
            Call::Unary(call) => call.send(message).await,
            Call::Duplex(call) => call.send(message).await,
        }
    }

    /// Finish the request stream. A no-op for single-request shapes.
    pub async fn close_send(&mut self) -> Result<(), Error> {
        match &mut self.call {
            Call::Unary(_) => Ok(()),
            Call::Duplex(call) => call.close_send().await,
        }
    }

    /// Next response message, or `None` once the call finished with status OK
    pub async fn recv(&mut self) -> Result<Option<Resp>, Error> {
        let mut message = Resp::default();
        let received = match &mut self.call {
            Call::Unary(call) => call.recv(&mut message).await?,
            Call::Duplex(call) => call.recv(&mut message).await?,
        };
        Ok(received.then_some(message))
    }

    /// Close the request side and wait for the single response
    pub async fn close_and_recv(&mut self) -> Result<Resp, Error> {
        self.close_send().await?;
        self.recv().await?.ok_or_else(|| {
            Error::protocol(Code::Internal, "call finished without a response message")
        })
    }
}
