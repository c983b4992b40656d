// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Transports: one request in, one response out.
//!
//! The client engine only needs a single blocking round trip per call. Request
//! and response bodies are streamed, so the streaming shapes are built on top
//! of this one primitive.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use http::{Request, Response, Uri};
use hyper::client::conn::http2::{self, SendRequest};
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::body::{self, BoxBody};
use crate::config::ClientConfig;
use crate::error::Error;
use crate::server::Dispatcher;

/// Performs one HTTP round trip. The returned future resolves as soon as the
/// response headers are available; the response body streams afterwards.
pub trait Transport: Send + Sync + 'static {
    fn round_trip(
        &self,
        request: Request<BoxBody>,
    ) -> BoxFuture<'static, Result<Response<BoxBody>, Error>>;
}

/// HTTP/2 over cleartext TCP (h2c, prior knowledge)
#[derive(Clone)]
pub struct HttpTransport {
    inner: Arc<HttpInner>,
}

struct HttpInner {
    authority: String,
    connect_timeout: Duration,
    keep_alive: Option<Duration>,
    sender: Mutex<Option<SendRequest<BoxBody>>>,
}

impl HttpTransport {
    /// Create a transport for `config.endpoint`. No connection is made until
    /// the first request.
    pub fn new(config: &ClientConfig) -> Result<Self, Error> {
        let uri: Uri = config
            .endpoint
            .parse()
            .map_err(|e| Error::transport(format!("invalid endpoint {}: {e}", config.endpoint)))?;

        if uri.scheme_str() != Some("http") {
            return Err(Error::transport(format!(
                "unsupported endpoint scheme in {}: only http:// (h2c) is supported",
                config.endpoint
            )));
        }
        let host = uri
            .host()
            .ok_or_else(|| Error::transport(format!("endpoint has no host: {}", config.endpoint)))?;
        let authority = format!("{}:{}", host, uri.port_u16().unwrap_or(80));

        Ok(Self {
            inner: Arc::new(HttpInner {
                authority,
                connect_timeout: Duration::from_millis(config.connect_timeout_ms),
                keep_alive: (config.keep_alive_interval_ms > 0)
                    .then(|| Duration::from_millis(config.keep_alive_interval_ms)),
                sender: Mutex::new(None),
            }),
        })
    }

    /// `host:port` this transport connects to
    pub fn authority(&self) -> &str {
        &self.inner.authority
    }

    /// Connect to the server, reusing the current connection while it is open
    #[instrument(skip(self), fields(authority = %self.inner.authority))]
    pub async fn connect(&self) -> Result<(), Error> {
        self.sender().await.map(|_| ())
    }

    async fn sender(&self) -> Result<SendRequest<BoxBody>, Error> {
        let mut guard = self.inner.sender.lock().await;

        if let Some(sender) = guard.as_ref()
            && !sender.is_closed()
        {
            debug!("reusing existing connection");
            return Ok(sender.clone());
        }

        info!(authority = %self.inner.authority, "connecting");

        let timeout = self.inner.connect_timeout;
        let (sender, connection) = tokio::time::timeout(timeout, self.handshake())
            .await
            .map_err(|_| {
                Error::transport(format!(
                    "connection timed out after {}ms",
                    timeout.as_millis()
                ))
            })??;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!(error = %e, "connection closed with error");
            }
        });

        info!(authority = %self.inner.authority, "connected");
        *guard = Some(sender.clone());
        Ok(sender)
    }

    async fn handshake(
        &self,
    ) -> Result<
        (
            SendRequest<BoxBody>,
            http2::Connection<TokioIo<TcpStream>, BoxBody, TokioExecutor>,
        ),
        Error,
    > {
        let stream = TcpStream::connect(self.inner.authority.as_str())
            .await
            .map_err(Error::transport)?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "failed to set TCP_NODELAY");
        }

        let mut builder = http2::Builder::new(TokioExecutor::new());
        builder.timer(TokioTimer::new());
        if let Some(interval) = self.inner.keep_alive {
            builder.keep_alive_interval(interval);
        }
        builder
            .handshake(TokioIo::new(stream))
            .await
            .map_err(Error::transport)
    }

    /// Check if the transport currently holds an open connection
    pub async fn is_connected(&self) -> bool {
        let guard = self.inner.sender.lock().await;
        guard.as_ref().is_some_and(|sender| !sender.is_closed())
    }

    /// Drop the current connection; the next request reconnects
    pub async fn close(&self) {
        let mut guard = self.inner.sender.lock().await;
        if guard.take().is_some() {
            debug!("connection released");
        }
    }
}

impl Transport for HttpTransport {
    fn round_trip(
        &self,
        request: Request<BoxBody>,
    ) -> BoxFuture<'static, Result<Response<BoxBody>, Error>> {
        let transport = self.clone();
        Box::pin(async move {
            let mut sender = transport.sender().await?;
            sender.ready().await.map_err(Error::transport)?;
            let response = sender
                .send_request(request)
                .await
                .map_err(Error::transport)?;
            Ok(response.map(body::boxed))
        })
    }
}

/// Calls a [`Dispatcher`] directly, without a network connection
#[derive(Clone)]
pub struct LocalTransport {
    dispatcher: Arc<Dispatcher>,
}

impl LocalTransport {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }
}

impl Transport for LocalTransport {
    fn round_trip(
        &self,
        request: Request<BoxBody>,
    ) -> BoxFuture<'static, Result<Response<BoxBody>, Error>> {
        let dispatcher = self.dispatcher.clone();
        Box::pin(async move { Ok(dispatcher.handle(request)) })
    }
}
