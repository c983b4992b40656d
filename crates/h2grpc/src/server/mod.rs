// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! gRPC server: service registration, dispatch and the h2c accept loop.

mod dispatcher;
pub mod handler;
mod interceptor;
mod registry;
mod stream;

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use h2grpc_protocol::{Codec, CodecRegistry, Compressor, CompressorRegistry};
use http::Request;
use hyper::body::Incoming;
use hyper::server::conn::http2;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::body;
use crate::config::ServerConfig;
use crate::method::MethodInfo;
use crate::transport::LocalTransport;

pub use dispatcher::Dispatcher;
pub use handler::{BoxHandler, Handler, MethodHandler};
pub use interceptor::Interceptor;
pub use registry::ServiceDesc;
pub use stream::{RequestStream, ResponseSink, ServerStream};

use registry::Registry;

/// Errors from running the server
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("bind error: {0}")]
    Bind(#[from] std::io::Error),
}

/// Collects services, codecs, compressors and interceptors
pub struct ServerBuilder {
    config: ServerConfig,
    registry: Registry,
    codecs: CodecRegistry,
    compressors: CompressorRegistry,
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self {
            config: ServerConfig::default(),
            registry: Registry::default(),
            codecs: CodecRegistry::new(),
            compressors: CompressorRegistry::with_defaults(),
            interceptors: Vec::new(),
        }
    }
}

impl ServerBuilder {
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Accept requests encoded with `codec` in addition to protobuf
    pub fn codec(mut self, codec: impl Codec) -> Self {
        self.codecs.register(codec);
        self
    }

    pub fn compressor(mut self, compressor: impl Compressor) -> Self {
        self.compressors.register(compressor);
        self
    }

    /// Replace the set of accepted request encodings
    pub fn compressors(mut self, compressors: CompressorRegistry) -> Self {
        self.compressors = compressors;
        self
    }

    /// Register a service.
    ///
    /// # Panics
    ///
    /// Panics if the service or one of its method paths is already registered.
    pub fn service(mut self, service: ServiceDesc) -> Self {
        self.registry.register(service);
        self
    }

    /// Add an interceptor. Interceptors run in the order they were added,
    /// the first one outermost.
    pub fn interceptor(mut self, interceptor: impl Interceptor) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    pub fn build(mut self) -> Server {
        self.registry.intercept(&self.interceptors);
        let dispatcher = Dispatcher::new(
            self.registry,
            self.codecs,
            self.compressors,
            self.config.max_frame_size,
        );
        Server {
            dispatcher: Arc::new(dispatcher),
            config: self.config,
        }
    }
}

/// A configured gRPC server
pub struct Server {
    dispatcher: Arc<Dispatcher>,
    config: ServerConfig,
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::default()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Registered methods grouped by service name
    pub fn service_info(&self) -> BTreeMap<String, Vec<MethodInfo>> {
        self.dispatcher.registry().service_info().clone()
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        self.dispatcher.clone()
    }

    /// Transport that calls this server in-process
    pub fn local_transport(&self) -> LocalTransport {
        LocalTransport::new(self.dispatcher.clone())
    }

    /// Bind `config.bind_addr` and serve until the process exits
    #[instrument(skip(self), fields(addr = %self.config.bind_addr))]
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener).await
    }

    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        self.serve_with_shutdown(listener, CancellationToken::new())
            .await
    }

    /// Accept h2c connections on `listener` until `shutdown` is cancelled.
    /// Open connections are then drained gracefully.
    pub async fn serve_with_shutdown(
        &self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> Result<(), ServerError> {
        let local_addr = listener.local_addr()?;
        info!(%local_addr, "gRPC server listening");

        // Create semaphore for backpressure if configured
        let semaphore = if self.config.max_concurrent_connections > 0 {
            Some(Arc::new(Semaphore::new(
                self.config.max_concurrent_connections as usize,
            )))
        } else {
            None
        };

        let mut builder = http2::Builder::new(TokioExecutor::new());
        builder.timer(TokioTimer::new());
        if self.config.max_concurrent_streams > 0 {
            builder.max_concurrent_streams(self.config.max_concurrent_streams);
        }
        if self.config.keep_alive_interval_ms > 0 {
            builder.keep_alive_interval(Duration::from_millis(self.config.keep_alive_interval_ms));
        }

        loop {
            let (stream, remote_addr) = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!("failed to accept connection: {}", e);
                        continue;
                    }
                },
            };

            let dispatcher = self.dispatcher.clone();
            let builder = builder.clone();
            let semaphore = semaphore.clone();
            let shutdown = shutdown.clone();

            tokio::spawn(async move {
                // Acquire permit if semaphore is configured
                let _permit = if let Some(ref sem) = semaphore {
                    match sem.clone().acquire_owned().await {
                        Ok(permit) => Some(permit),
                        Err(_) => {
                            warn!("semaphore closed, dropping connection");
                            return;
                        }
                    }
                } else {
                    None
                };

                debug!(%remote_addr, "accepted connection");
                if let Err(e) = stream.set_nodelay(true) {
                    debug!(error = %e, "failed to set TCP_NODELAY");
                }

                let service = service_fn(move |request: Request<Incoming>| {
                    let dispatcher = dispatcher.clone();
                    async move { Ok::<_, Infallible>(dispatcher.handle(request.map(body::boxed))) }
                });
                let connection = builder.serve_connection(TokioIo::new(stream), service);
                tokio::pin!(connection);

                tokio::select! {
                    result = connection.as_mut() => {
                        if let Err(e) = result {
                            debug!(%remote_addr, error = %e, "connection closed with error");
                        }
                    }
                    _ = shutdown.cancelled() => {
                        connection.as_mut().graceful_shutdown();
                        if let Err(e) = connection.await {
                            debug!(%remote_addr, error = %e, "error while draining connection");
                        }
                    }
                }
                debug!(%remote_addr, "connection closed");
            });
        }

        info!(%local_addr, "gRPC server stopped accepting connections");
        Ok(())
    }
}
