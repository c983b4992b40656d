// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::net::SocketAddr;
use std::str::FromStr;

use h2grpc_protocol::DEFAULT_MAX_FRAME_SIZE;

/// Default size of the in-process pipe behind streaming requests (64 KB)
pub const DEFAULT_PIPE_CAPACITY: usize = 64 * 1024;

/// Client channel configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URI of the server (`http://host:port`)
    pub endpoint: String,
    /// Connection timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// HTTP/2 keep-alive ping interval in milliseconds (0 to disable)
    pub keep_alive_interval_ms: u64,
    /// Largest inbound message accepted
    pub max_frame_size: usize,
    /// Buffer between `send` and the request body on streaming calls
    pub pipe_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:50051".to_string(),
            connect_timeout_ms: 10_000,
            keep_alive_interval_ms: 0,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            pipe_capacity: DEFAULT_PIPE_CAPACITY,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables.
    ///
    /// Optional (with defaults):
    /// - `H2GRPC_ENDPOINT`: server base URI (default: http://127.0.0.1:50051)
    /// - `H2GRPC_CONNECT_TIMEOUT_MS`: connect timeout (default: 10000)
    /// - `H2GRPC_KEEP_ALIVE_MS`: keep-alive interval, 0 to disable (default: 0)
    /// - `H2GRPC_MAX_FRAME_SIZE`: inbound message ceiling in bytes (default: 4194304)
    pub fn from_env() -> Result<Self, ConfigError> {
        let default = Self::default();

        let endpoint = std::env::var("H2GRPC_ENDPOINT").unwrap_or(default.endpoint);
        if !endpoint.starts_with("http://") {
            return Err(ConfigError::Invalid(
                "H2GRPC_ENDPOINT",
                "must be an http:// URI",
            ));
        }

        Ok(Self {
            endpoint,
            connect_timeout_ms: parse_var(
                "H2GRPC_CONNECT_TIMEOUT_MS",
                default.connect_timeout_ms,
                "must be a number of milliseconds",
            )?,
            keep_alive_interval_ms: parse_var(
                "H2GRPC_KEEP_ALIVE_MS",
                default.keep_alive_interval_ms,
                "must be a number of milliseconds",
            )?,
            max_frame_size: parse_var(
                "H2GRPC_MAX_FRAME_SIZE",
                default.max_frame_size,
                "must be a size in bytes",
            )?,
            pipe_capacity: default.pipe_capacity,
        })
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,
    /// Largest inbound message accepted
    pub max_frame_size: usize,
    /// Maximum concurrent HTTP/2 streams per connection (0 for the transport default)
    pub max_concurrent_streams: u32,
    /// Maximum concurrent connections (0 for unlimited)
    pub max_concurrent_connections: u32,
    /// HTTP/2 keep-alive ping interval in milliseconds (0 to disable)
    pub keep_alive_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 50051)),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            max_concurrent_streams: 0,
            max_concurrent_connections: 0,
            keep_alive_interval_ms: 0,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Optional (with defaults):
    /// - `H2GRPC_BIND_ADDR`: listen address (default: 0.0.0.0:50051)
    /// - `H2GRPC_MAX_FRAME_SIZE`: inbound message ceiling in bytes (default: 4194304)
    /// - `H2GRPC_MAX_CONCURRENT_STREAMS`: streams per connection, 0 for default (default: 0)
    /// - `H2GRPC_MAX_CONNECTIONS`: concurrent connections, 0 for unlimited (default: 0)
    /// - `H2GRPC_KEEP_ALIVE_MS`: keep-alive interval, 0 to disable (default: 0)
    pub fn from_env() -> Result<Self, ConfigError> {
        let default = Self::default();

        Ok(Self {
            bind_addr: parse_var(
                "H2GRPC_BIND_ADDR",
                default.bind_addr,
                "must be a socket address (host:port)",
            )?,
            max_frame_size: parse_var(
                "H2GRPC_MAX_FRAME_SIZE",
                default.max_frame_size,
                "must be a size in bytes",
            )?,
            max_concurrent_streams: parse_var(
                "H2GRPC_MAX_CONCURRENT_STREAMS",
                default.max_concurrent_streams,
                "must be a non-negative integer",
            )?,
            max_concurrent_connections: parse_var(
                "H2GRPC_MAX_CONNECTIONS",
                default.max_concurrent_connections,
                "must be a non-negative integer",
            )?,
            keep_alive_interval_ms: parse_var(
                "H2GRPC_KEEP_ALIVE_MS",
                default.keep_alive_interval_ms,
                "must be a number of milliseconds",
            )?,
        })
    }
}

fn parse_var<T: FromStr>(
    name: &'static str,
    default: T,
    reason: &'static str,
) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(name, reason)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that modify environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new() -> Self {
            Self { vars: Vec::new() }
        }

        fn set(&mut self, key: &str, value: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::set_var(key, value) };
        }

        fn remove(&mut self, key: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::remove_var(key) };
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.vars.drain(..).rev() {
                // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
                unsafe {
                    match value {
                        Some(v) => env::set_var(&key, v),
                        None => env::remove_var(&key),
                    }
                }
            }
        }
    }

    const ALL_VARS: [&str; 6] = [
        "H2GRPC_ENDPOINT",
        "H2GRPC_CONNECT_TIMEOUT_MS",
        "H2GRPC_KEEP_ALIVE_MS",
        "H2GRPC_MAX_FRAME_SIZE",
        "H2GRPC_MAX_CONCURRENT_STREAMS",
        "H2GRPC_MAX_CONNECTIONS",
    ];

    fn clean_env() -> EnvGuard {
        let mut guard = EnvGuard::new();
        for var in ALL_VARS {
            guard.remove(var);
        }
        guard.remove("H2GRPC_BIND_ADDR");
        guard
    }

    #[test]
    fn test_client_config_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let _guard = clean_env();

        let config = ClientConfig::from_env().unwrap();
        assert_eq!(config.endpoint, "http://127.0.0.1:50051");
        assert_eq!(config.connect_timeout_ms, 10_000);
        assert_eq!(config.keep_alive_interval_ms, 0);
        assert_eq!(config.max_frame_size, 4 * 1024 * 1024);
        assert_eq!(config.pipe_capacity, DEFAULT_PIPE_CAPACITY);
    }

    #[test]
    fn test_client_config_custom() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = clean_env();
        guard.set("H2GRPC_ENDPOINT", "http://routeguide:10000");
        guard.set("H2GRPC_CONNECT_TIMEOUT_MS", "2500");
        guard.set("H2GRPC_MAX_FRAME_SIZE", "1024");

        let config = ClientConfig::from_env().unwrap();
        assert_eq!(config.endpoint, "http://routeguide:10000");
        assert_eq!(config.connect_timeout_ms, 2_500);
        assert_eq!(config.max_frame_size, 1024);
    }

    #[test]
    fn test_client_config_rejects_bad_endpoint() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = clean_env();
        guard.set("H2GRPC_ENDPOINT", "localhost:50051");

        let err = ClientConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid("H2GRPC_ENDPOINT", _)));
    }

    #[test]
    fn test_server_config_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let _guard = clean_env();

        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.bind_addr.port(), 50051);
        assert_eq!(config.max_concurrent_streams, 0);
        assert_eq!(config.max_concurrent_connections, 0);
    }

    #[test]
    fn test_server_config_custom() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = clean_env();
        guard.set("H2GRPC_BIND_ADDR", "127.0.0.1:9000");
        guard.set("H2GRPC_MAX_CONCURRENT_STREAMS", "128");
        guard.set("H2GRPC_MAX_CONNECTIONS", "16");
        guard.set("H2GRPC_KEEP_ALIVE_MS", "30000");

        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.max_concurrent_streams, 128);
        assert_eq!(config.max_concurrent_connections, 16);
        assert_eq!(config.keep_alive_interval_ms, 30_000);
    }

    #[test]
    fn test_server_config_invalid_number() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = clean_env();
        guard.set("H2GRPC_MAX_CONNECTIONS", "lots");

        let err = ServerConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid("H2GRPC_MAX_CONNECTIONS", _)));
        assert!(err.to_string().contains("H2GRPC_MAX_CONNECTIONS"));
    }
}
