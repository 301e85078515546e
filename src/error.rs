//! Error types for the sinkhole DNS proxy.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Main error type for sinkhole operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("packet error: {0}")]
    Packet(#[from] PacketError),

    #[error("upstream {upstream} did not answer within {timeout_ms} ms")]
    UpstreamTimeout { upstream: SocketAddr, timeout_ms: u64 },

    #[error("query {id:#06x} from {client} is already in flight")]
    DuplicateQuery { id: u16, client: SocketAddr },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("metrics error: {0}")]
    Metrics(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadFile(#[source] io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),

    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
}

/// Validation errors for configuration values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("upstream_timeout_ms must be greater than 0")]
    ZeroUpstreamTimeout,

    #[error("status_interval_ms must be greater than 0")]
    ZeroStatusInterval,

    #[error("stats.client_capacity must be greater than 0")]
    ZeroClientCapacity,

    #[error("stats.window_capacity must be greater than 0")]
    ZeroWindowCapacity,

    #[error("stats.window_secs must be greater than 0")]
    ZeroWindowSecs,

    #[error("lists.reload_interval_secs must be greater than 0 when set")]
    ZeroReloadInterval,

    #[error("{list} entry cannot be empty")]
    EmptyListEntry { list: &'static str },
}

/// Reasons a packet is dropped without an answer.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PacketError {
    #[error("malformed packet: {0}")]
    Malformed(&'static str),

    #[error("oversize packet: {len} bytes")]
    Oversize { len: usize },
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;
