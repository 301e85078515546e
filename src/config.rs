//! Configuration loading and validation.

use std::net::{AddrParseError, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ConfigError, Result, ValidationError};
use crate::lists::ListKind;

/// Port used when the upstream resolver is given without one.
pub const DEFAULT_UPSTREAM_PORT: u16 = 53;

/// Main configuration for the sinkhole.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Address the query port binds to.
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Upstream resolver: an IPv4 address, optionally with a port.
    #[serde(
        default = "default_upstream_resolver",
        deserialize_with = "deserialize_upstream"
    )]
    pub upstream_resolver: SocketAddr,

    /// How long to wait for an upstream reply.
    #[serde(default = "default_upstream_timeout_ms")]
    pub upstream_timeout_ms: u64,

    /// One query at a time, or many in flight.
    #[serde(default)]
    pub relay_mode: RelayMode,

    /// Interface whose address is reported to the dashboard. Auto-detected if unset.
    pub interface: Option<String>,

    /// Refresh period of the status line pair.
    #[serde(default = "default_status_interval_ms")]
    pub status_interval_ms: u64,

    #[serde(default)]
    pub lists: ListsConfig,

    #[serde(default)]
    pub stats: StatsConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// How allowed queries are relayed upstream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayMode {
    /// Process one packet at a time; the relay wait blocks the loop.
    #[default]
    Serial,
    /// Track outstanding upstream queries and keep reading meanwhile.
    Concurrent,
}

/// List sources. Inline entries are merged with file contents.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListsConfig {
    pub blocklist_path: Option<PathBuf>,
    pub whitelist_path: Option<PathBuf>,
    pub keywords_path: Option<PathBuf>,

    #[serde(default)]
    pub blocklist: Vec<String>,
    #[serde(default)]
    pub whitelist: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,

    /// Re-read the list files on this period.
    pub reload_interval_secs: Option<u64>,
}

impl ListsConfig {
    pub fn path(&self, kind: ListKind) -> Option<&Path> {
        match kind {
            ListKind::Blocklist => self.blocklist_path.as_deref(),
            ListKind::Whitelist => self.whitelist_path.as_deref(),
            ListKind::Keywords => self.keywords_path.as_deref(),
        }
    }

    pub fn inline(&self, kind: ListKind) -> &[String] {
        match kind {
            ListKind::Blocklist => &self.blocklist,
            ListKind::Whitelist => &self.whitelist,
            ListKind::Keywords => &self.keywords,
        }
    }

    pub fn reload_interval(&self) -> Option<Duration> {
        self.reload_interval_secs.map(Duration::from_secs)
    }
}

/// Sizes of the bounded statistics structures.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatsConfig {
    /// Slots in the per-client table.
    #[serde(default = "default_client_capacity")]
    pub client_capacity: usize,

    /// Block timestamps kept for the trailing-window count.
    #[serde(default = "default_window_capacity")]
    pub window_capacity: usize,

    /// Width of the trailing window.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

impl StatsConfig {
    pub const fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            client_capacity: default_client_capacity(),
            window_capacity: default_window_capacity(),
            window_secs: default_window_secs(),
        }
    }
}

/// Prometheus exporter settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_metrics_listen")]
    pub listen: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: default_metrics_listen(),
        }
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 53))
}

fn default_upstream_resolver() -> SocketAddr {
    SocketAddr::from(([8, 8, 8, 8], DEFAULT_UPSTREAM_PORT))
}

const fn default_upstream_timeout_ms() -> u64 {
    2000
}

const fn default_status_interval_ms() -> u64 {
    500
}

const fn default_client_capacity() -> usize {
    8
}

const fn default_window_capacity() -> usize {
    512
}

const fn default_window_secs() -> u64 {
    60
}

fn default_metrics_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9090))
}

/// Parse `"1.1.1.1"` or `"1.1.1.1:5353"` into an upstream address.
pub fn parse_upstream(s: &str) -> std::result::Result<SocketAddr, AddrParseError> {
    let s = s.trim();
    match s.parse::<SocketAddrV4>() {
        Ok(addr) => Ok(SocketAddr::V4(addr)),
        Err(_) => s
            .parse::<Ipv4Addr>()
            .map(|ip| SocketAddr::V4(SocketAddrV4::new(ip, DEFAULT_UPSTREAM_PORT))),
    }
}

fn deserialize_upstream<'de, D>(deserializer: D) -> std::result::Result<SocketAddr, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_upstream(&s).map_err(serde::de::Error::custom)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            upstream_resolver: default_upstream_resolver(),
            upstream_timeout_ms: default_upstream_timeout_ms(),
            relay_mode: RelayMode::default(),
            interface: None,
            status_interval_ms: default_status_interval_ms(),
            lists: ListsConfig::default(),
            stats: StatsConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate().map_err(ConfigError::Validation)?;
        Ok(config)
    }

    pub const fn upstream_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream_timeout_ms)
    }

    pub const fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        if self.upstream_timeout_ms == 0 {
            return Err(ValidationError::ZeroUpstreamTimeout);
        }
        if self.status_interval_ms == 0 {
            return Err(ValidationError::ZeroStatusInterval);
        }
        if self.stats.client_capacity == 0 {
            return Err(ValidationError::ZeroClientCapacity);
        }
        if self.stats.window_capacity == 0 {
            return Err(ValidationError::ZeroWindowCapacity);
        }
        if self.stats.window_secs == 0 {
            return Err(ValidationError::ZeroWindowSecs);
        }
        if self.lists.reload_interval_secs == Some(0) {
            return Err(ValidationError::ZeroReloadInterval);
        }

        for kind in ListKind::ALL {
            if self.lists.inline(kind).iter().any(|e| e.trim().is_empty()) {
                return Err(ValidationError::EmptyListEntry {
                    list: kind.as_str(),
                });
            }
        }

        Ok(())
    }
}
