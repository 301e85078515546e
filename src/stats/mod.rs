//! Query statistics: lifetime counters, trailing-window block rate and a
//! bounded per-client table.
//!
//! All mutation goes through [`StatsAggregator`]. Readers get a
//! [`StatsSnapshot`], a copy taken at one point in time.

mod clients;
mod window;

use std::net::IpAddr;
use std::time::{Duration, Instant};

use serde::Serialize;

pub use clients::{ClientRecord, ClientTable};
pub use window::RollingWindow;

use crate::config::StatsConfig;

/// Owner of every statistics structure.
#[derive(Debug, Clone)]
pub struct StatsAggregator {
    total_queries: u64,
    total_blocked: u64,
    total_forwarded: u64,
    relay_failures: u64,
    dropped: u64,
    passthrough: u64,
    last_blocked: Option<String>,
    window: RollingWindow,
    window_width: Duration,
    clients: ClientTable,
}

impl StatsAggregator {
    /// # Panics
    ///
    /// Panics if either capacity in `config` is zero; [`crate::Config::validate`]
    /// rejects such configs.
    pub fn new(config: &StatsConfig) -> Self {
        Self {
            total_queries: 0,
            total_blocked: 0,
            total_forwarded: 0,
            relay_failures: 0,
            dropped: 0,
            passthrough: 0,
            last_blocked: None,
            window: RollingWindow::new(config.window_capacity),
            window_width: config.window(),
            clients: ClientTable::new(config.client_capacity),
        }
    }

    /// Count a classified query from `ip`, and the block when `blocked`
    /// carries the sinkholed name.
    ///
    /// The client slot is looked up once, so a full table evicts at most one
    /// record and the block lands on the same record as the query.
    pub fn register_classified(&mut self, ip: IpAddr, blocked: Option<&str>) {
        self.register_classified_at(ip, blocked, Instant::now());
    }

    pub fn register_classified_at(&mut self, ip: IpAddr, blocked: Option<&str>, now: Instant) {
        self.total_queries += 1;
        let record = self.clients.entry(ip);
        record.total += 1;
        if let Some(name) = blocked {
            record.blocked += 1;
            self.total_blocked += 1;
            self.window.record(now);
            self.last_blocked = Some(name.to_string());
        }
    }

    /// Count a classified query from `ip`.
    pub fn register_query(&mut self, ip: IpAddr) {
        self.total_queries += 1;
        self.clients.entry(ip).total += 1;
    }

    pub fn register_block(&mut self, ip: IpAddr, name: &str) {
        self.register_block_at(ip, name, Instant::now());
    }

    /// Count a blocked query, stamping the rolling window with `now`.
    pub fn register_block_at(&mut self, ip: IpAddr, name: &str, now: Instant) {
        self.total_blocked += 1;
        self.clients.entry(ip).blocked += 1;
        self.window.record(now);
        self.last_blocked = Some(name.to_string());
    }

    /// A relayed query got its reply.
    pub fn register_forward(&mut self) {
        self.total_forwarded += 1;
    }

    /// A relayed query timed out or failed to send.
    pub fn register_relay_failure(&mut self) {
        self.relay_failures += 1;
    }

    /// A malformed or oversize packet was discarded.
    pub fn register_drop(&mut self) {
        self.dropped += 1;
    }

    /// A non-query packet was relayed without classification.
    pub fn register_passthrough(&mut self) {
        self.passthrough += 1;
    }

    /// Blocks recorded less than `window` before `now`.
    pub fn windowed_block_count(&self, now: Instant, window: Duration) -> usize {
        self.window.count_within(now, window)
    }

    /// Width used for [`StatsSnapshot::window_blocked`].
    pub const fn window_width(&self) -> Duration {
        self.window_width
    }

    pub fn client(&self, ip: IpAddr) -> Option<&ClientRecord> {
        self.clients.get(ip)
    }

    pub fn snapshot(&self, now: Instant) -> StatsSnapshot {
        StatsSnapshot {
            total_queries: self.total_queries,
            total_blocked: self.total_blocked,
            total_forwarded: self.total_forwarded,
            relay_failures: self.relay_failures,
            dropped: self.dropped,
            passthrough: self.passthrough,
            window_blocked: self.windowed_block_count(now, self.window_width),
            window_secs: self.window_width.as_secs(),
            last_blocked: self.last_blocked.clone(),
            clients: self.clients.records().copied().collect(),
        }
    }
}

impl Default for StatsAggregator {
    fn default() -> Self {
        Self::new(&StatsConfig::default())
    }
}

/// Point-in-time copy of the aggregate counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub total_queries: u64,
    pub total_blocked: u64,
    pub total_forwarded: u64,
    pub relay_failures: u64,
    pub dropped: u64,
    pub passthrough: u64,
    /// Blocks within the trailing `window_secs`.
    pub window_blocked: usize,
    pub window_secs: u64,
    pub last_blocked: Option<String>,
    pub clients: Vec<ClientRecord>,
}
