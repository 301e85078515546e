//! Short status/info line pair for small displays.
//!
//! A background task refreshes the device address and republishes the line
//! on a `watch` channel at a fixed interval.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::dns::Relay;
use crate::server::{Dispatcher, Telemetry};

/// Two display lines: where the proxy is, and what it is doing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusLine {
    pub status: String,
    pub info: String,
}

impl StatusLine {
    pub fn from_telemetry(telemetry: &Telemetry) -> Self {
        let status = match telemetry.device_address {
            Some(address) => format!("DNS {address}"),
            None => "DNS no address".to_string(),
        };
        let stats = &telemetry.stats;
        let info = format!(
            "{} blocked/{}s, {} queries",
            stats.window_blocked, stats.window_secs, stats.total_queries
        );
        Self { status, info }
    }
}

/// Publish a fresh [`StatusLine`] every `interval`.
///
/// `lookup` refreshes the device address on each tick, starting with the
/// first one. It may block (interface enumeration goes through the OS), so
/// it runs on the blocking pool. The task ends once every receiver is dropped.
pub fn spawn_status_task<R, F>(
    dispatcher: Dispatcher<R>,
    lookup: F,
    interval: Duration,
) -> (watch::Receiver<StatusLine>, JoinHandle<()>)
where
    R: Relay,
    F: Fn() -> Option<IpAddr> + Send + Sync + 'static,
{
    let lookup = Arc::new(lookup);
    let (tx, rx) = watch::channel(StatusLine::from_telemetry(&dispatcher.telemetry()));

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if tx.is_closed() {
                break;
            }

            let lookup = Arc::clone(&lookup);
            match tokio::task::spawn_blocking(move || lookup()).await {
                Ok(address) if address != dispatcher.device_address() => {
                    tracing::info!(?address, "device address changed");
                    dispatcher.set_device_address(address);
                }
                Ok(_) => {}
                Err(err) => tracing::warn!(error = %err, "device address lookup failed"),
            }

            let line = StatusLine::from_telemetry(&dispatcher.telemetry());
            tx.send_if_modified(|current| {
                if *current == line {
                    return false;
                }
                *current = line;
                true
            });
        }
    });

    (rx, handle)
}
