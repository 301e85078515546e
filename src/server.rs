//! Query dispatch and the UDP serve loop.
//!
//! [`Dispatcher`] owns one packet end-to-end: parse, classify, then either
//! rewrite it in place as NXDOMAIN or relay it upstream, updating stats on
//! the way. [`run_server`] feeds it from the listening socket.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::net::UdpSocket;
use tracing::{debug, info, instrument, warn};

use crate::config::{RelayMode, StatsConfig};
use crate::dns::codec::{DnsMessage, MAX_MESSAGE_SIZE, synthesize_nxdomain};
use crate::dns::{Classifier, Relay};
use crate::error::{Error, PacketError, Result};
use crate::lists::{ListSizes, ListStore};
use crate::metrics;
use crate::stats::{StatsAggregator, StatsSnapshot};

/// Why a packet got no answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    Packet(PacketError),
    /// Upstream timed out or the relay failed; the client is left to retry.
    RelayFailed,
    /// Same transaction ID from the same client is already in flight.
    Duplicate,
}

impl DropReason {
    const fn label(self) -> &'static str {
        match self {
            Self::Packet(PacketError::Malformed(_)) => "malformed",
            Self::Packet(PacketError::Oversize { .. }) => "oversize",
            Self::RelayFailed => "relay_failed",
            Self::Duplicate => "duplicate",
        }
    }
}

/// Result of handling one packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The packet buffer was rewritten as NXDOMAIN; reply with its first
    /// `len` bytes.
    Synthesized(usize),
    /// Upstream reply to send back.
    Relayed(Vec<u8>),
    Dropped(DropReason),
}

impl Outcome {
    /// Bytes to send back to the client, given the handled packet buffer.
    pub fn response<'a>(&'a self, packet: &'a [u8]) -> Option<&'a [u8]> {
        match self {
            Self::Synthesized(len) => packet.get(..*len),
            Self::Relayed(reply) => Some(reply),
            Self::Dropped(_) => None,
        }
    }
}

/// Read-only view served to dashboards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Telemetry {
    pub device_address: Option<IpAddr>,
    #[serde(flatten)]
    pub stats: StatsSnapshot,
    pub lists: ListSizes,
}

impl Telemetry {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Per-packet handler shared by the serve loop and its tasks.
///
/// Cloning is cheap; clones share lists, stats and the relay.
pub struct Dispatcher<R: Relay> {
    lists: ListStore,
    classifier: Arc<Classifier>,
    stats: Arc<Mutex<StatsAggregator>>,
    relay: R,
    device_address: Arc<RwLock<Option<IpAddr>>>,
}

impl<R: Relay> Dispatcher<R> {
    pub fn new(lists: ListStore, relay: R, stats: &StatsConfig) -> Self {
        Self::with_classifier(lists, relay, stats, Classifier::default())
    }

    pub fn with_classifier(
        lists: ListStore,
        relay: R,
        stats: &StatsConfig,
        classifier: Classifier,
    ) -> Self {
        Self {
            lists,
            classifier: Arc::new(classifier),
            stats: Arc::new(Mutex::new(StatsAggregator::new(stats))),
            relay,
            device_address: Arc::new(RwLock::new(None)),
        }
    }

    pub fn set_device_address(&self, address: Option<IpAddr>) {
        *self.device_address.write() = address;
    }

    pub fn device_address(&self) -> Option<IpAddr> {
        *self.device_address.read()
    }

    pub fn stats(&self, now: Instant) -> StatsSnapshot {
        self.stats.lock().snapshot(now)
    }

    pub fn telemetry(&self) -> Telemetry {
        Telemetry {
            device_address: self.device_address(),
            stats: self.stats(Instant::now()),
            lists: self.lists.sizes(),
        }
    }

    /// Handle one received packet.
    ///
    /// Blocked queries are rewritten in place, so the reply for
    /// [`Outcome::Synthesized`] is a prefix of `packet`.
    #[instrument(skip(self, packet), fields(len = packet.len(), domain))]
    pub async fn handle(&self, packet: &mut [u8], client: SocketAddr) -> Outcome {
        if packet.len() > MAX_MESSAGE_SIZE {
            return self.drop_packet(PacketError::Oversize { len: packet.len() });
        }
        let Some(message) = DnsMessage::parse(packet) else {
            return self.drop_packet(PacketError::Malformed("shorter than a header"));
        };

        let header = *message.header();
        if header.is_response() || header.qdcount == 0 {
            debug!(
                response = header.is_response(),
                qdcount = header.qdcount,
                "relaying non-query packet unclassified"
            );
            self.stats.lock().register_passthrough();
            return self.forward_upstream(packet, client).await;
        }

        if !message.name_complete() {
            return self.drop_packet(PacketError::Malformed("question name not terminated"));
        }

        let name = message.name().to_string();
        // With more than one question, cutting after the first would leave
        // QDCOUNT claiming questions the reply does not carry.
        let reply_len = match header.qdcount {
            1 => message.question_end(),
            _ => None,
        };
        tracing::Span::current().record("domain", name.as_str());

        let verdict = self.classifier.classify(&name, &self.lists.current());
        let blocked = verdict.is_blocked().then_some(name.as_str());
        self.stats.lock().register_classified(client.ip(), blocked);
        metrics::record_query();

        let list = match verdict.matched_list() {
            Some(list) if verdict.is_blocked() => list,
            _ => {
                debug!(whitelisted = ?verdict.matched_entry(), "allowed");
                return self.forward_upstream(packet, client).await;
            }
        };

        info!(%list, entry = ?verdict.matched_entry(), "blocked");
        metrics::record_block(list.as_str());

        synthesize_nxdomain(packet);
        Outcome::Synthesized(reply_len.unwrap_or(packet.len()))
    }

    async fn forward_upstream(&self, packet: &[u8], client: SocketAddr) -> Outcome {
        match self.relay.forward(packet, client).await {
            Ok(reply) => {
                self.stats.lock().register_forward();
                metrics::record_forward();
                Outcome::Relayed(reply)
            }
            Err(Error::DuplicateQuery { id, .. }) => {
                debug!(id, "dropping retransmission already in flight");
                self.record_drop(DropReason::Duplicate)
            }
            Err(err) => {
                warn!(error = %err, upstream = %self.relay.upstream(), "relay failed");
                self.stats.lock().register_relay_failure();
                metrics::record_relay_failure();
                Outcome::Dropped(DropReason::RelayFailed)
            }
        }
    }

    fn drop_packet(&self, err: PacketError) -> Outcome {
        debug!(error = %err, "dropping packet");
        self.record_drop(DropReason::Packet(err))
    }

    fn record_drop(&self, reason: DropReason) -> Outcome {
        self.stats.lock().register_drop();
        metrics::record_drop(reason.label());
        Outcome::Dropped(reason)
    }
}

impl<R: Relay> Clone for Dispatcher<R> {
    fn clone(&self) -> Self {
        Self {
            lists: self.lists.clone(),
            classifier: Arc::clone(&self.classifier),
            stats: Arc::clone(&self.stats),
            relay: self.relay.clone(),
            device_address: Arc::clone(&self.device_address),
        }
    }
}

/// Handle one packet and send whatever answer it produced.
async fn serve_packet<R: Relay>(
    socket: &UdpSocket,
    dispatcher: &Dispatcher<R>,
    packet: &mut [u8],
    client: SocketAddr,
) {
    let outcome = dispatcher.handle(packet, client).await;
    if let Some(response) = outcome.response(packet)
        && let Err(err) = socket.send_to(response, client).await
    {
        warn!(%client, error = %err, "failed to send response");
    }
}

/// Run the serve loop until `running` is cleared.
///
/// In [`RelayMode::Serial`] each packet is fully handled before the next is
/// read. In [`RelayMode::Concurrent`] each packet gets its own task. Packets
/// larger than [`MAX_MESSAGE_SIZE`] are read in full, then dropped.
pub async fn run_server<R: Relay>(
    socket: Arc<UdpSocket>,
    dispatcher: Dispatcher<R>,
    mode: RelayMode,
    running: Arc<AtomicBool>,
) -> Result<()> {
    // One spare byte tells an oversize datagram from one of exactly 512.
    let mut buf = [0u8; MAX_MESSAGE_SIZE + 1];

    while running.load(Ordering::SeqCst) {
        let (len, client) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(err) => {
                warn!(error = %err, "failed to receive packet");
                continue;
            }
        };

        match mode {
            RelayMode::Serial => {
                serve_packet(&socket, &dispatcher, &mut buf[..len], client).await;
            }
            RelayMode::Concurrent => {
                let mut packet = buf[..len].to_vec();
                let socket = Arc::clone(&socket);
                let dispatcher = dispatcher.clone();
                tokio::spawn(async move {
                    serve_packet(&socket, &dispatcher, &mut packet, client).await;
                });
            }
        }
    }

    Ok(())
}
