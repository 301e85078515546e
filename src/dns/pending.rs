//! Concurrent relay over one shared upstream socket.
//!
//! Every outgoing query is assigned a fresh upstream transaction ID and
//! parked in a pending table. A background task reads replies, looks the
//! upstream ID up, restores the client's original ID and wakes the waiting
//! caller. Many queries can therefore be outstanding at once without
//! serializing unrelated clients.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::codec::MAX_MESSAGE_SIZE;
use super::relay::{Relay, message_id, unspecified_for};
use crate::error::{Error, PacketError, Result};

/// Identity of a client query: its transaction ID and source address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PendingKey {
    pub id: u16,
    pub client: SocketAddr,
}

struct Pending {
    key: PendingKey,
    reply: oneshot::Sender<Vec<u8>>,
}

#[derive(Default)]
struct PendingTable {
    by_upstream_id: HashMap<u16, Pending>,
    by_key: HashMap<PendingKey, u16>,
}

impl PendingTable {
    fn remove(&mut self, upstream_id: u16) -> Option<Pending> {
        let pending = self.by_upstream_id.remove(&upstream_id)?;
        self.by_key.remove(&pending.key);
        Some(pending)
    }
}

/// Random draws tried before scanning for a free upstream ID.
const RANDOM_ID_DRAWS: usize = 32;

struct Shared {
    socket: UdpSocket,
    table: Mutex<PendingTable>,
}

impl Shared {
    fn register(&self, key: PendingKey) -> Result<(u16, oneshot::Receiver<Vec<u8>>)> {
        let mut table = self.table.lock();
        if table.by_key.contains_key(&key) {
            return Err(Error::DuplicateQuery {
                id: key.id,
                client: key.client,
            });
        }

        // Random IDs keep off-path spoofers guessing; the scan only runs when
        // the table is close to full.
        let upstream_id = std::iter::repeat_with(rand::random::<u16>)
            .take(RANDOM_ID_DRAWS)
            .chain(0..=u16::MAX)
            .find(|id| !table.by_upstream_id.contains_key(id))
            .ok_or_else(|| {
                Error::Io(io::Error::new(
                    io::ErrorKind::WouldBlock,
                    "every upstream transaction id is in flight",
                ))
            })?;

        let (tx, rx) = oneshot::channel();
        table.by_key.insert(key, upstream_id);
        table
            .by_upstream_id
            .insert(upstream_id, Pending { key, reply: tx });
        Ok((upstream_id, rx))
    }

    async fn receive_loop(self: Arc<Self>) {
        let mut buf = [0u8; MAX_MESSAGE_SIZE];
        loop {
            let len = match self.socket.recv(&mut buf).await {
                Ok(len) => len,
                Err(err) => {
                    tracing::warn!(error = %err, "upstream receive failed");
                    continue;
                }
            };

            let reply = &mut buf[..len];
            let Some(upstream_id) = message_id(reply) else {
                continue;
            };
            let Some(pending) = self.table.lock().remove(upstream_id) else {
                tracing::debug!(upstream_id, "reply for unknown or expired query");
                continue;
            };

            reply[..2].copy_from_slice(&pending.key.id.to_be_bytes());
            // The waiter may have timed out between lookup and send.
            let _ = pending.reply.send(reply.to_vec());
        }
    }
}

/// Removes a table entry when its waiter finishes, whatever the outcome.
struct Registration<'a> {
    shared: &'a Shared,
    upstream_id: u16,
    key: PendingKey,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        let mut table = self.shared.table.lock();
        if table
            .by_upstream_id
            .get(&self.upstream_id)
            .is_some_and(|pending| pending.key == self.key)
        {
            table.remove(self.upstream_id);
        }
    }
}

struct ReceiveTask(JoinHandle<()>);

impl Drop for ReceiveTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Relay keyed by `(transaction id, client address)`.
///
/// A retransmission with the same key while the first copy is still in
/// flight is rejected with [`Error::DuplicateQuery`]. The receive task stops
/// when the last clone is dropped.
#[derive(Clone)]
pub struct PendingRelay {
    shared: Arc<Shared>,
    upstream: SocketAddr,
    timeout: Duration,
    _receiver: Arc<ReceiveTask>,
}

impl PendingRelay {
    /// Open the shared upstream socket and start the receive task.
    pub async fn bind(upstream: SocketAddr, timeout: Duration) -> Result<Self> {
        let socket = UdpSocket::bind(unspecified_for(upstream)).await?;
        socket.connect(upstream).await?;

        let shared = Arc::new(Shared {
            socket,
            table: Mutex::new(PendingTable::default()),
        });
        let receiver = tokio::spawn(Arc::clone(&shared).receive_loop());

        tracing::debug!(%upstream, "concurrent relay ready");
        Ok(Self {
            shared,
            upstream,
            timeout,
            _receiver: Arc::new(ReceiveTask(receiver)),
        })
    }

    /// Number of queries waiting for an upstream reply.
    pub fn in_flight(&self) -> usize {
        self.shared.table.lock().by_upstream_id.len()
    }
}

impl Relay for PendingRelay {
    async fn forward(&self, query: &[u8], client: SocketAddr) -> Result<Vec<u8>> {
        let id = message_id(query).ok_or(PacketError::Malformed("missing transaction id"))?;
        let key = PendingKey { id, client };
        let (upstream_id, rx) = self.shared.register(key)?;
        let _registration = Registration {
            shared: &self.shared,
            upstream_id,
            key,
        };

        let mut outgoing = query.to_vec();
        outgoing[..2].copy_from_slice(&upstream_id.to_be_bytes());
        self.shared.socket.send(&outgoing).await?;

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(Error::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "upstream receive task stopped",
            ))),
            Err(_) => Err(Error::UpstreamTimeout {
                upstream: self.upstream,
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        }
    }

    fn upstream(&self) -> SocketAddr {
        self.upstream
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::codec::tests::build_query;
    use crate::dns::relay::tests::answer_for;
    use std::net::{IpAddr, Ipv4Addr};

    fn client(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(192, 168, 4, 2)), port)
    }

    async fn wait_for_in_flight(relay: &PendingRelay, expected: usize) {
        for _ in 0..100 {
            if relay.in_flight() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {expected} queries in flight, got {}", relay.in_flight());
    }

    #[tokio::test]
    async fn should_restore_original_id() {
        let upstream = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = upstream.local_addr().unwrap();
        let seen_id = tokio::spawn(async move {
            let mut buf = [0u8; 512];
            let (len, from) = upstream.recv_from(&mut buf).await.unwrap();
            upstream.send_to(&answer_for(&buf[..len]), from).await.unwrap();
            message_id(&buf[..len]).unwrap()
        });

        let relay = PendingRelay::bind(addr, Duration::from_secs(2)).await.unwrap();
        let query = build_query(0xbeef, "example.com", true);
        let reply = relay.forward(&query, client(5000)).await.unwrap();

        assert_eq!(message_id(&reply), Some(0xbeef));
        assert_eq!(&reply[2..], &answer_for(&query)[2..]);
        seen_id.await.unwrap();
        assert_eq!(relay.in_flight(), 0);
    }

    #[tokio::test]
    async fn should_not_assign_sequential_upstream_ids() {
        let upstream = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = upstream.local_addr().unwrap();
        let seen = tokio::spawn(async move {
            let mut ids = Vec::new();
            let mut buf = [0u8; 512];
            while ids.len() < 16 {
                let (len, from) = upstream.recv_from(&mut buf).await.unwrap();
                ids.push(message_id(&buf[..len]).unwrap());
                upstream.send_to(&answer_for(&buf[..len]), from).await.unwrap();
            }
            ids
        });

        let relay = PendingRelay::bind(addr, Duration::from_secs(2)).await.unwrap();
        for id in 0..16 {
            let query = build_query(id, "example.com", true);
            let reply = relay.forward(&query, client(5000)).await.unwrap();
            assert_eq!(message_id(&reply), Some(id));
        }

        let ids = seen.await.unwrap();
        assert!(
            !ids.windows(2).all(|pair| pair[1] == pair[0].wrapping_add(1)),
            "upstream ids are sequential: {ids:?}"
        );
        assert!(ids.iter().any(|id| *id != ids[0]));
    }

    #[tokio::test]
    async fn should_serve_out_of_order_replies() {
        let upstream = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = upstream.local_addr().unwrap();
        tokio::spawn(async move {
            let mut received = Vec::new();
            let mut buf = [0u8; 512];
            while received.len() < 2 {
                let (len, from) = upstream.recv_from(&mut buf).await.unwrap();
                received.push((buf[..len].to_vec(), from));
            }
            for (query, from) in received.into_iter().rev() {
                upstream.send_to(&answer_for(&query), from).await.unwrap();
            }
        });

        let relay = PendingRelay::bind(addr, Duration::from_secs(2)).await.unwrap();
        let first = build_query(1, "one.example.com", true);
        let second = build_query(1, "two.example.com", true);

        let (a, b) = tokio::join!(
            relay.forward(&first, client(5000)),
            relay.forward(&second, client(5001)),
        );

        assert_eq!(a.unwrap(), answer_for(&first));
        assert_eq!(b.unwrap(), answer_for(&second));
    }

    #[tokio::test]
    async fn should_reject_duplicate_in_flight_query() {
        let upstream = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = upstream.local_addr().unwrap();

        let relay = PendingRelay::bind(addr, Duration::from_millis(300))
            .await
            .unwrap();
        let query = build_query(42, "example.com", true);

        let first = tokio::spawn({
            let relay = relay.clone();
            let query = query.clone();
            async move { relay.forward(&query, client(5000)).await }
        });
        wait_for_in_flight(&relay, 1).await;

        let duplicate = relay.forward(&query, client(5000)).await;
        assert!(matches!(
            duplicate,
            Err(Error::DuplicateQuery { id: 42, .. })
        ));

        assert!(matches!(
            first.await.unwrap(),
            Err(Error::UpstreamTimeout { .. })
        ));
        assert_eq!(relay.in_flight(), 0);
        drop(upstream);
    }

    #[tokio::test]
    async fn should_accept_same_id_from_different_clients() {
        let upstream = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = upstream.local_addr().unwrap();

        let relay = PendingRelay::bind(addr, Duration::from_millis(200))
            .await
            .unwrap();
        let query = build_query(42, "example.com", true);

        let (a, b) = tokio::join!(
            relay.forward(&query, client(5000)),
            relay.forward(&query, client(5001)),
        );

        assert!(matches!(a, Err(Error::UpstreamTimeout { .. })));
        assert!(matches!(b, Err(Error::UpstreamTimeout { .. })));
        drop(upstream);
    }

    #[tokio::test]
    async fn should_reject_query_without_id() {
        let upstream = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let relay = PendingRelay::bind(upstream.local_addr().unwrap(), Duration::from_millis(50))
            .await
            .unwrap();

        let result = relay.forward(&[0x01], client(5000)).await;
        assert!(matches!(
            result,
            Err(Error::Packet(PacketError::Malformed(_)))
        ));
    }
}
