//! Upstream relay trait and the one-socket-per-query implementation.
//!
//! Provides abstraction over forwarding to enable:
//! - Testing with mock relays
//! - Serial and concurrent forwarding strategies

use std::future::Future;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use tokio::net::UdpSocket;

use super::codec::MAX_MESSAGE_SIZE;
use crate::error::{Error, Result};

/// Forwards a raw query to an upstream resolver and returns its reply.
///
/// The query is sent unmodified. Replies longer than [`MAX_MESSAGE_SIZE`]
/// are truncated.
pub trait Relay: Send + Sync + Clone + 'static {
    /// Forward `query`, received from `client`, and wait for the reply.
    fn forward(
        &self,
        query: &[u8],
        client: SocketAddr,
    ) -> impl Future<Output = Result<Vec<u8>>> + Send;

    /// Address replies are expected from.
    fn upstream(&self) -> SocketAddr;
}

/// Local wildcard address in the same family as `upstream`.
pub(crate) fn unspecified_for(upstream: SocketAddr) -> SocketAddr {
    match upstream {
        SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
        SocketAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
    }
}

/// Transaction ID of a raw message, if it has one.
pub(crate) fn message_id(buf: &[u8]) -> Option<u16> {
    match buf {
        [hi, lo, ..] => Some(u16::from_be_bytes([*hi, *lo])),
        _ => None,
    }
}

/// Relay that opens a fresh ephemeral socket for every query.
///
/// The socket is connected to the upstream, so datagrams from any other
/// source are filtered by the kernel. Replies whose ID does not match the
/// query are ignored until the deadline.
#[derive(Debug, Clone)]
pub struct UdpRelay {
    upstream: SocketAddr,
    timeout: Duration,
}

impl UdpRelay {
    pub const fn new(upstream: SocketAddr, timeout: Duration) -> Self {
        Self { upstream, timeout }
    }

    async fn exchange(&self, query: &[u8]) -> Result<Vec<u8>> {
        let socket = UdpSocket::bind(unspecified_for(self.upstream)).await?;
        socket.connect(self.upstream).await?;
        socket.send(query).await?;

        let expected = message_id(query);
        let mut buf = [0u8; MAX_MESSAGE_SIZE];
        loop {
            let len = socket.recv(&mut buf).await?;
            let reply = &buf[..len];
            if expected.is_none() || message_id(reply) == expected {
                return Ok(reply.to_vec());
            }
            tracing::debug!(
                upstream = %self.upstream,
                got = ?message_id(reply),
                "ignoring reply with unexpected id"
            );
        }
    }
}

impl Relay for UdpRelay {
    async fn forward(&self, query: &[u8], _client: SocketAddr) -> Result<Vec<u8>> {
        match tokio::time::timeout(self.timeout, self.exchange(query)).await {
            Ok(result) => result,
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
pub mod tests {
    use super::*;
    use crate::dns::codec::tests::build_query;
    use std::net::Ipv4Addr;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use tokio::sync::RwLock;

    pub const MOCK_UPSTREAM: SocketAddr =
        SocketAddr::new(std::net::IpAddr::V4(Ipv4Addr::new(10, 0, 0, 53)), 53);

    /// Turn a raw query into a minimal NOERROR reply with the same ID.
    pub fn answer_for(query: &[u8]) -> Vec<u8> {
        let mut reply = query.to_vec();
        if reply.len() >= 4 {
            reply[2] |= 0x80;
            reply[3] = 0x80;
        }
        reply
    }

    /// Mock relay for testing.
    ///
    /// Answers every query with [`answer_for`] unless a fixed reply or a
    /// timeout is configured, and counts forwarded queries.
    #[derive(Clone, Default)]
    pub struct MockRelay {
        /// Fixed reply bytes returned instead of the echoed query.
        pub reply: Arc<RwLock<Option<Vec<u8>>>>,
        /// If set, forward fails with a timeout.
        pub timeout: Arc<AtomicBool>,
        /// Count of forward calls.
        pub forward_count: Arc<AtomicU64>,
        /// Last client address passed to forward.
        pub last_client: Arc<RwLock<Option<SocketAddr>>>,
    }

    impl MockRelay {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn set_reply(&self, reply: Vec<u8>) {
            *self.reply.write().await = Some(reply);
        }

        pub fn set_timeout(&self, enabled: bool) {
            self.timeout.store(enabled, Ordering::SeqCst);
        }

        pub fn forward_count(&self) -> u64 {
            self.forward_count.load(Ordering::SeqCst)
        }

        pub async fn last_client(&self) -> Option<SocketAddr> {
            *self.last_client.read().await
        }
    }

    impl Relay for MockRelay {
        async fn forward(&self, query: &[u8], client: SocketAddr) -> Result<Vec<u8>> {
            self.forward_count.fetch_add(1, Ordering::SeqCst);
            *self.last_client.write().await = Some(client);

            if self.timeout.load(Ordering::SeqCst) {
                return Err(Error::UpstreamTimeout {
                    upstream: MOCK_UPSTREAM,
                    timeout_ms: 0,
                });
            }

            let mut reply = match self.reply.read().await.as_ref() {
                Some(reply) => reply.clone(),
                None => answer_for(query),
            };
            reply.truncate(MAX_MESSAGE_SIZE);
            Ok(reply)
        }

        fn upstream(&self) -> SocketAddr {
            MOCK_UPSTREAM
        }
    }

    const CLIENT: SocketAddr =
        SocketAddr::new(std::net::IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 40000);

    async fn loopback_upstream() -> (UdpSocket, SocketAddr) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        (socket, addr)
    }

    #[tokio::test]
    async fn should_forward_and_return_reply() {
        let (upstream, addr) = loopback_upstream().await;
        tokio::spawn(async move {
            let mut buf = [0u8; 512];
            let (len, from) = upstream.recv_from(&mut buf).await.unwrap();
            upstream.send_to(&answer_for(&buf[..len]), from).await.unwrap();
        });

        let relay = UdpRelay::new(addr, Duration::from_secs(2));
        let query = build_query(0x1234, "example.com", true);
        let reply = relay.forward(&query, CLIENT).await.unwrap();

        assert_eq!(reply, answer_for(&query));
        assert_eq!(relay.upstream(), addr);
    }

    #[tokio::test]
    async fn should_ignore_reply_with_wrong_id() {
        let (upstream, addr) = loopback_upstream().await;
        tokio::spawn(async move {
            let mut buf = [0u8; 512];
            let (len, from) = upstream.recv_from(&mut buf).await.unwrap();
            let good = answer_for(&buf[..len]);
            let mut stray = good.clone();
            stray[0] ^= 0xff;
            upstream.send_to(&stray, from).await.unwrap();
            upstream.send_to(&good, from).await.unwrap();
        });

        let relay = UdpRelay::new(addr, Duration::from_secs(2));
        let query = build_query(0x0a0b, "example.com", false);
        let reply = relay.forward(&query, CLIENT).await.unwrap();

        assert_eq!(message_id(&reply), Some(0x0a0b));
    }

    #[tokio::test]
    async fn should_time_out_when_upstream_is_silent() {
        let (_upstream, addr) = loopback_upstream().await;

        let relay = UdpRelay::new(addr, Duration::from_millis(50));
        let query = build_query(1, "example.com", true);
        let result = relay.forward(&query, CLIENT).await;

        assert!(matches!(
            result,
            Err(Error::UpstreamTimeout { timeout_ms: 50, .. })
        ));
    }

    #[tokio::test]
    async fn should_truncate_long_reply() {
        let (upstream, addr) = loopback_upstream().await;
        tokio::spawn(async move {
            let mut buf = [0u8; 512];
            let (len, from) = upstream.recv_from(&mut buf).await.unwrap();
            let mut reply = answer_for(&buf[..len]);
            reply.resize(900, 0);
            upstream.send_to(&reply, from).await.unwrap();
        });

        let relay = UdpRelay::new(addr, Duration::from_secs(2));
        let query = build_query(7, "example.com", true);
        let reply = relay.forward(&query, CLIENT).await.unwrap();

        assert_eq!(reply.len(), MAX_MESSAGE_SIZE);
    }

    #[test]
    fn should_read_message_id() {
        assert_eq!(message_id(&[0xab, 0xcd, 0]), Some(0xabcd));
        assert_eq!(message_id(&[0xab]), None);
    }

    #[tokio::test]
    async fn mock_relay_should_count_and_fail_on_demand() {
        let relay = MockRelay::new();
        let query = build_query(3, "example.com", true);

        relay.forward(&query, CLIENT).await.unwrap();
        relay.set_timeout(true);
        assert!(relay.forward(&query, CLIENT).await.is_err());

        assert_eq!(relay.forward_count(), 2);
        assert_eq!(relay.last_client().await, Some(CLIENT));
    }
}
