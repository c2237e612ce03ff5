//! In-process datagram transport.
//!
//! [`MemoryTransport::pair`] returns two connected endpoints backed by Tokio
//! channels. Each endpoint can be told to silently drop its next outgoing
//! datagrams, which is how tests exercise acknowledgement and
//! retransmission without a real network.

use crate::MAX_DATAGRAM_SIZE;
use crate::transport::{StatsCounters, Transport, TransportError, TransportResult, TransportStats};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::{Mutex, mpsc};

type Datagram = (Vec<u8>, SocketAddr);

/// One endpoint of an in-memory datagram link.
pub struct MemoryTransport {
    local: SocketAddr,
    peer: SocketAddr,
    tx: mpsc::UnboundedSender<Datagram>,
    rx: Mutex<mpsc::UnboundedReceiver<Datagram>>,
    closed: AtomicBool,
    drop_next: AtomicUsize,
    stats: StatsCounters,
}

impl MemoryTransport {
    /// Create two connected endpoints with the given addresses.
    #[must_use]
    pub fn pair(a: SocketAddr, b: SocketAddr) -> (Arc<Self>, Arc<Self>) {
        let (tx_a, rx_b) = mpsc::unbounded_channel();
        let (tx_b, rx_a) = mpsc::unbounded_channel();
        let endpoint = |local, peer, tx, rx| {
            Arc::new(Self {
                local,
                peer,
                tx,
                rx: Mutex::new(rx),
                closed: AtomicBool::new(false),
                drop_next: AtomicUsize::new(0),
                stats: StatsCounters::default(),
            })
        };
        (endpoint(a, b, tx_a, rx_a), endpoint(b, a, tx_b, rx_b))
    }

    /// Silently discard the next `count` datagrams sent from this endpoint.
    pub fn drop_next(&self, count: usize) {
        self.drop_next.store(count, Ordering::SeqCst);
    }

    /// Address of the connected endpoint.
    #[must_use]
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    fn take_drop(&self) -> bool {
        self.drop_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send_to(&self, buf: &[u8], addr: SocketAddr) -> TransportResult<usize> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(TransportError::Closed);
        }
        if addr != self.peer {
            self.stats.record_send_error();
            return Err(TransportError::Unreachable(addr));
        }
        if buf.len() > MAX_DATAGRAM_SIZE {
            self.stats.record_send_error();
            return Err(TransportError::TooLarge {
                size: buf.len(),
                max: MAX_DATAGRAM_SIZE,
            });
        }

        if self.take_drop() {
            tracing::trace!("memory transport {} dropping {} bytes", self.local, buf.len());
            self.stats.record_drop();
            return Ok(buf.len());
        }

        // A closed peer behaves like a host that stopped listening.
        if self.tx.send((buf.to_vec(), self.local)).is_err() {
            tracing::trace!("memory transport peer {} is gone", self.peer);
        }
        self.stats.record_send(buf.len());
        Ok(buf.len())
    }

    async fn recv_from(&self, buf: &mut [u8]) -> TransportResult<(usize, SocketAddr)> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(TransportError::Closed);
        }

        let mut rx = self.rx.lock().await;
        let Some((data, from)) = rx.recv().await else {
            self.stats.record_recv_error();
            return Err(TransportError::Closed);
        };

        let size = data.len().min(buf.len());
        buf[..size].copy_from_slice(&data[..size]);
        self.stats.record_recv(size);
        Ok((size, from))
    }

    fn local_addr(&self) -> TransportResult<SocketAddr> {
        Ok(self.local)
    }

    async fn close(&self) -> TransportResult<()> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    fn stats(&self) -> TransportStats {
        self.stats.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    fn addrs() -> (SocketAddr, SocketAddr) {
        (
            "10.0.0.1:5540".parse().unwrap(),
            "10.0.0.2:5540".parse().unwrap(),
        )
    }

    #[tokio::test]
    async fn test_pair_send_recv() {
        let (a_addr, b_addr) = addrs();
        let (a, b) = MemoryTransport::pair(a_addr, b_addr);

        a.send_to(b"hello", b_addr).await.unwrap();
        let mut buf = [0u8; 64];
        let (size, from) = b.recv_from(&mut buf).await.unwrap();

        assert_eq!(&buf[..size], b"hello");
        assert_eq!(from, a_addr);
        assert_eq!(b.peer_addr(), a_addr);
    }

    #[tokio::test]
    async fn test_drop_next() {
        let (a_addr, b_addr) = addrs();
        let (a, b) = MemoryTransport::pair(a_addr, b_addr);
        a.drop_next(2);

        for i in 0u8..3 {
            a.send_to(&[i], b_addr).await.unwrap();
        }

        let mut buf = [0u8; 4];
        let (size, _) = b.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..size], &[2]);
        assert_eq!(a.stats().packets_dropped, 2);
        assert_eq!(a.stats().packets_sent, 1);

        let nothing = timeout(Duration::from_millis(20), b.recv_from(&mut buf)).await;
        assert!(nothing.is_err());
    }

    #[tokio::test]
    async fn test_unreachable_and_oversized() {
        let (a_addr, b_addr) = addrs();
        let (a, _b) = MemoryTransport::pair(a_addr, b_addr);

        let stranger: SocketAddr = "10.0.0.9:1".parse().unwrap();
        assert!(matches!(
            a.send_to(b"x", stranger).await,
            Err(TransportError::Unreachable(_))
        ));
        assert!(matches!(
            a.send_to(&vec![0u8; MAX_DATAGRAM_SIZE + 1], b_addr).await,
            Err(TransportError::TooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn test_close() {
        let (a_addr, b_addr) = addrs();
        let (a, _b) = MemoryTransport::pair(a_addr, b_addr);
        a.close().await.unwrap();
        assert!(a.is_closed());
        assert!(matches!(
            a.send_to(b"x", b_addr).await,
            Err(TransportError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_recv_after_peer_dropped() {
        let (a_addr, b_addr) = addrs();
        let (a, b) = MemoryTransport::pair(a_addr, b_addr);
        drop(b);

        // The sender side of a's inbox lived in b.
        let mut buf = [0u8; 4];
        assert!(matches!(
            a.recv_from(&mut buf).await,
            Err(TransportError::Closed)
        ));
    }
}
