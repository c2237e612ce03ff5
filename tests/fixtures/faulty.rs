//! Transport wrapper that loses or fails handshake status reports
//!
//! Handshake responders finish with a plaintext StatusReport on the
//! unsecured session. Targeting that message by content, rather than by
//! datagram position, keeps the tests independent of retransmission timing.

use async_trait::async_trait;
use hearth_core::codec::{decode_packet, decode_payload};
use hearth_core::protocol::{SECURE_CHANNEL_PROTOCOL_ID, SecureChannelOpcode};
use hearth_transport::{MemoryTransport, Transport, TransportError, TransportResult, TransportStats};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// What happens to a targeted datagram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Report success but never deliver it
    Drop,
    /// Return an I/O error to the sender
    Fail,
}

/// Applies a [`Fault`] to the next `count` outgoing StatusReports.
pub struct FaultyTransport {
    inner: Arc<MemoryTransport>,
    fault: Fault,
    remaining: AtomicUsize,
}

impl FaultyTransport {
    /// Wrap `inner`.
    #[must_use]
    pub fn new(inner: Arc<MemoryTransport>, fault: Fault, count: usize) -> Self {
        Self {
            inner,
            fault,
            remaining: AtomicUsize::new(count),
        }
    }

    /// Faults still to apply
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::SeqCst)
    }

    fn is_status_report(buf: &[u8]) -> bool {
        let Ok(packet) = decode_packet(buf) else {
            return false;
        };
        // secure sessions are encrypted; only unsecured traffic is inspected
        if packet.header.session_id != 0 {
            return false;
        }
        decode_payload(&packet).is_ok_and(|message| {
            message.payload_header.protocol_id == SECURE_CHANNEL_PROTOCOL_ID
                && message.payload_header.message_type == SecureChannelOpcode::StatusReport.as_u8()
        })
    }

    fn take_fault(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl Transport for FaultyTransport {
    async fn send_to(&self, buf: &[u8], addr: SocketAddr) -> TransportResult<usize> {
        if Self::is_status_report(buf) && self.take_fault() {
            tracing::debug!("faulty transport: {:?} status report", self.fault);
            return match self.fault {
                Fault::Drop => Ok(buf.len()),
                Fault::Fail => Err(TransportError::Io(io::Error::other("injected send failure"))),
            };
        }
        self.inner.send_to(buf, addr).await
    }

    async fn recv_from(&self, buf: &mut [u8]) -> TransportResult<(usize, SocketAddr)> {
        self.inner.recv_from(buf).await
    }

    fn local_addr(&self) -> TransportResult<SocketAddr> {
        self.inner.local_addr()
    }

    async fn close(&self) -> TransportResult<()> {
        self.inner.close().await
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    fn stats(&self) -> TransportStats {
        self.inner.stats()
    }
}
