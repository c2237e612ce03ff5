//! Async UDP transport implementation.
//!
//! Tokio UDP socket created through socket2 so buffer sizes and IPv6
//! options can be set before binding.

use crate::TransportConfig;
use crate::transport::{StatsCounters, Transport, TransportError, TransportResult, TransportStats};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::UdpSocket;

/// Async UDP transport using Tokio.
///
/// Cloning shares the socket, so retransmission tasks and the receive loop
/// can hold their own handles.
///
/// # Examples
///
/// ```no_run
/// use hearth_transport::udp_async::AsyncUdpTransport;
/// use hearth_transport::transport::Transport;
/// use std::net::SocketAddr;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let addr: SocketAddr = "[::]:5540".parse()?;
/// let transport = AsyncUdpTransport::bind(addr).await?;
/// println!("Listening on {}", transport.local_addr()?);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct AsyncUdpTransport {
    socket: Arc<UdpSocket>,
    closed: Arc<AtomicBool>,
    stats: Arc<StatsCounters>,
}

impl AsyncUdpTransport {
    /// Create a new async UDP transport bound to the given address with the
    /// default [`TransportConfig`].
    ///
    /// # Errors
    /// Returns `TransportError::BindFailed` if socket setup or binding fails
    pub async fn bind<A: Into<SocketAddr>>(addr: A) -> TransportResult<Self> {
        Self::bind_with_config(addr, &TransportConfig::default()).await
    }

    /// Create a new async UDP transport with explicit socket options.
    ///
    /// # Errors
    /// Returns `TransportError::BindFailed` if socket setup or binding fails
    pub async fn bind_with_config<A: Into<SocketAddr>>(
        addr: A,
        config: &TransportConfig,
    ) -> TransportResult<Self> {
        let addr = addr.into();
        let bind_err = |e: std::io::Error| TransportError::BindFailed(format!("{addr}: {e}"));

        let domain = if addr.is_ipv4() {
            socket2::Domain::IPV4
        } else {
            socket2::Domain::IPV6
        };

        let socket = socket2::Socket::new(domain, socket2::Type::DGRAM, Some(socket2::Protocol::UDP))
            .map_err(bind_err)?;

        socket
            .set_recv_buffer_size(config.recv_buffer_size)
            .map_err(bind_err)?;
        socket
            .set_send_buffer_size(config.send_buffer_size)
            .map_err(bind_err)?;
        if addr.is_ipv6() {
            socket.set_only_v6(config.ipv6_only).map_err(bind_err)?;
        }

        socket.bind(&addr.into()).map_err(bind_err)?;
        socket.set_nonblocking(true).map_err(bind_err)?;

        let std_socket: std::net::UdpSocket = socket.into();
        let socket = UdpSocket::from_std(std_socket).map_err(bind_err)?;

        tracing::debug!("UDP transport bound to {:?}", socket.local_addr().ok());
        Ok(Self::from_socket(socket))
    }

    /// Create from an existing Tokio `UdpSocket`.
    #[must_use]
    pub fn from_socket(socket: UdpSocket) -> Self {
        Self {
            socket: Arc::new(socket),
            closed: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(StatsCounters::default()),
        }
    }
}

#[async_trait]
impl Transport for AsyncUdpTransport {
    async fn send_to(&self, buf: &[u8], addr: SocketAddr) -> TransportResult<usize> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(TransportError::Closed);
        }

        match self.socket.send_to(buf, addr).await {
            Ok(sent) => {
                self.stats.record_send(sent);
                Ok(sent)
            }
            Err(e) => {
                self.stats.record_send_error();
                Err(TransportError::Io(e))
            }
        }
    }

    async fn recv_from(&self, buf: &mut [u8]) -> TransportResult<(usize, SocketAddr)> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(TransportError::Closed);
        }

        match self.socket.recv_from(buf).await {
            Ok((size, addr)) => {
                self.stats.record_recv(size);
                Ok((size, addr))
            }
            Err(e) => {
                self.stats.record_recv_error();
                Err(TransportError::Io(e))
            }
        }
    }

    fn local_addr(&self) -> TransportResult<SocketAddr> {
        self.socket.local_addr().map_err(TransportError::Io)
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
