//! Two-node test fixture for integration testing
//!
//! Provides a controller and a commissionable device connected by an
//! in-memory link:
//! - PASE commissioning
//! - CASE on a shared fabric
//! - Application exchanges over the resulting sessions
//!
//! # Example
//!
//! ```no_run
//! use hearth_integration_tests::fixtures::TwoNodeFixture;
//!
//! #[tokio::test]
//! async fn test_commission() {
//!     let fixture = TwoNodeFixture::new().await;
//!     let session = fixture.commission().await.unwrap();
//!     assert!(session.is_secure());
//!     fixture.cleanup().await;
//! }
//! ```

use async_trait::async_trait;
use hearth_core::case::{CertificateAuthority, OperationalFabric};
use hearth_core::exchange::{MessageExchange, ProtocolHandler};
use hearth_core::node::{CommissioningConfig, MrpConfig, Node, NodeConfig};
use hearth_core::session::Session;
use hearth_transport::{MemoryTransport, Transport};
use std::net::SocketAddr;
use std::sync::Arc;

use super::faulty::{Fault, FaultyTransport};

/// Device setup passcode
pub const PASSCODE: u32 = 20_202_021;

/// Device PBKDF2 salt
pub const SALT: &[u8; 16] = b"SPAKE2P Key Salt";

/// Protocol id served by [`EchoHandler`]
pub const ECHO_PROTOCOL: u32 = 0xFFF1_0001;

/// Fabric id used by [`TwoNodeFixture::join_fabric`]
pub const FABRIC_ID: u64 = 0x2906_C908_D115_D362;

/// Controller node id on the shared fabric
pub const CONTROLLER_NODE_ID: u64 = 0x0001_B669;

/// Device node id on the shared fabric
pub const DEVICE_NODE_ID: u64 = 0x0000_1234;

/// Replies to each request with the same payload and `message_type + 1`.
#[derive(Debug, Default)]
pub struct EchoHandler;

#[async_trait]
impl ProtocolHandler for EchoHandler {
    fn protocol_id(&self) -> u32 {
        ECHO_PROTOCOL
    }

    async fn on_new_exchange(&self, mut exchange: MessageExchange) {
        if let Ok(request) = exchange.next_message().await {
            let reply_type = request.payload_header.message_type.wrapping_add(1);
            if let Err(e) = exchange.send(reply_type, &request.payload).await {
                tracing::debug!("echo reply failed: {}", e);
            }
        }
        exchange.close().await;
    }
}

/// Fast retransmission so lossy-link tests stay short.
fn test_mrp() -> MrpConfig {
    MrpConfig {
        idle_retransmission_ms: 100,
        active_retransmission_ms: 100,
        max_retransmissions: 4,
    }
}

/// Controller and device nodes over a [`MemoryTransport`] pair.
pub struct TwoNodeFixture {
    /// Commissioner
    pub controller: Node,
    /// Commissionable device, also serving [`EchoHandler`]
    pub device: Node,
    /// Controller side of the link
    pub controller_transport: Arc<MemoryTransport>,
    /// Device side of the link
    pub device_transport: Arc<MemoryTransport>,
    /// Fault wrapper the device sends through, if any
    pub device_faults: Option<Arc<FaultyTransport>>,
    /// Controller address
    pub controller_addr: SocketAddr,
    /// Device address
    pub device_addr: SocketAddr,
}

impl TwoNodeFixture {
    /// Build and start both nodes.
    ///
    /// # Panics
    ///
    /// Panics if the fixed test configuration is rejected.
    pub async fn new() -> Self {
        Self::build(None).await
    }

    /// Like [`TwoNodeFixture::new`], but the device applies `fault` to its
    /// next `count` outgoing handshake StatusReports.
    pub async fn with_device_fault(fault: Fault, count: usize) -> Self {
        Self::build(Some((fault, count))).await
    }

    async fn build(fault: Option<(Fault, usize)>) -> Self {
        let controller_addr = SocketAddr::from(([127, 0, 0, 1], 5540));
        let device_addr = SocketAddr::from(([127, 0, 0, 1], 5541));
        let (controller_transport, device_transport) =
            MemoryTransport::pair(controller_addr, device_addr);

        let controller_config = NodeConfig {
            mrp: test_mrp(),
            ..NodeConfig::default()
        };
        let device_config = NodeConfig {
            mrp: test_mrp(),
            commissioning: Some(CommissioningConfig {
                passcode: PASSCODE,
                salt: hex::encode(SALT),
                iterations: 1000,
            }),
            ..NodeConfig::default()
        };

        let controller = Node::new(controller_config, controller_transport.clone()).unwrap();
        let device_faults = fault.map(|(fault, count)| {
            Arc::new(FaultyTransport::new(device_transport.clone(), fault, count))
        });
        let device_link: Arc<dyn Transport> = match &device_faults {
            Some(faulty) => faulty.clone(),
            None => device_transport.clone(),
        };
        let device = Node::new(device_config, device_link).unwrap();
        controller.add_protocol_handler(Arc::new(EchoHandler));
        device.add_protocol_handler(Arc::new(EchoHandler));
        controller.start().await;
        device.start().await;

        Self {
            controller,
            device,
            controller_transport,
            device_transport,
            device_faults,
            controller_addr,
            device_addr,
        }
    }

    /// Commission the device with the right passcode.
    ///
    /// # Errors
    ///
    /// Returns the controller-side handshake error.
    pub async fn commission(&self) -> hearth_core::Result<Arc<Session>> {
        self.controller.commission(self.device_addr, PASSCODE).await
    }

    /// Issue credentials for both nodes from one CA and add them to the
    /// nodes. Returns the controller's and the device's fabric.
    ///
    /// # Panics
    ///
    /// Panics if issuing fails.
    pub fn join_fabric(&self, ca: &CertificateAuthority) -> (Arc<OperationalFabric>, Arc<OperationalFabric>) {
        let controller_fabric = Arc::new(ca.issue(CONTROLLER_NODE_ID).unwrap());
        let device_fabric = Arc::new(ca.issue(DEVICE_NODE_ID).unwrap());
        self.controller.add_fabric(controller_fabric.clone());
        self.device.add_fabric(device_fabric.clone());
        (controller_fabric, device_fabric)
    }

    /// Send one echo request from the controller and return the reply payload.
    ///
    /// # Panics
    ///
    /// Panics if the exchange fails.
    pub async fn echo(&self, session: Arc<Session>, payload: &[u8]) -> Vec<u8> {
        let mut exchange = self
            .controller
            .open_exchange(session, self.device_addr, ECHO_PROTOCOL)
            .unwrap();
        exchange.send(0x01, payload).await.unwrap();
        let reply = exchange.next_message().await.unwrap();
        assert_eq!(reply.payload_header.message_type, 0x02);
        exchange.close().await;
        reply.payload
    }

    /// Stop both nodes.
    pub async fn cleanup(self) {
        let _ = self.controller.stop().await;
        let _ = self.device.stop().await;
    }
}
