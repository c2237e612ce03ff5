//! Node composition: transport, session table, exchange manager and the
//! secure channel handlers wired together.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                   Node                       │
//! ├──────────────────────────────────────────────┤
//! │  ExchangeManager  ──►  SecureChannelHandler  │
//! │        │                 ├─ PaseServer       │
//! │        │                 └─ CaseServer       │
//! │        │               application handlers  │
//! ├────────┴─────────────────────────────────────┤
//! │  SessionTable  │  FabricTable  │  Transport  │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use hearth_core::node::{Node, NodeConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let node = Node::bind(NodeConfig::default()).await?;
//!     node.start().await;
//!
//!     let session = node.commission("192.168.1.20:5540".parse()?, 20202021).await?;
//!     println!("commissioned, session {}", session.id());
//!     Ok(())
//! }
//! ```

pub mod config;

pub use config::{CommissioningConfig, MrpConfig, NodeConfig};

use crate::case::{CaseClient, CaseServer, Fabric, FabricLookup, FabricTable};
use crate::error::{Error, Result, SessionError};
use crate::exchange::{ExchangeManager, MessageExchange, ProtocolHandler};
use crate::pase::{PaseClient, PaseServer};
use crate::protocol::SECURE_CHANNEL_PROTOCOL_ID;
use crate::secure_channel::SecureChannelHandler;
use crate::session::{Session, SessionTable};
use hearth_transport::{AsyncUdpTransport, Transport};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

struct NodeInner {
    config: NodeConfig,
    transport: Arc<dyn Transport>,
    sessions: Arc<SessionTable>,
    fabrics: Arc<FabricTable>,
    manager: Arc<ExchangeManager>,
    receive_task: Mutex<Option<JoinHandle<()>>>,
}

/// A Hearth node.
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("config", &self.inner.config)
            .field("fabrics", &self.inner.fabrics.len())
            .finish_non_exhaustive()
    }
}

// Constructors

impl Node {
    /// Build a node over an existing transport.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration is invalid.
    pub fn new(config: NodeConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;

        let sessions = Arc::new(SessionTable::new(config.mrp.session_parameters()));
        let fabrics = Arc::new(FabricTable::new());
        let manager = Arc::new(ExchangeManager::new(
            Arc::clone(&transport),
            Arc::clone(&sessions),
        ));

        let pase = match &config.commissioning {
            Some(commissioning) => Some(Arc::new(PaseServer::new(
                Arc::clone(&sessions),
                commissioning.passcode,
                commissioning.salt_bytes()?,
                commissioning.iterations,
            )?)),
            None => None,
        };
        let lookup: Arc<dyn FabricLookup> = Arc::clone(&fabrics) as Arc<dyn FabricLookup>;
        let case = Arc::new(CaseServer::new(Arc::clone(&sessions), lookup));
        manager.add_protocol_handler(Arc::new(SecureChannelHandler::new(pase, case)));

        Ok(Self {
            inner: Arc::new(NodeInner {
                config,
                transport,
                sessions,
                fabrics,
                manager,
                receive_task: Mutex::new(None),
            }),
        })
    }

    /// Bind a UDP transport on `config.listen_addr` and build a node over it.
    ///
    /// # Errors
    ///
    /// Returns configuration or bind errors.
    pub async fn bind(config: NodeConfig) -> Result<Self> {
        config.validate()?;
        let transport = AsyncUdpTransport::bind(config.listen_addr).await?;
        Self::new(config, Arc::new(transport))
    }
}

// Accessors

impl Node {
    /// Configuration the node was built with
    #[must_use]
    pub fn config(&self) -> &NodeConfig {
        &self.inner.config
    }

    /// Bound local address.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the address cannot be determined.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.inner.transport.local_addr()?)
    }

    /// Session table shared by every handshake
    #[must_use]
    pub fn sessions(&self) -> &Arc<SessionTable> {
        &self.inner.sessions
    }

    /// Local fabrics answered by the CASE responder
    #[must_use]
    pub fn fabrics(&self) -> &Arc<FabricTable> {
        &self.inner.fabrics
    }

    /// Whether the commissioning window is configured
    #[must_use]
    pub fn is_commissionable(&self) -> bool {
        self.inner.config.commissioning.is_some()
    }
}

// Lifecycle

impl Node {
    /// Spawn the receive loop. Calling it again while running is a no-op.
    pub async fn start(&self) {
        let mut task = self.inner.receive_task.lock().await;
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        let manager = Arc::clone(&self.inner.manager);
        *task = Some(tokio::spawn(async move { manager.run().await }));
        info!(addr = ?self.inner.transport.local_addr().ok(), "node started");
    }

    /// Close the transport and wait for the receive loop to stop.
    ///
    /// # Errors
    ///
    /// Returns a transport error if closing fails.
    pub async fn stop(&self) -> Result<()> {
        self.inner.transport.close().await?;
        if let Some(handle) = self.inner.receive_task.lock().await.take() {
            if let Err(e) = handle.await {
                debug!("receive loop ended abnormally: {}", e);
            }
        }
        info!("node stopped");
        Ok(())
    }
}

// Fabrics and handlers

impl Node {
    /// Join a fabric; CASE requests addressed to it are answered from now on.
    pub fn add_fabric(&self, fabric: Arc<dyn Fabric>) {
        info!(
            fabric_id = fabric.fabric_id(),
            node_id = fabric.node_id(),
            "fabric added"
        );
        self.inner.fabrics.add(fabric);
    }

    /// Register an application protocol handler.
    pub fn add_protocol_handler(&self, handler: Arc<dyn ProtocolHandler>) {
        self.inner.manager.add_protocol_handler(handler);
    }
}

// Session establishment

impl Node {
    /// Run PASE as commissioner against `peer`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Handshake`] if the handshake fails.
    pub async fn commission(&self, peer: SocketAddr, passcode: u32) -> Result<Arc<Session>> {
        let exchange = self.inner.manager.initiate(
            self.inner.sessions.unsecure_session()?,
            peer,
            SECURE_CHANNEL_PROTOCOL_ID,
        );
        let session = PaseClient::new(Arc::clone(&self.inner.sessions))
            .establish(exchange, passcode)
            .await?;
        Ok(session)
    }

    /// Run CASE on `fabric` towards `peer_node_id` at `peer`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Handshake`] if the handshake fails.
    pub async fn establish_case(
        &self,
        peer: SocketAddr,
        fabric: &dyn Fabric,
        peer_node_id: u64,
    ) -> Result<Arc<Session>> {
        let exchange = self.inner.manager.initiate(
            self.inner.sessions.unsecure_session()?,
            peer,
            SECURE_CHANNEL_PROTOCOL_ID,
        );
        let session = CaseClient::new(Arc::clone(&self.inner.sessions))
            .establish(exchange, fabric, peer_node_id)
            .await?;
        Ok(session)
    }

    /// Open an application exchange on an established secure session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotSecure`] for the unsecured session.
    pub fn open_exchange(
        &self,
        session: Arc<Session>,
        peer: SocketAddr,
        protocol_id: u32,
    ) -> Result<MessageExchange> {
        if !session.is_secure() {
            return Err(Error::Session(SessionError::NotSecure(session.id())));
        }
        Ok(self.inner.manager.initiate(session, peer, protocol_id))
    }
}
