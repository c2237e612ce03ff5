//! Node configuration

use crate::error::{Error, Result};
use crate::pase::{validate_passcode, validate_pbkdf_parameters};
use crate::session::SessionParameters;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Default UDP port
pub const DEFAULT_PORT: u16 = 5540;

/// Node configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Local UDP address
    pub listen_addr: SocketAddr,

    /// Reliable messaging parameters
    pub mrp: MrpConfig,

    /// PASE responder settings; the node is not commissionable without them
    pub commissioning: Option<CommissioningConfig>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            mrp: MrpConfig::default(),
            commissioning: None,
        }
    }
}

impl NodeConfig {
    /// Check every value before the node is built.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.mrp.idle_retransmission_ms == 0 || self.mrp.active_retransmission_ms == 0 {
            return Err(Error::Config("retransmission intervals must be non-zero".into()));
        }
        if let Some(commissioning) = &self.commissioning {
            validate_passcode(commissioning.passcode)
                .map_err(|_| Error::Config("invalid setup passcode".into()))?;
            let salt = commissioning.salt_bytes()?;
            validate_pbkdf_parameters(&salt, commissioning.iterations)
                .map_err(|e| Error::Config(e.to_string()))?;
        }
        Ok(())
    }
}

/// Reliable messaging (MRP) configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MrpConfig {
    /// Retransmission interval towards an idle peer, in milliseconds
    pub idle_retransmission_ms: u64,

    /// Retransmission interval towards an active peer, in milliseconds
    pub active_retransmission_ms: u64,

    /// Retransmissions before an exchange gives up
    pub max_retransmissions: u32,
}

impl Default for MrpConfig {
    fn default() -> Self {
        let defaults = SessionParameters::default();
        Self {
            idle_retransmission_ms: 500,
            active_retransmission_ms: 300,
            max_retransmissions: defaults.retransmission_retries,
        }
    }
}

impl MrpConfig {
    /// Session parameters advertised and used by this node
    #[must_use]
    pub fn session_parameters(&self) -> SessionParameters {
        SessionParameters {
            idle_retransmission_interval: Duration::from_millis(self.idle_retransmission_ms),
            active_retransmission_interval: Duration::from_millis(self.active_retransmission_ms),
            retransmission_retries: self.max_retransmissions,
        }
    }
}

/// Commissioning (PASE responder) configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissioningConfig {
    /// Setup passcode
    pub passcode: u32,

    /// PBKDF2 salt, hex encoded
    pub salt: String,

    /// PBKDF2 iterations
    #[serde(default = "default_iterations")]
    pub iterations: u32,
}

fn default_iterations() -> u32 {
    1000
}

impl CommissioningConfig {
    /// Decoded salt.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the salt is not valid hex.
    pub fn salt_bytes(&self) -> Result<Vec<u8>> {
        hex::decode(&self.salt).map_err(|e| Error::Config(format!("invalid salt: {e}")))
    }
}
