//! Command transports.
//!
//! A transport carries one command line to the fieldbus gateway and returns
//! its reply line. Implementations:
//!
//! - [`gateway`] - TCP connection to a gateway process
//! - [`loopback`] - records commands, injects failures (test double)
//! - [`simulation`] - in-process emulated drive

pub mod gateway;
pub mod loopback;
pub mod simulation;

use exo_common::consts::DEFAULT_BUS;
use exo_common::drive::DriveError;
use serde::{Deserialize, Serialize};

use crate::vendor::DriveVendor;

pub use gateway::GatewayTransport;
pub use loopback::{CommandLog, LoopbackTransport};
pub use simulation::{SimulatedGateway, SimulationConfig};

/// Line-oriented command channel to a drive.
pub trait Transport: Send {
    /// Identifier used in logs ("gateway", "loopback", ...).
    fn name(&self) -> &'static str;

    /// Deliver one command line and return the raw reply line.
    ///
    /// # Errors
    /// `DriveError::Transport` or `DriveError::Timeout` when no reply was obtained.
    fn send(&mut self, line: &str) -> Result<String, DriveError>;

    /// Bus cycle boundary. Called once per tick before process data is read.
    fn sync(&mut self) -> Result<(), DriveError> {
        Ok(())
    }
}

/// Which drive a transport talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriveIdentity {
    pub bus: u8,
    pub node_id: u8,
    pub vendor: DriveVendor,
}

impl Default for DriveIdentity {
    fn default() -> Self {
        Self {
            bus: DEFAULT_BUS,
            node_id: 1,
            vendor: DriveVendor::Standard,
        }
    }
}

/// `[transport]` configuration section.
///
/// ```toml
/// [transport]
/// kind = "gateway"
/// gateway_address = "127.0.0.1:5555"
/// timeout_ms = 20
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Registered transport name.
    pub kind: String,
    /// `host:port` of the gateway process.
    pub gateway_address: String,
    /// Per-command reply timeout.
    pub timeout_ms: u64,
    pub simulation: SimulationConfig,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: "simulation".to_string(),
            gateway_address: "127.0.0.1:5555".to_string(),
            timeout_ms: 20,
            simulation: SimulationConfig::default(),
        }
    }
}

impl TransportConfig {
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_ms)
    }
}
