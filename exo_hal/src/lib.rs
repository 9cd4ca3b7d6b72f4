//! # EXO HAL
//!
//! Drive protocol layer for the joint actuator.
//!
//! # Module Structure
//!
//! - [`codec`] - Object-dictionary command strings and gateway replies
//! - [`lifecycle`] - CiA 402 power state machine
//! - [`pdo`] - Fixed PDO mapping table
//! - [`vendor`] - Vendor address maps and sequence quirks
//! - [`drive`] - Per-node `Drive` abstraction
//! - [`transport`] - Gateway, loopback and simulated transports
//! - [`registry`] - Transport factory registry
//!
//! # Data Flow
//!
//! ```text
//! ┌──────────┐  Request   ┌────────────────┐  "[1] 2 write ..."  ┌───────────┐
//! │  Drive   │──────────► │ ObjectDictionary│───────────────────►│ Transport │
//! │          │◄────────── │     Codec       │◄───────────────────│           │
//! └──────────┘   Reply    └────────────────┘   "[7] OK"          └───────────┘
//! ```

pub mod codec;
pub mod drive;
pub mod lifecycle;
pub mod pdo;
pub mod registry;
pub mod transport;
pub mod vendor;

pub use crate::codec::{ObjectDictionaryCodec, Reply, Request, SdoValue};
pub use crate::drive::{Drive, ProcessData};
pub use crate::lifecycle::{ControlCommand, Lifecycle, TransitionResult};
pub use crate::registry::TransportRegistry;
pub use crate::transport::{DriveIdentity, Transport, TransportConfig};
pub use crate::vendor::{AddressMap, DriveProfiles, DriveVendor};
