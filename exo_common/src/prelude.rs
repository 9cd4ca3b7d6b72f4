//! Prelude module for common re-exports.
//!
//! ```rust
//! use exo_common::prelude::*;
//! ```

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, LogLevel, SharedConfig};

// ─── Drive ──────────────────────────────────────────────────────────
pub use crate::drive::{
    ControlMode, ControlWord, DataType, DriveError, DriveState, MotorProfile, Register,
};

// ─── Control ────────────────────────────────────────────────────────
pub use crate::control::{
    ControllerMode, ExternalEvent, InteractionTorqueCommand, InteractionWrenchMessage,
    JointCommand, JointStateMessage, ParameterSnapshot,
};
