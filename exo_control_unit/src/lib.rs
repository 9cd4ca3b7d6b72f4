//! # EXO Control Unit Library
//!
//! Single-joint controller for an exoskeleton actuator. One periodic tick
//! refreshes the joint, runs the control law of the current controller mode,
//! publishes telemetry and then applies inbound events.
//!
//! ## Structure
//!
//! 1. **Activation** - outer Idle → Active → Exited lifecycle ([`state::activation`])
//! 2. **Mode selector** - edge-triggered controller mode ([`state::mode`])
//! 3. **Control laws** - calibration, follow modes, torque tracking
//!    ([`calibration`], [`control`])
//! 4. **Joint** - [`joint::RobotJoint`] over an `exo_hal` drive
//!
//! Drive write failures inside a tick are logged and retried on the next
//! tick; only initialisation failures are fatal.

pub mod calibration;
pub mod config;
pub mod control;
pub mod controller;
pub mod cycle;
pub mod joint;
pub mod state;
pub mod telemetry;

pub use crate::config::{ExoConfig, load_config, load_config_from_str};
pub use crate::controller::{ControllerSettings, JointController};
pub use crate::cycle::{CycleError, CycleRunner, CycleStats};
pub use crate::joint::{DriveJoint, RobotJoint};
