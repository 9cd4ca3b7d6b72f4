//! Control law root.
//!
//! Low-pass filtering and the discrete PID shared by the torque-tracking
//! modes, plus the per-mode error definitions.

pub mod filters;
pub mod pid;
pub mod tracking;
