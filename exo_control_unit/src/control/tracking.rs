//! Torque-tracking laws (virtual spring, transparency).
//!
//! Both laws feed the same PID; they differ only in the desired interaction
//! torque and in the integral reset period.

use exo_common::control::ControllerMode;

/// Torque-tracking law selected by the controller mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingLaw {
    /// Desired interaction torque is the negated external command.
    VirtualSpring,
    /// Desired interaction torque is zero.
    Transparency,
}

impl TrackingLaw {
    pub const fn for_mode(mode: ControllerMode) -> Option<Self> {
        match mode {
            ControllerMode::VirtualSpring => Some(Self::VirtualSpring),
            ControllerMode::Transparency => Some(Self::Transparency),
            _ => None,
        }
    }

    /// Spring reference torque for an interaction command on channel 0.
    #[inline]
    pub fn spring_torque(self, interaction_command: f64) -> f64 {
        match self {
            Self::VirtualSpring => -interaction_command,
            Self::Transparency => 0.0,
        }
    }

    /// Tracking error from the filtered sensor torque and the spring reference.
    #[inline]
    pub fn error(self, sensor_torque: f64, spring_torque: f64) -> f64 {
        match self {
            Self::VirtualSpring => sensor_torque + spring_torque,
            Self::Transparency => sensor_torque,
        }
    }

    /// Integral reset period [s].
    #[inline]
    pub fn reset_period_secs(self, spring_period_secs: f64, transparency_period_secs: f64) -> f64 {
        match self {
            Self::VirtualSpring => spring_period_secs,
            Self::Transparency => transparency_period_secs,
        }
    }
}
