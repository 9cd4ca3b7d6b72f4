//! Homing calibration against the mechanical hard stop (controller mode 0).
//!
//! 1. **Homing** - drive at the calibration velocity until the joint stalls
//!    (`|v| ≤ threshold`) with contact torque on the sensor. Then zero the
//!    velocity, take the hard stop as position reference and switch the
//!    drive to position control.
//! 2. **Settling** - command the reference position; if the sensor reads
//!    outside its dead-band, take that reading as the new zero. One tick.
//! 3. **Done** - nothing more per tick.
//!
//! Stages only move forward. Only re-entering mode 0 restarts the sequence.

use tracing::{debug, info, warn};

use crate::config::CalibrationConfig;
use crate::joint::RobotJoint;

/// Calibration stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CalibrationStage {
    Homing = 1,
    Settling = 2,
    Done = 3,
}

#[derive(Debug, Clone)]
pub struct CalibrationSequence {
    config: CalibrationConfig,
    stage: CalibrationStage,
    velocity: f64,
}

impl CalibrationSequence {
    /// A sequence that has not been started; [`Self::restart`] arms it.
    pub fn new(config: CalibrationConfig) -> Self {
        Self {
            config,
            stage: CalibrationStage::Done,
            velocity: 0.0,
        }
    }

    /// Arm stage 1 with the configured calibration velocity.
    pub fn restart(&mut self) {
        self.stage = CalibrationStage::Homing;
        self.velocity = self.config.velocity;
        info!(velocity = self.velocity, "Calibration started");
    }

    #[inline]
    pub fn stage(&self) -> CalibrationStage {
        self.stage
    }

    /// Velocity currently commanded by the sequence [deg/s].
    #[inline]
    pub fn commanded_velocity(&self) -> f64 {
        self.velocity
    }

    /// Run one tick against fresh joint readings. Returns the stage afterwards.
    pub fn step(&mut self, joint: &mut dyn RobotJoint) -> CalibrationStage {
        match self.stage {
            CalibrationStage::Homing => self.home(joint),
            CalibrationStage::Settling => self.settle(joint),
            CalibrationStage::Done => {}
        }
        self.stage
    }

    fn home(&mut self, joint: &mut dyn RobotJoint) {
        if let Err(e) = joint.set_velocity(self.velocity) {
            warn!(error = %e, "Calibration velocity write failed");
        }

        let velocity = joint.velocity();
        let sensor = joint.interaction_torque();
        let stalled = velocity.abs() <= self.config.velocity_threshold;
        if !(stalled && sensor >= self.config.contact_torque) {
            debug!(
                position = joint.position(),
                velocity,
                sensor,
                "Homing towards hard stop"
            );
            return;
        }

        self.velocity = 0.0;
        if let Err(e) = joint.set_velocity(self.velocity) {
            warn!(error = %e, "Calibration velocity write failed");
        }
        joint.apply_calibration();
        if let Err(e) = joint.init_position_control() {
            warn!(error = %e, "Position control initialisation failed during calibration");
        }
        self.stage = CalibrationStage::Settling;
        info!(velocity, sensor, "Hard stop reached");
    }

    fn settle(&mut self, joint: &mut dyn RobotJoint) {
        if let Err(e) = joint.set_position(self.config.reference_position) {
            warn!(error = %e, "Calibration position write failed");
        }

        let sensor = joint.interaction_torque();
        let band = self.config.sensor_deadband;
        if sensor > band || sensor < -band {
            joint.zero_interaction_sensor();
        }
        self.stage = CalibrationStage::Done;
        info!(position = joint.position(), sensor, "Calibration done");
    }
}
