//! Robot joint abstraction.
//!
//! [`RobotJoint`] is what the control laws see: joint-unit state, control
//! mode initialisation, targets, filtering and calibration. [`DriveJoint`]
//! implements it over a [`Drive`] and its [`Transport`].
//!
//! Joint units are degrees, degrees per second and newton-metres.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use exo_common::drive::{DataType, DriveError};
use exo_hal::{Drive, ObjectDictionaryCodec, SdoValue, Transport};

use crate::config::{ExoConfig, JointConfig, TriggerConfig};
use crate::control::filters::LowPassState;

/// One actuated joint as seen by the controller.
pub trait RobotJoint {
    fn name(&self) -> &str;

    /// Configure the drive (preop, PDO mapping, error reset).
    ///
    /// # Errors
    /// Fatal: the joint must not be driven after a failed initialisation.
    fn initialize(&mut self) -> Result<(), DriveError>;

    /// Read fresh process data and the interaction sensor.
    fn refresh(&mut self) -> Result<(), DriveError>;

    fn init_position_control(&mut self) -> Result<(), DriveError>;
    fn init_velocity_control(&mut self) -> Result<(), DriveError>;
    fn init_torque_control(&mut self) -> Result<(), DriveError>;

    /// Joint position [deg], filtered once [`RobotJoint::filter_position`] ran this tick.
    fn position(&self) -> f64;
    /// Joint velocity [deg/s].
    fn velocity(&self) -> f64;
    /// Motor torque reported by the drive [Nm].
    fn torque(&self) -> f64;
    /// Interaction sensor torque [Nm], zero-offset applied.
    fn interaction_torque(&self) -> f64;

    fn set_position(&mut self, position: f64) -> Result<(), DriveError>;
    fn set_velocity(&mut self, velocity: f64) -> Result<(), DriveError>;
    fn set_torque(&mut self, torque: f64) -> Result<(), DriveError>;

    /// Command `torque + ff_ratio · sensor_torque`.
    fn set_torque_compensated(
        &mut self,
        torque: f64,
        sensor_torque: f64,
        ff_ratio: f64,
    ) -> Result<(), DriveError> {
        self.set_torque(torque + ff_ratio * sensor_torque)
    }

    /// Low-pass the position in place with coefficient `alpha`.
    fn filter_position(&mut self, alpha: f64);
    /// Low-pass the interaction torque in place with coefficient `alpha`.
    fn filter_interaction_torque(&mut self, alpha: f64);

    /// Declare the current position to be the hard-stop reference.
    fn apply_calibration(&mut self);
    /// Take the current sensor reading as its zero offset.
    fn zero_interaction_sensor(&mut self);

    /// Write the diagnostic trigger; returns the round-trip time.
    fn send_trigger(&mut self, value: bool) -> Result<Duration, DriveError>;

    /// Shut the drive down (shutdown, then disable voltage).
    fn disable(&mut self) -> Result<(), DriveError>;
}

// ─── Drive-backed joint ─────────────────────────────────────────────

/// Counts ↔ joint-unit conversion factors.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Scale {
    position: f64,
    velocity: f64,
    torque: f64,
    sensor: f64,
}

impl From<&JointConfig> for Scale {
    fn from(config: &JointConfig) -> Self {
        Self {
            position: config.position_scale,
            velocity: config.velocity_scale,
            torque: config.torque_scale,
            sensor: config.sensor_scale,
        }
    }
}

/// [`RobotJoint`] over one drive.
pub struct DriveJoint {
    name: String,
    drive: Drive,
    transport: Box<dyn Transport>,
    scale: Scale,
    sensor_object: (u16, u8),
    trigger_codec: ObjectDictionaryCodec,
    trigger: TriggerConfig,
    hard_stop_position: f64,
    /// Added to the raw position.
    position_offset: f64,
    /// Subtracted from the raw sensor torque.
    sensor_offset: f64,
    raw_position: f64,
    raw_sensor: f64,
    position: f64,
    velocity: f64,
    torque: f64,
    interaction_torque: f64,
    position_filter: LowPassState,
    sensor_filter: LowPassState,
}

impl DriveJoint {
    pub fn new(config: &ExoConfig, transport: Box<dyn Transport>) -> Self {
        let identity = config.drive.identity();
        Self {
            name: config.joint.name.clone(),
            drive: Drive::new(identity, config.drive.profiles),
            transport,
            scale: Scale::from(&config.joint),
            sensor_object: (config.joint.sensor_address, config.joint.sensor_subindex),
            trigger_codec: ObjectDictionaryCodec::new(identity.bus, config.trigger.node_id),
            trigger: config.trigger.clone(),
            hard_stop_position: config.calibration.hard_stop_position,
            position_offset: 0.0,
            sensor_offset: 0.0,
            raw_position: 0.0,
            raw_sensor: 0.0,
            position: 0.0,
            velocity: 0.0,
            torque: 0.0,
            interaction_torque: 0.0,
            position_filter: LowPassState::default(),
            sensor_filter: LowPassState::default(),
        }
    }

    pub fn drive(&self) -> &Drive {
        &self.drive
    }

    pub fn position_offset(&self) -> f64 {
        self.position_offset
    }

    pub fn sensor_offset(&self) -> f64 {
        self.sensor_offset
    }

    fn to_counts(value: f64, scale: f64) -> i64 {
        (value * scale).round() as i64
    }
}

impl RobotJoint for DriveJoint {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&mut self) -> Result<(), DriveError> {
        self.drive.init(self.transport.as_mut())
    }

    fn refresh(&mut self) -> Result<(), DriveError> {
        let process = self.drive.refresh(self.transport.as_mut())?;
        let (address, subindex) = self.sensor_object;
        let sensor = self
            .drive
            .read_object(self.transport.as_mut(), address, subindex, DataType::I16)?;

        self.raw_position = f64::from(process.position) / self.scale.position;
        self.raw_sensor = sensor as f64 / self.scale.sensor;
        self.position = self.raw_position + self.position_offset;
        self.velocity = f64::from(process.velocity) / self.scale.velocity;
        self.torque = f64::from(process.torque) / self.scale.torque;
        self.interaction_torque = self.raw_sensor - self.sensor_offset;
        Ok(())
    }

    fn init_position_control(&mut self) -> Result<(), DriveError> {
        self.drive.init_position_control(self.transport.as_mut())
    }

    fn init_velocity_control(&mut self) -> Result<(), DriveError> {
        self.drive.init_velocity_control(self.transport.as_mut())
    }

    fn init_torque_control(&mut self) -> Result<(), DriveError> {
        self.drive.init_torque_control(self.transport.as_mut())
    }

    fn position(&self) -> f64 {
        self.position
    }

    fn velocity(&self) -> f64 {
        self.velocity
    }

    fn torque(&self) -> f64 {
        self.torque
    }

    fn interaction_torque(&self) -> f64 {
        self.interaction_torque
    }

    fn set_position(&mut self, position: f64) -> Result<(), DriveError> {
        let counts = Self::to_counts(position - self.position_offset, self.scale.position);
        let counts = counts.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32;
        self.drive.set_target_position(self.transport.as_mut(), counts)
    }

    fn set_velocity(&mut self, velocity: f64) -> Result<(), DriveError> {
        let counts = Self::to_counts(velocity, self.scale.velocity);
        let counts = counts.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32;
        self.drive.set_target_velocity(self.transport.as_mut(), counts)
    }

    fn set_torque(&mut self, torque: f64) -> Result<(), DriveError> {
        let counts = Self::to_counts(torque, self.scale.torque);
        let counts = counts.clamp(i64::from(i16::MIN), i64::from(i16::MAX)) as i16;
        self.drive.set_target_torque(self.transport.as_mut(), counts)
    }

    fn filter_position(&mut self, alpha: f64) {
        self.position = self.position_filter.apply(alpha, self.position);
    }

    fn filter_interaction_torque(&mut self, alpha: f64) {
        self.interaction_torque = self.sensor_filter.apply(alpha, self.interaction_torque);
    }

    fn apply_calibration(&mut self) {
        self.position_offset = self.hard_stop_position - self.raw_position;
        self.position = self.hard_stop_position;
        self.position_filter.reset();
        info!(
            joint = %self.name,
            offset = self.position_offset,
            "Position calibrated against hard stop"
        );
    }

    fn zero_interaction_sensor(&mut self) {
        self.sensor_offset = self.raw_sensor;
        self.interaction_torque = 0.0;
        self.sensor_filter.reset();
        info!(joint = %self.name, offset = self.sensor_offset, "Interaction sensor zeroed");
    }

    fn send_trigger(&mut self, value: bool) -> Result<Duration, DriveError> {
        let request = self.trigger_codec.write_request(
            self.trigger.address,
            self.trigger.subindex,
            DataType::I16,
            SdoValue::Dec(i64::from(value)),
        );
        let start = Instant::now();
        self.drive.send(self.transport.as_mut(), &request)?;
        let elapsed = start.elapsed();
        debug!(
            value,
            rtt_ms = elapsed.as_secs_f64() * 1_000.0,
            "Trigger sent"
        );
        Ok(elapsed)
    }

    fn disable(&mut self) -> Result<(), DriveError> {
        if let Err(e) = self.drive.disable(self.transport.as_mut()) {
            warn!(joint = %self.name, error = %e, "Disable failed");
            return Err(e);
        }
        Ok(())
    }
}


/// In-memory joint recording every command, for unit tests of the control laws.
#[cfg(test)]
pub(crate) mod tests_support {
    use super::*;

    #[derive(Debug, Default)]
    pub struct ScriptedJoint {
        pub position: f64,
        pub velocity: f64,
        pub torque: f64,
        pub sensor: f64,
        pub fail_writes: bool,
        pub position_targets: Vec<f64>,
        pub velocity_targets: Vec<f64>,
        pub torque_targets: Vec<f64>,
        pub triggers: Vec<bool>,
        pub position_inits: usize,
        pub velocity_inits: usize,
        pub torque_inits: usize,
        pub calibrations: usize,
        pub sensor_zeroings: usize,
        pub disables: usize,
        pub alphas: Vec<f64>,
    }

    impl ScriptedJoint {
        fn write(&self) -> Result<(), DriveError> {
            if self.fail_writes {
                Err(DriveError::Timeout("scripted".to_string()))
            } else {
                Ok(())
            }
        }
    }

    impl RobotJoint for ScriptedJoint {
        fn name(&self) -> &str {
            "M1_joint"
        }

        fn initialize(&mut self) -> Result<(), DriveError> {
            self.write()
        }

        fn refresh(&mut self) -> Result<(), DriveError> {
            Ok(())
        }

        fn init_position_control(&mut self) -> Result<(), DriveError> {
            self.position_inits += 1;
            self.write()
        }

        fn init_velocity_control(&mut self) -> Result<(), DriveError> {
            self.velocity_inits += 1;
            self.write()
        }

        fn init_torque_control(&mut self) -> Result<(), DriveError> {
            self.torque_inits += 1;
            self.write()
        }

        fn position(&self) -> f64 {
            self.position
        }

        fn velocity(&self) -> f64 {
            self.velocity
        }

        fn torque(&self) -> f64 {
            self.torque
        }

        fn interaction_torque(&self) -> f64 {
            self.sensor
        }

        fn set_position(&mut self, position: f64) -> Result<(), DriveError> {
            self.position_targets.push(position);
            self.write()
        }

        fn set_velocity(&mut self, velocity: f64) -> Result<(), DriveError> {
            self.velocity_targets.push(velocity);
            self.write()
        }

        fn set_torque(&mut self, torque: f64) -> Result<(), DriveError> {
            self.torque_targets.push(torque);
            self.write()
        }

        fn filter_position(&mut self, alpha: f64) {
            self.alphas.push(alpha);
        }

        fn filter_interaction_torque(&mut self, _alpha: f64) {}

        fn apply_calibration(&mut self) {
            self.calibrations += 1;
        }

        fn zero_interaction_sensor(&mut self) {
            self.sensor_zeroings += 1;
        }

        fn send_trigger(&mut self, value: bool) -> Result<Duration, DriveError> {
            self.triggers.push(value);
            self.write().map(|_| Duration::ZERO)
        }

        fn disable(&mut self) -> Result<(), DriveError> {
            self.disables += 1;
            self.write()
        }
    }
}
