//! TOML configuration of the joint controller.
//!
//! One file, one [`ExoConfig`]. Every section except `[shared]` has defaults;
//! [`ExoConfig::validate`] checks ranges before any drive is touched.
//!
//! ```toml
//! [shared]
//! service_name = "exo-m1"
//!
//! [drive]
//! node_id = 1
//! vendor = "kinco"
//!
//! [transport]
//! kind = "gateway"
//! ```

use std::path::Path;

use serde::Deserialize;

use exo_common::config::{ConfigError, ConfigLoader, SharedConfig};
use exo_common::consts::{
    CYCLE_TIME_US, CYCLE_TIME_US_MAX, CYCLE_TIME_US_MIN, DEFAULT_BUS, DISPLAY_FLIP_AXIS,
    FILTER_CUTOFF_HZ, INTERACTION_SENSOR_ADDRESS, INTERACTION_SENSOR_SUBINDEX, MAX_EVENTS_PER_TICK,
    MAX_NODE_ID, NOMINAL_CONTROL_FREQUENCY_HZ, SPRING_INTEGRAL_RESET_SECS, TRIGGER_ADDRESS,
    TRIGGER_SUBINDEX,
};
use exo_hal::{DriveIdentity, DriveProfiles, DriveVendor, TransportConfig};

// ─── Sections ───────────────────────────────────────────────────────

/// `[control]` - loop timing and control-law constants.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Tick period [µs].
    pub cycle_time_us: u32,
    /// Frequency used by the PID derivative and integral [Hz].
    pub nominal_frequency_hz: f64,
    /// Low-pass cutoff for position and interaction torque [Hz].
    pub filter_cutoff_hz: f64,
    /// Virtual-spring integral reset period [s].
    pub spring_integral_reset_secs: f64,
    /// Inbound events handled per tick at most.
    pub max_events_per_tick: usize,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            cycle_time_us: CYCLE_TIME_US,
            nominal_frequency_hz: NOMINAL_CONTROL_FREQUENCY_HZ,
            filter_cutoff_hz: FILTER_CUTOFF_HZ,
            spring_integral_reset_secs: SPRING_INTEGRAL_RESET_SECS,
            max_events_per_tick: MAX_EVENTS_PER_TICK,
        }
    }
}

/// `[drive]` - which drive to talk to and its motion profiles.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    pub bus: u8,
    pub node_id: u8,
    pub vendor: DriveVendor,
    pub profiles: DriveProfiles,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            bus: DEFAULT_BUS,
            node_id: 1,
            vendor: DriveVendor::Standard,
            profiles: DriveProfiles::default(),
        }
    }
}

impl DriveConfig {
    pub fn identity(&self) -> DriveIdentity {
        DriveIdentity {
            bus: self.bus,
            node_id: self.node_id,
            vendor: self.vendor,
        }
    }
}

/// `[joint]` - unit conversion and the interaction sensor object.
///
/// Joint units are degrees, degrees per second and newton-metres.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct JointConfig {
    pub name: String,
    /// Encoder counts per degree.
    pub position_scale: f64,
    /// Velocity counts per degree per second.
    pub velocity_scale: f64,
    /// Torque counts per Nm, for both target and actual torque.
    pub torque_scale: f64,
    /// Sensor counts per Nm.
    pub sensor_scale: f64,
    pub sensor_address: u16,
    pub sensor_subindex: u8,
    /// Axis about which the published position is mirrored when `flip` is set.
    pub flip_axis: f64,
}

impl Default for JointConfig {
    fn default() -> Self {
        Self {
            name: "M1_joint".to_string(),
            position_scale: 100.0,
            velocity_scale: 100.0,
            torque_scale: 100.0,
            sensor_scale: 100.0,
            sensor_address: INTERACTION_SENSOR_ADDRESS,
            sensor_subindex: INTERACTION_SENSOR_SUBINDEX,
            flip_axis: DISPLAY_FLIP_AXIS,
        }
    }
}

/// `[calibration]` - homing against the hard stop.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Homing velocity [deg/s]; must point towards the stop.
    pub velocity: f64,
    /// Contact is declared once |velocity| drops to this [deg/s].
    pub velocity_threshold: f64,
    /// ... and the sensor reads at least this [Nm].
    pub contact_torque: f64,
    /// Position held while zeroing the sensor [deg].
    pub reference_position: f64,
    /// Half-width of the sensor dead-band [Nm].
    pub sensor_deadband: f64,
    /// Joint position of the hard stop [deg].
    pub hard_stop_position: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            velocity: -30.0,
            velocity_threshold: 2.0,
            contact_torque: 2.0,
            reference_position: 16.0,
            sensor_deadband: 0.2,
            hard_stop_position: 0.0,
        }
    }
}

/// `[trigger]` - diagnostic digital output.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    /// Node owning the output; usually the joint drive.
    pub node_id: u8,
    pub address: u16,
    pub subindex: u8,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            node_id: 1,
            address: TRIGGER_ADDRESS,
            subindex: TRIGGER_SUBINDEX,
        }
    }
}

// ─── Root ───────────────────────────────────────────────────────────

/// Complete controller configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ExoConfig {
    pub shared: SharedConfig,
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub drive: DriveConfig,
    #[serde(default)]
    pub joint: JointConfig,
    #[serde(default)]
    pub calibration: CalibrationConfig,
    #[serde(default)]
    pub trigger: TriggerConfig,
    #[serde(default)]
    pub transport: TransportConfig,
}

impl ExoConfig {
    /// Range-check every section.
    ///
    /// # Errors
    /// `ConfigError::ValidationError` naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;

        let c = &self.control;
        if !(CYCLE_TIME_US_MIN..=CYCLE_TIME_US_MAX).contains(&c.cycle_time_us) {
            return Err(invalid(format!(
                "control.cycle_time_us {} outside {CYCLE_TIME_US_MIN}..={CYCLE_TIME_US_MAX}",
                c.cycle_time_us
            )));
        }
        positive("control.nominal_frequency_hz", c.nominal_frequency_hz)?;
        positive("control.filter_cutoff_hz", c.filter_cutoff_hz)?;
        positive("control.spring_integral_reset_secs", c.spring_integral_reset_secs)?;
        if c.max_events_per_tick == 0 {
            return Err(invalid("control.max_events_per_tick must be at least 1".into()));
        }

        node_id("drive.node_id", self.drive.node_id)?;
        node_id("trigger.node_id", self.trigger.node_id)?;

        let j = &self.joint;
        if j.name.trim().is_empty() {
            return Err(invalid("joint.name cannot be empty".into()));
        }
        nonzero("joint.position_scale", j.position_scale)?;
        nonzero("joint.velocity_scale", j.velocity_scale)?;
        nonzero("joint.torque_scale", j.torque_scale)?;
        nonzero("joint.sensor_scale", j.sensor_scale)?;

        let cal = &self.calibration;
        if !cal.velocity.is_finite() || cal.velocity == 0.0 {
            return Err(invalid("calibration.velocity must be non-zero".into()));
        }
        positive("calibration.velocity_threshold", cal.velocity_threshold)?;
        positive("calibration.contact_torque", cal.contact_torque)?;
        positive("calibration.sensor_deadband", cal.sensor_deadband)?;

        if self.transport.kind.trim().is_empty() {
            return Err(invalid("transport.kind cannot be empty".into()));
        }
        if self.transport.timeout_ms == 0 {
            return Err(invalid("transport.timeout_ms must be at least 1".into()));
        }
        Ok(())
    }

    /// Tick period.
    pub fn cycle_time(&self) -> std::time::Duration {
        std::time::Duration::from_micros(u64::from(self.control.cycle_time_us))
    }
}

fn invalid(message: String) -> ConfigError {
    ConfigError::ValidationError(message)
}

fn positive(field: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(format!("{field} must be positive, got {value}")))
    }
}

fn nonzero(field: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value != 0.0 {
        Ok(())
    } else {
        Err(invalid(format!("{field} must be non-zero, got {value}")))
    }
}

fn node_id(field: &str, value: u8) -> Result<(), ConfigError> {
    if (1..=MAX_NODE_ID).contains(&value) {
        Ok(())
    } else {
        Err(invalid(format!("{field} {value} outside 1..={MAX_NODE_ID}")))
    }
}

// ─── Loading Functions ──────────────────────────────────────────────

/// Load and validate the configuration file.
pub fn load_config(path: &Path) -> Result<ExoConfig, ConfigError> {
    let config = ExoConfig::load(path)?;
    config.validate()?;
    Ok(config)
}

/// Load config from a TOML string (for testing).
pub fn load_config_from_str(content: &str) -> Result<ExoConfig, ConfigError> {
    let config = ExoConfig::from_toml_str(content)?;
    config.validate()?;
    Ok(config)
}
