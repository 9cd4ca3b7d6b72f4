//! System-wide constants for the EXO workspace.
//!
//! Single source of truth for default rates, addresses and thresholds.

/// Default control cycle time in microseconds (800 Hz).
pub const CYCLE_TIME_US: u32 = 1250;

/// Cycle time bounds accepted by configuration validation.
pub const CYCLE_TIME_US_MIN: u32 = 250;
pub const CYCLE_TIME_US_MAX: u32 = 20_000;

/// Nominal control frequency used by the PID derivative and integral [Hz].
pub const NOMINAL_CONTROL_FREQUENCY_HZ: f64 = 800.0;

/// Default low-pass cutoff for position and interaction torque [Hz].
pub const FILTER_CUTOFF_HZ: f64 = 6.0;

/// Default integral reset period of the virtual-spring law [s].
pub const SPRING_INTEGRAL_RESET_SECS: f64 = 60.0;

/// Default fieldbus (gateway) bus identifier.
pub const DEFAULT_BUS: u8 = 1;

/// Highest valid CANopen node id.
pub const MAX_NODE_ID: u8 = 127;

/// Diagnostic trigger register (vendor digital output word).
pub const TRIGGER_ADDRESS: u16 = 0x2010;
pub const TRIGGER_SUBINDEX: u8 = 14;

/// Interaction torque sensor object (vendor analog input).
pub const INTERACTION_SENSOR_ADDRESS: u16 = 0x2205;
pub const INTERACTION_SENSOR_SUBINDEX: u8 = 0x01;

/// Axis about which the published joint position is mirrored.
pub const DISPLAY_FLIP_AXIS: f64 = 1.6;

/// Inbound events drained per tick at most.
pub const MAX_EVENTS_PER_TICK: usize = 16;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/exo/exo.toml";
