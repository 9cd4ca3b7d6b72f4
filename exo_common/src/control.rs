//! Control-side shared types.
//!
//! Controller mode selector values, the tunable parameter snapshot delivered
//! by the parameter channel, and the command/telemetry bus messages.

use serde::{Deserialize, Serialize};

// ─── Controller Mode ────────────────────────────────────────────────

/// Control law selected by the parameter channel.
///
/// Raw values on the channel are `-1` (uninitialized) and `0..=5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
#[repr(i8)]
pub enum ControllerMode {
    #[default]
    Uninitialized = -1,
    /// Homing against the mechanical hard stop, then sensor zeroing.
    Calibration = 0,
    ZeroTorque = 1,
    PositionFollow = 2,
    TorqueFollow = 3,
    VirtualSpring = 4,
    Transparency = 5,
}

impl ControllerMode {
    /// Convert from the raw channel value. Returns `None` for unknown values.
    pub const fn from_raw(value: i32) -> Option<Self> {
        match value {
            -1 => Some(Self::Uninitialized),
            0 => Some(Self::Calibration),
            1 => Some(Self::ZeroTorque),
            2 => Some(Self::PositionFollow),
            3 => Some(Self::TorqueFollow),
            4 => Some(Self::VirtualSpring),
            5 => Some(Self::Transparency),
            _ => None,
        }
    }

    #[inline]
    pub const fn raw(self) -> i32 {
        self as i8 as i32
    }

    /// Modes 4 and 5 share the interaction-torque PID pipeline.
    #[inline]
    pub const fn is_torque_tracking(self) -> bool {
        matches!(self, Self::VirtualSpring | Self::Transparency)
    }
}

impl TryFrom<i32> for ControllerMode {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Self::from_raw(value).ok_or_else(|| format!("unknown controller mode {value}"))
    }
}

impl From<ControllerMode> for i32 {
    fn from(mode: ControllerMode) -> Self {
        mode.raw()
    }
}

// ─── Parameter Snapshot ─────────────────────────────────────────────

/// Complete set of tunable parameters.
///
/// Always replaced as a whole; the control law never sees a partial update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterSnapshot {
    pub kp: f64,
    pub kd: f64,
    pub ki: f64,
    /// Share of measured sensor torque added to the commanded torque.
    pub ff_ratio: f64,
    /// Virtual spring stiffness gain.
    pub spring_stiffness: f64,
    /// Transparency integral reset period [s].
    pub integral_reset_secs: f64,
    /// Mirror the displayed joint position about the flip axis.
    pub flip: bool,
    pub controller_mode: ControllerMode,
}

impl Default for ParameterSnapshot {
    fn default() -> Self {
        Self {
            kp: 0.0,
            kd: 0.0,
            ki: 0.0,
            ff_ratio: 0.0,
            spring_stiffness: 0.0,
            integral_reset_secs: 60.0,
            flip: false,
            controller_mode: ControllerMode::Uninitialized,
        }
    }
}

// ─── Bus Messages ───────────────────────────────────────────────────

/// Inbound joint command (one entry per actuated joint; single joint here).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct JointCommand {
    pub position: f64,
    pub velocity: f64,
    pub effort: f64,
}

/// Inbound interaction-torque command, one scalar per interaction channel.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InteractionTorqueCommand {
    pub data: Vec<f64>,
}

/// Event delivered to the control loop between ticks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExternalEvent {
    JointCommand(JointCommand),
    InteractionTorque(InteractionTorqueCommand),
    Parameters(ParameterSnapshot),
}

/// Outbound joint state, published once per tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointStateMessage {
    pub name: String,
    pub position: f64,
    pub velocity: f64,
    pub effort: f64,
}

impl JointStateMessage {
    /// Build the message, mirroring the position about `flip_axis` when given.
    pub fn new(
        name: &str,
        position: f64,
        velocity: f64,
        effort: f64,
        flip_axis: Option<f64>,
    ) -> Self {
        Self {
            name: name.to_string(),
            position: match flip_axis {
                Some(axis) => axis - position,
                None => position,
            },
            velocity,
            effort,
        }
    }
}

/// Outbound interaction wrench, published once per tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionWrenchMessage {
    pub frame_id: String,
    /// Negated virtual-spring reference torque.
    pub torque_y: f64,
    /// Measured interaction sensor torque.
    pub torque_z: f64,
}

impl InteractionWrenchMessage {
    pub const FRAME_ID: &'static str = "interaction_torque_sensor";

    pub fn new(spring_torque: f64, sensor_torque: f64) -> Self {
        Self {
            frame_id: Self::FRAME_ID.to_string(),
            torque_y: -spring_torque,
            torque_z: sensor_torque,
        }
    }
}
