//! Drive-side shared types.
//!
//! Register catalogue with CiA 402 default addresses, object datatypes,
//! the drive lifecycle and control-mode enums, control/status word bits,
//! motion profiles and the [`DriveError`] type used across the workspace.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ─── Registers ──────────────────────────────────────────────────────

/// Logical register names resolved to object-dictionary addresses by a drive's address map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Register {
    StatusWord,
    ControlWord,
    ModesOfOperation,
    ActualPos,
    ActualVel,
    ActualTor,
    TargetPos,
    TargetVel,
    TargetTor,
    ProfileVelocity,
    ProfileAcceleration,
    ProfileDeceleration,
}

impl Register {
    /// Every register, in address-map order.
    pub const ALL: [Register; 12] = [
        Self::StatusWord,
        Self::ControlWord,
        Self::ModesOfOperation,
        Self::ActualPos,
        Self::ActualVel,
        Self::ActualTor,
        Self::TargetPos,
        Self::TargetVel,
        Self::TargetTor,
        Self::ProfileVelocity,
        Self::ProfileAcceleration,
        Self::ProfileDeceleration,
    ];

    /// CiA 402 standard object index.
    pub const fn default_address(self) -> u16 {
        match self {
            Self::StatusWord => 0x6041,
            Self::ControlWord => 0x6040,
            Self::ModesOfOperation => 0x6060,
            Self::ActualPos => 0x6064,
            Self::ActualVel => 0x606C,
            Self::ActualTor => 0x6077,
            Self::TargetPos => 0x607A,
            Self::TargetVel => 0x60FF,
            Self::TargetTor => 0x6071,
            Self::ProfileVelocity => 0x6081,
            Self::ProfileAcceleration => 0x6083,
            Self::ProfileDeceleration => 0x6084,
        }
    }

    /// Object datatype as written on the wire.
    pub const fn data_type(self) -> DataType {
        match self {
            Self::StatusWord | Self::ControlWord => DataType::U16,
            Self::ModesOfOperation => DataType::I8,
            Self::ActualTor | Self::TargetTor => DataType::I16,
            Self::ActualPos
            | Self::ActualVel
            | Self::TargetPos
            | Self::TargetVel
            | Self::ProfileVelocity
            | Self::ProfileAcceleration
            | Self::ProfileDeceleration => DataType::I32,
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::StatusWord => "STATUS_WORD",
            Self::ControlWord => "CONTROL_WORD",
            Self::ModesOfOperation => "MODES_OF_OPERATION",
            Self::ActualPos => "ACTUAL_POS",
            Self::ActualVel => "ACTUAL_VEL",
            Self::ActualTor => "ACTUAL_TOR",
            Self::TargetPos => "TARGET_POS",
            Self::TargetVel => "TARGET_VEL",
            Self::TargetTor => "TARGET_TOR",
            Self::ProfileVelocity => "PROFILE_VELOCITY",
            Self::ProfileAcceleration => "PROFILE_ACCELERATION",
            Self::ProfileDeceleration => "PROFILE_DECELERATION",
        };
        f.write_str(name)
    }
}

/// Object datatypes understood by the fieldbus gateway.
///
/// `U32` only appears in PDO communication and mapping objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    U8,
    U16,
    U32,
    I8,
    I16,
    I32,
}

impl DataType {
    /// Size in bits, as used in PDO mapping entries.
    pub const fn bit_length(self) -> u8 {
        match self {
            Self::U8 | Self::I8 => 8,
            Self::U16 | Self::I16 => 16,
            Self::U32 | Self::I32 => 32,
        }
    }

    /// Wire token (`u8`, `i16`, ...).
    pub const fn token(self) -> &'static str {
        match self {
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::I32 => "i32",
        }
    }

    /// Parse a wire token.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "u8" => Some(Self::U8),
            "u16" => Some(Self::U16),
            "u32" => Some(Self::U32),
            "i8" => Some(Self::I8),
            "i16" => Some(Self::I16),
            "i32" => Some(Self::I32),
            _ => None,
        }
    }

    /// Reinterpret a raw register value with this type's width and sign.
    pub const fn normalize(self, raw: i64) -> i64 {
        match self {
            Self::U8 => raw as u8 as i64,
            Self::U16 => raw as u16 as i64,
            Self::U32 => raw as u32 as i64,
            Self::I8 => raw as i8 as i64,
            Self::I16 => raw as i16 as i64,
            Self::I32 => raw as i32 as i64,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

// ─── Lifecycle ──────────────────────────────────────────────────────

/// CiA 402 power state machine state.
///
/// Motion targets are only written in `OperationEnabled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum DriveState {
    #[default]
    NotReadyToSwitchOn = 0,
    SwitchOnDisabled = 1,
    ReadyToSwitchOn = 2,
    SwitchedOn = 3,
    OperationEnabled = 4,
    QuickStopActive = 5,
    FaultReactionActive = 6,
    Fault = 7,
}

impl DriveState {
    /// Decode the state bits of a status word (0x6041).
    pub const fn from_status_word(word: u16) -> Self {
        if word & 0x004F == 0x0000 {
            Self::NotReadyToSwitchOn
        } else if word & 0x004F == 0x0040 {
            Self::SwitchOnDisabled
        } else if word & 0x006F == 0x0021 {
            Self::ReadyToSwitchOn
        } else if word & 0x006F == 0x0023 {
            Self::SwitchedOn
        } else if word & 0x006F == 0x0027 {
            Self::OperationEnabled
        } else if word & 0x006F == 0x0007 {
            Self::QuickStopActive
        } else if word & 0x004F == 0x000F {
            Self::FaultReactionActive
        } else if word & 0x004F == 0x0008 {
            Self::Fault
        } else {
            // Reserved bit combinations are reported as not ready.
            Self::NotReadyToSwitchOn
        }
    }

    /// Canonical status word bits for this state.
    pub const fn status_bits(self) -> u16 {
        match self {
            Self::NotReadyToSwitchOn => 0x0000,
            Self::SwitchOnDisabled => 0x0040,
            Self::ReadyToSwitchOn => 0x0021,
            Self::SwitchedOn => 0x0023,
            Self::OperationEnabled => 0x0027,
            Self::QuickStopActive => 0x0007,
            Self::FaultReactionActive => 0x000F,
            Self::Fault => 0x0008,
        }
    }

    #[inline]
    pub const fn is_fault(self) -> bool {
        matches!(self, Self::Fault | Self::FaultReactionActive)
    }
}

bitflags! {
    /// Control word (0x6040) bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ControlWord: u16 {
        const SWITCH_ON        = 0x0001;
        const ENABLE_VOLTAGE   = 0x0002;
        const QUICK_STOP       = 0x0004;
        const ENABLE_OPERATION = 0x0008;
        /// Profile position: new set-point.
        const NEW_SET_POINT    = 0x0010;
        /// Profile position: change set immediately.
        const CHANGE_SET_IMMEDIATELY = 0x0020;
        const FAULT_RESET      = 0x0080;
        const HALT             = 0x0100;
        /// Manufacturer-specific bit 12 (Kinco: instant position mode).
        const VENDOR_BIT_12    = 0x1000;
    }
}

impl ControlWord {
    /// Shutdown (→ ReadyToSwitchOn).
    pub const SHUTDOWN: Self = Self::from_bits_truncate(0x0006);
    /// Enable operation (→ OperationEnabled).
    pub const ENABLE: Self = Self::from_bits_truncate(0x000F);
    /// Disable voltage (→ SwitchOnDisabled).
    pub const DISABLE_VOLTAGE: Self = Self::empty();
    /// Fault reset (Fault → SwitchOnDisabled).
    pub const RESET_FAULT: Self = Self::FAULT_RESET;
}

// ─── Control Mode ───────────────────────────────────────────────────

/// Control mode the drive's object dictionary is configured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ControlMode {
    #[default]
    None,
    Position,
    Velocity,
    Torque,
}

impl ControlMode {
    /// Value of the modes-of-operation object (0x6060) for this mode.
    pub const fn mode_of_operation(self) -> Option<i8> {
        match self {
            Self::None => None,
            Self::Position => Some(1),
            Self::Velocity => Some(3),
            Self::Torque => Some(4),
        }
    }

    /// Target register written in this mode.
    pub const fn target_register(self) -> Option<Register> {
        match self {
            Self::None => None,
            Self::Position => Some(Register::TargetPos),
            Self::Velocity => Some(Register::TargetVel),
            Self::Torque => Some(Register::TargetTor),
        }
    }
}

/// Profile values written during mode initialization [drive units].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotorProfile {
    pub velocity: i32,
    pub acceleration: i32,
    pub deceleration: i32,
}

impl Default for MotorProfile {
    fn default() -> Self {
        Self {
            velocity: 4_000_000,
            acceleration: 240_000,
            deceleration: 240_000,
        }
    }
}

// ─── Errors ─────────────────────────────────────────────────────────

/// Error types for drive protocol operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DriveError {
    /// The transport could not deliver the command.
    #[error("Transport failure: {0}")]
    Transport(String),

    /// The gateway answered with an abort code.
    #[error("Command rejected by gateway (abort 0x{code:08x}): {command}")]
    Rejected { command: String, code: u32 },

    /// No reply within the transport timeout.
    #[error("Timed out waiting for reply to: {0}")]
    Timeout(String),

    /// Reply could not be parsed.
    #[error("Malformed reply: {0}")]
    MalformedReply(String),

    /// A motion target was written outside `OperationEnabled`.
    #[error("Drive not operational (state {0:?})")]
    NotOperational(DriveState),

    /// A target was written for a mode the drive is not configured for.
    #[error("Control mode mismatch: drive configured for {configured:?}, command needs {requested:?}")]
    ModeMismatch {
        configured: ControlMode,
        requested: ControlMode,
    },

    /// A PDO mapping step failed.
    #[error("PDO configuration failed at step '{step}' on node {node_id}")]
    PdoConfig { step: &'static str, node_id: u8 },

    /// Transport name not registered.
    #[error("Transport not found: {0}")]
    TransportNotFound(String),
}
