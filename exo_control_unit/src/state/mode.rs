//! Inner controller mode selector.
//!
//! Edge-triggered: a parameter update carrying the current mode is a no-op.
//! A different mode yields a [`ModeSwitch`] whose [`ModeEntry`] lists the
//! entry actions the controller must perform.
//!
//! | Mode | Drive control | Trigger | Extra |
//! |------|---------------|---------|-------|
//! | 0 calibration | velocity | 0 | restart calibration at stage 1 |
//! | 1 zero torque | torque | 0 | |
//! | 2 position follow | position | 0 | |
//! | 3 torque follow | torque | 0 | |
//! | 4 virtual spring | torque | 1 | reset PID |
//! | 5 transparency | torque | 0 | reset PID |

use exo_common::control::ControllerMode;
use exo_common::drive::ControlMode;

/// Entry actions for a mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeEntry {
    /// Drive control mode to initialise, `None` to leave the drive as is.
    pub drive_mode: Option<ControlMode>,
    /// Value written to the diagnostic trigger.
    pub trigger: bool,
    pub start_calibration: bool,
    pub reset_pid: bool,
}

impl ModeEntry {
    pub const fn for_mode(mode: ControllerMode) -> Self {
        let drive_mode = match mode {
            ControllerMode::Uninitialized => None,
            ControllerMode::Calibration => Some(ControlMode::Velocity),
            ControllerMode::PositionFollow => Some(ControlMode::Position),
            ControllerMode::ZeroTorque
            | ControllerMode::TorqueFollow
            | ControllerMode::VirtualSpring
            | ControllerMode::Transparency => Some(ControlMode::Torque),
        };
        Self {
            drive_mode,
            trigger: matches!(mode, ControllerMode::VirtualSpring),
            start_calibration: matches!(mode, ControllerMode::Calibration),
            reset_pid: mode.is_torque_tracking(),
        }
    }
}

/// A mode change produced by [`ModeSelector::select`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeSwitch {
    pub from: ControllerMode,
    pub to: ControllerMode,
    pub entry: ModeEntry,
}

#[derive(Debug, Clone, Default)]
pub struct ModeSelector {
    mode: ControllerMode,
}

impl ModeSelector {
    pub const fn new() -> Self {
        Self {
            mode: ControllerMode::Uninitialized,
        }
    }

    #[inline]
    pub const fn mode(&self) -> ControllerMode {
        self.mode
    }

    /// Select `requested`; `Some` only when it differs from the current mode.
    pub fn select(&mut self, requested: ControllerMode) -> Option<ModeSwitch> {
        if requested == self.mode {
            return None;
        }
        let from = self.mode;
        self.mode = requested;
        Some(ModeSwitch {
            from,
            to: requested,
            entry: ModeEntry::for_mode(requested),
        })
    }

    /// Force the selector back to uninitialised without entry actions.
    #[inline]
    pub fn reset(&mut self) {
        self.mode = ControllerMode::Uninitialized;
    }
}
