//! CiA 402 drive lifecycle.
//!
//! Control words written by the drive layer are decoded into commands and
//! run through the transition table below. The table is also used by the
//! simulated gateway to produce the status word it reports.
//!
//! ```text
//!  NotReadyToSwitchOn ──init──► SwitchOnDisabled ◄──────────────┐
//!                                 │  ▲                          │
//!                        shutdown │  │ disable voltage          │ fault reset
//!                                 ▼  │                          │
//!                          ReadyToSwitchOn ──enable──┐        Fault
//!                                 │  ▲               │          ▲
//!                       switch on │  │ shutdown      │          │ reaction done
//!                                 ▼  │               ▼          │
//!                             SwitchedOn ◄──► OperationEnabled  FaultReactionActive
//!                                                  │  ▲          ▲
//!                                       quick stop │  │ enable   │ fault (any state)
//!                                                  ▼  │
//!                                           QuickStopActive
//! ```

use exo_common::drive::{ControlWord, DriveState};
use tracing::{debug, warn};

/// Device control command encoded in a control word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Shutdown,
    SwitchOn,
    EnableOperation,
    DisableVoltage,
    QuickStop,
    FaultReset,
}

impl ControlCommand {
    /// Decode the command bits (0..3, 7) of a control word.
    ///
    /// Mode-specific bits (4..6, 8, 12) are ignored, so `0x103F` decodes as
    /// enable operation.
    pub const fn decode(word: u16) -> Option<Self> {
        let fault_reset = ControlWord::FAULT_RESET.bits();
        if word & fault_reset != 0 {
            Some(Self::FaultReset)
        } else if word & 0x0002 == 0 {
            Some(Self::DisableVoltage)
        } else if word & 0x0006 == 0x0002 {
            Some(Self::QuickStop)
        } else if word & 0x0007 == 0x0006 {
            Some(Self::Shutdown)
        } else if word & 0x000F == 0x0007 {
            Some(Self::SwitchOn)
        } else if word & 0x000F == 0x000F {
            Some(Self::EnableOperation)
        } else {
            None
        }
    }
}

/// Input to the lifecycle table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Command(ControlCommand),
    /// Drive finished its power-up self test.
    InitComplete,
    FaultDetected,
    FaultReactionComplete,
}

/// Result of feeding an event to the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionResult {
    /// State changed to the contained state.
    Ok(DriveState),
    /// Event is valid but leaves the state unchanged.
    Unchanged,
    /// Event is not accepted in the current state.
    Rejected(&'static str),
}

/// Tracked drive lifecycle state.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lifecycle {
    state: DriveState,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn state(&self) -> DriveState {
        self.state
    }

    #[inline]
    pub fn is_operational(&self) -> bool {
        self.state == DriveState::OperationEnabled
    }

    /// Adopt the state reported by the drive's status word.
    pub fn observe(&mut self, reported: DriveState) {
        if reported != self.state {
            debug!(from = ?self.state, to = ?reported, "Drive reported state change");
            self.state = reported;
        }
    }

    /// Feed a control word. Words that decode to no command are rejected.
    pub fn apply_control_word(&mut self, word: u16) -> TransitionResult {
        match ControlCommand::decode(word) {
            Some(cmd) => self.handle_event(LifecycleEvent::Command(cmd)),
            None => TransitionResult::Rejected("Control word encodes no device command"),
        }
    }

    /// Process an event against the transition table.
    pub fn handle_event(&mut self, event: LifecycleEvent) -> TransitionResult {
        use ControlCommand as C;
        use DriveState as S;
        use LifecycleEvent as E;

        let next = match (self.state, event) {
            // Fault detection preempts every state except the fault path itself.
            (S::FaultReactionActive | S::Fault, E::FaultDetected) => {
                return TransitionResult::Unchanged;
            }
            (_, E::FaultDetected) => S::FaultReactionActive,
            (S::FaultReactionActive, E::FaultReactionComplete) => S::Fault,

            (S::NotReadyToSwitchOn, E::InitComplete) => S::SwitchOnDisabled,
            (_, E::InitComplete) => return TransitionResult::Unchanged,

            (S::Fault, E::Command(C::FaultReset)) => S::SwitchOnDisabled,
            (S::Fault | S::FaultReactionActive, _) => {
                return TransitionResult::Rejected("Drive is faulted; fault reset required");
            }
            // Fault reset outside the fault path is a no-op on the drive.
            (_, E::Command(C::FaultReset)) => return TransitionResult::Unchanged,

            (S::NotReadyToSwitchOn, _) => {
                return TransitionResult::Rejected("Drive has not completed self test");
            }

            (S::SwitchOnDisabled, E::Command(C::Shutdown)) => S::ReadyToSwitchOn,
            (S::SwitchOnDisabled, E::Command(C::DisableVoltage | C::QuickStop)) => {
                return TransitionResult::Unchanged;
            }
            (S::SwitchOnDisabled, E::Command(C::SwitchOn | C::EnableOperation)) => {
                return TransitionResult::Rejected("Switch on disabled; shutdown first");
            }

            (S::ReadyToSwitchOn, E::Command(C::SwitchOn)) => S::SwitchedOn,
            // Drives accept enable directly from ready (2 + 3 combined).
            (S::ReadyToSwitchOn, E::Command(C::EnableOperation)) => S::OperationEnabled,
            (S::ReadyToSwitchOn, E::Command(C::DisableVoltage | C::QuickStop)) => {
                S::SwitchOnDisabled
            }
            (S::ReadyToSwitchOn, E::Command(C::Shutdown)) => return TransitionResult::Unchanged,

            (S::SwitchedOn, E::Command(C::EnableOperation)) => S::OperationEnabled,
            (S::SwitchedOn, E::Command(C::Shutdown)) => S::ReadyToSwitchOn,
            (S::SwitchedOn, E::Command(C::DisableVoltage | C::QuickStop)) => S::SwitchOnDisabled,
            (S::SwitchedOn, E::Command(C::SwitchOn)) => return TransitionResult::Unchanged,

            (S::OperationEnabled, E::Command(C::SwitchOn)) => S::SwitchedOn,
            (S::OperationEnabled, E::Command(C::Shutdown)) => S::ReadyToSwitchOn,
            (S::OperationEnabled, E::Command(C::DisableVoltage)) => S::SwitchOnDisabled,
            (S::OperationEnabled, E::Command(C::QuickStop)) => S::QuickStopActive,
            (S::OperationEnabled, E::Command(C::EnableOperation)) => {
                return TransitionResult::Unchanged;
            }

            (S::QuickStopActive, E::Command(C::EnableOperation)) => S::OperationEnabled,
            (S::QuickStopActive, E::Command(C::DisableVoltage)) => S::SwitchOnDisabled,
            (S::QuickStopActive, E::Command(C::QuickStop)) => return TransitionResult::Unchanged,
            (S::QuickStopActive, E::Command(_)) => {
                return TransitionResult::Rejected("Quick stop active; disable voltage or enable");
            }

            (_, E::FaultReactionComplete) => {
                return TransitionResult::Rejected("No fault reaction in progress");
            }
        };

        debug!(from = ?self.state, to = ?next, ?event, "Drive lifecycle transition");
        self.state = next;
        TransitionResult::Ok(next)
    }

    /// Like [`apply_control_word`](Self::apply_control_word) but logs rejections.
    pub fn track_control_word(&mut self, node_id: u8, word: u16) {
        if let TransitionResult::Rejected(reason) = self.apply_control_word(word) {
            warn!(
                node_id,
                state = ?self.state,
                word = format_args!("0x{word:x}"),
                reason,
                "Control word does not match tracked lifecycle"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready() -> Lifecycle {
        let mut lc = Lifecycle::new();
        lc.handle_event(LifecycleEvent::InitComplete);
        lc.apply_control_word(0x06);
        lc
    }

    #[test]
    fn decode_standard_words() {
        assert_eq!(ControlCommand::decode(0x06), Some(ControlCommand::Shutdown));
        assert_eq!(ControlCommand::decode(0x07), Some(ControlCommand::SwitchOn));
        assert_eq!(
            ControlCommand::decode(0x0F),
            Some(ControlCommand::EnableOperation)
        );
        assert_eq!(
            ControlCommand::decode(0x00),
            Some(ControlCommand::DisableVoltage)
        );
        assert_eq!(ControlCommand::decode(0x02), Some(ControlCommand::QuickStop));
        assert_eq!(ControlCommand::decode(0x80), Some(ControlCommand::FaultReset));
    }

    #[test]
    fn decode_ignores_mode_specific_bits() {
        assert_eq!(
            ControlCommand::decode(0x103F),
            Some(ControlCommand::EnableOperation)
        );
        assert_eq!(
            ControlCommand::decode(0x2F),
            Some(ControlCommand::EnableOperation)
        );
        assert_eq!(
            ControlCommand::decode(0x3F),
            Some(ControlCommand::EnableOperation)
        );
    }

    #[test]
    fn starts_not_ready_and_rejects_commands() {
        let mut lc = Lifecycle::new();
        assert_eq!(lc.state(), DriveState::NotReadyToSwitchOn);
        assert!(matches!(
            lc.apply_control_word(0x06),
            TransitionResult::Rejected(_)
        ));
    }

    #[test]
    fn full_enable_path() {
        let mut lc = Lifecycle::new();
        assert_eq!(
            lc.handle_event(LifecycleEvent::InitComplete),
            TransitionResult::Ok(DriveState::SwitchOnDisabled)
        );
        assert_eq!(
            lc.apply_control_word(0x06),
            TransitionResult::Ok(DriveState::ReadyToSwitchOn)
        );
        assert_eq!(
            lc.apply_control_word(0x07),
            TransitionResult::Ok(DriveState::SwitchedOn)
        );
        assert_eq!(
            lc.apply_control_word(0x0F),
            TransitionResult::Ok(DriveState::OperationEnabled)
        );
        assert!(lc.is_operational());
    }

    #[test]
    fn enable_directly_from_ready() {
        let mut lc = ready();
        assert_eq!(
            lc.apply_control_word(0x0F),
            TransitionResult::Ok(DriveState::OperationEnabled)
        );
        assert_eq!(lc.apply_control_word(0x103F), TransitionResult::Unchanged);
    }

    #[test]
    fn reset_sequence_from_fault() {
        let mut lc = ready();
        lc.apply_control_word(0x0F);
        lc.handle_event(LifecycleEvent::FaultDetected);
        assert_eq!(lc.state(), DriveState::FaultReactionActive);
        assert!(matches!(
            lc.apply_control_word(0x0F),
            TransitionResult::Rejected(_)
        ));
        lc.handle_event(LifecycleEvent::FaultReactionComplete);
        assert_eq!(lc.state(), DriveState::Fault);

        // 0x06, 0x80, 0x06
        assert!(matches!(
            lc.apply_control_word(0x06),
            TransitionResult::Rejected(_)
        ));
        assert_eq!(
            lc.apply_control_word(0x80),
            TransitionResult::Ok(DriveState::SwitchOnDisabled)
        );
        assert_eq!(
            lc.apply_control_word(0x06),
            TransitionResult::Ok(DriveState::ReadyToSwitchOn)
        );
    }

    #[test]
    fn reset_sequence_without_fault_is_harmless() {
        let mut lc = ready();
        assert_eq!(lc.apply_control_word(0x06), TransitionResult::Unchanged);
        assert_eq!(lc.apply_control_word(0x80), TransitionResult::Unchanged);
        assert_eq!(lc.apply_control_word(0x06), TransitionResult::Unchanged);
        assert_eq!(lc.state(), DriveState::ReadyToSwitchOn);
    }

    #[test]
    fn disable_sequence_leaves_voltage_off() {
        let mut lc = ready();
        lc.apply_control_word(0x0F);
        assert_eq!(
            lc.apply_control_word(0x06),
            TransitionResult::Ok(DriveState::ReadyToSwitchOn)
        );
        assert_eq!(
            lc.apply_control_word(0x00),
            TransitionResult::Ok(DriveState::SwitchOnDisabled)
        );
    }

    #[test]
    fn quick_stop_round_trip() {
        let mut lc = ready();
        lc.apply_control_word(0x0F);
        assert_eq!(
            lc.apply_control_word(0x02),
            TransitionResult::Ok(DriveState::QuickStopActive)
        );
        assert!(matches!(
            lc.apply_control_word(0x06),
            TransitionResult::Rejected(_)
        ));
        assert_eq!(
            lc.apply_control_word(0x0F),
            TransitionResult::Ok(DriveState::OperationEnabled)
        );
    }

    #[test]
    fn observe_overrides_tracked_state() {
        let mut lc = ready();
        lc.observe(DriveState::Fault);
        assert_eq!(lc.state(), DriveState::Fault);
        assert!(!lc.is_operational());
    }
}
