//! Outer activation state: Idle → Active → Exited.
//!
//! The control laws only run while Active. Entry actions are performed by the
//! controller when `Enter` is accepted; exit disables the drive.

/// Activation state of the control state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActivationState {
    /// Constructed, entry actions not yet run.
    #[default]
    Idle,
    /// Entry actions done, ticking.
    Active,
    /// Exit actions done. Terminal.
    Exited,
}

/// Result of an activation transition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult {
    /// Transition succeeded - new state.
    Ok(ActivationState),
    /// Transition rejected - reason.
    Rejected(&'static str),
}

/// Event driving the activation machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationEvent {
    /// Entry actions completed.
    Enter,
    /// Shutdown requested.
    Exit,
}

#[derive(Debug, Clone, Default)]
pub struct ActivationMachine {
    state: ActivationState,
}

impl ActivationMachine {
    pub const fn new() -> Self {
        Self {
            state: ActivationState::Idle,
        }
    }

    #[inline]
    pub const fn state(&self) -> ActivationState {
        self.state
    }

    #[inline]
    pub const fn is_active(&self) -> bool {
        matches!(self.state, ActivationState::Active)
    }

    pub fn handle_event(&mut self, event: ActivationEvent) -> TransitionResult {
        use ActivationEvent::*;
        use ActivationState::*;

        let next = match (self.state, event) {
            (Idle, Enter) => Active,
            (Idle, Exit) => Exited,
            (Active, Exit) => Exited,
            (Active, Enter) => return TransitionResult::Rejected("already active"),
            (Exited, _) => return TransitionResult::Rejected("control state has exited"),
        };

        self.state = next;
        TransitionResult::Ok(next)
    }
}
