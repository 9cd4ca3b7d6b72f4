//! Joint controller: the control state with its nested mode selector.
//!
//! ```text
//!            enter()                      exit()
//!   Idle ──────────────► Active ───────────────────► Exited
//!                          │
//!                          │ parameter update (edge on controller_mode)
//!                          ▼
//!   -1 ─► 0 calibration │ 1 zero torque │ 2 position │ 3 torque │ 4 spring │ 5 transparency
//! ```
//!
//! The mode only changes inside [`JointController::handle_event`]; the tick
//! ([`JointController::step`]) reads it but never writes it.

use std::time::Instant;

use tracing::{debug, info, warn};

use exo_common::control::{
    ControllerMode, ExternalEvent, InteractionTorqueCommand, InteractionWrenchMessage,
    JointCommand, JointStateMessage, ParameterSnapshot,
};
use exo_common::drive::{ControlMode, DriveError};

use crate::calibration::{CalibrationSequence, CalibrationStage};
use crate::config::{CalibrationConfig, ExoConfig};
use crate::control::filters::lowpass_alpha;
use crate::control::pid::{PidGains, PidState, pid_compute, reset_period_ticks};
use crate::control::tracking::TrackingLaw;
use crate::joint::RobotJoint;
use crate::state::activation::{
    ActivationEvent, ActivationMachine, ActivationState, TransitionResult,
};
use crate::state::mode::{ModeSelector, ModeSwitch};

/// Constants of the control laws.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerSettings {
    /// PID derivative/integral frequency [Hz].
    pub nominal_frequency_hz: f64,
    /// Low-pass cutoff [Hz].
    pub filter_cutoff_hz: f64,
    /// Virtual-spring integral reset period [s].
    pub spring_integral_reset_secs: f64,
    /// Display mirror axis for the published joint position.
    pub flip_axis: f64,
}

impl From<&ExoConfig> for ControllerSettings {
    fn from(config: &ExoConfig) -> Self {
        Self {
            nominal_frequency_hz: config.control.nominal_frequency_hz,
            filter_cutoff_hz: config.control.filter_cutoff_hz,
            spring_integral_reset_secs: config.control.spring_integral_reset_secs,
            flip_axis: config.joint.flip_axis,
        }
    }
}

pub struct JointController {
    settings: ControllerSettings,
    activation: ActivationMachine,
    modes: ModeSelector,
    calibration: CalibrationSequence,
    pid: PidState,
    params: ParameterSnapshot,
    joint_command: JointCommand,
    interaction_command: InteractionTorqueCommand,
    /// Virtual-spring reference torque, published on the wrench.
    spring_torque: f64,
    last_tick: Option<Instant>,
}

impl JointController {
    pub fn new(config: &ExoConfig) -> Self {
        Self::with_settings(ControllerSettings::from(config), config.calibration.clone())
    }

    pub fn with_settings(settings: ControllerSettings, calibration: CalibrationConfig) -> Self {
        Self {
            settings,
            activation: ActivationMachine::new(),
            modes: ModeSelector::new(),
            calibration: CalibrationSequence::new(calibration),
            pid: PidState::default(),
            params: ParameterSnapshot::default(),
            joint_command: JointCommand::default(),
            interaction_command: InteractionTorqueCommand::default(),
            spring_torque: 0.0,
            last_tick: None,
        }
    }

    // ─── Accessors ──────────────────────────────────────────────────

    #[inline]
    pub fn activation_state(&self) -> ActivationState {
        self.activation.state()
    }

    #[inline]
    pub fn mode(&self) -> ControllerMode {
        self.modes.mode()
    }

    #[inline]
    pub fn parameters(&self) -> &ParameterSnapshot {
        &self.params
    }

    #[inline]
    pub fn pid(&self) -> &PidState {
        &self.pid
    }

    #[inline]
    pub fn calibration_stage(&self) -> CalibrationStage {
        self.calibration.stage()
    }

    /// Velocity commanded by the calibration sequence [deg/s].
    #[inline]
    pub fn calibration_velocity(&self) -> f64 {
        self.calibration.commanded_velocity()
    }

    #[inline]
    pub fn spring_torque(&self) -> f64 {
        self.spring_torque
    }

    #[inline]
    pub fn joint_command(&self) -> &JointCommand {
        &self.joint_command
    }

    // ─── Activation ─────────────────────────────────────────────────

    /// Entry actions: torque control, position and sensor calibration, clean
    /// control state, controller mode uninitialised.
    ///
    /// # Errors
    /// Torque control initialisation failure. The drive is disabled and the
    /// controller ends Exited.
    pub fn enter(&mut self, joint: &mut dyn RobotJoint) -> Result<(), DriveError> {
        if let TransitionResult::Rejected(reason) = self.activation.handle_event(ActivationEvent::Enter)
        {
            warn!(reason, "Controller entry ignored");
            return Ok(());
        }

        if let Err(e) = joint.refresh() {
            warn!(error = %e, "Initial refresh failed");
        }
        if let Err(e) = joint.init_torque_control() {
            // The batch may have enabled the drive before failing.
            if let Err(disable_error) = joint.disable() {
                warn!(error = %disable_error, "Drive disable after failed entry failed");
            }
            self.activation.handle_event(ActivationEvent::Exit);
            return Err(e);
        }
        joint.apply_calibration();
        joint.zero_interaction_sensor();

        self.spring_torque = 0.0;
        self.pid.reset();
        self.modes.reset();
        self.joint_command = JointCommand::default();
        self.interaction_command = InteractionTorqueCommand::default();
        self.last_tick = None;
        info!(
            joint = joint.name(),
            cutoff_hz = self.settings.filter_cutoff_hz,
            frequency_hz = self.settings.nominal_frequency_hz,
            "Controller active"
        );
        Ok(())
    }

    /// Exit actions: disable the drive.
    pub fn exit(&mut self, joint: &mut dyn RobotJoint) -> Result<(), DriveError> {
        match self.activation.handle_event(ActivationEvent::Exit) {
            TransitionResult::Ok(_) => {
                info!(joint = joint.name(), "Controller exiting");
                joint.disable()
            }
            TransitionResult::Rejected(reason) => {
                debug!(reason, "Controller exit ignored");
                Ok(())
            }
        }
    }

    // ─── Inbound events ─────────────────────────────────────────────

    /// Apply one inbound event. Runs between ticks, never during one.
    pub fn handle_event(&mut self, event: ExternalEvent, joint: &mut dyn RobotJoint) {
        match event {
            ExternalEvent::JointCommand(command) => self.joint_command = command,
            ExternalEvent::InteractionTorque(command) => self.interaction_command = command,
            ExternalEvent::Parameters(snapshot) => self.apply_parameters(snapshot, joint),
        }
    }

    /// Replace the parameter snapshot as a whole.
    ///
    /// A new integral reset period restarts the tick count; a new controller
    /// mode runs its entry actions once. Outside the active state the
    /// snapshot is only stored.
    pub fn apply_parameters(&mut self, snapshot: ParameterSnapshot, joint: &mut dyn RobotJoint) {
        let previous = std::mem::replace(&mut self.params, snapshot);
        debug!(?snapshot, "Parameters updated");

        if snapshot.integral_reset_secs != previous.integral_reset_secs {
            self.pid.reset_tick_count();
        }
        if !self.activation.is_active() {
            return;
        }
        if let Some(switch) = self.modes.select(snapshot.controller_mode) {
            self.enter_mode(switch, joint);
        }
    }

    fn enter_mode(&mut self, switch: ModeSwitch, joint: &mut dyn RobotJoint) {
        info!(from = ?switch.from, to = ?switch.to, "Controller mode switch");
        let entry = switch.entry;

        if let Some(mode) = entry.drive_mode {
            let result = match mode {
                ControlMode::Position => joint.init_position_control(),
                ControlMode::Velocity => joint.init_velocity_control(),
                ControlMode::Torque => joint.init_torque_control(),
                ControlMode::None => Ok(()),
            };
            if let Err(e) = result {
                warn!(?mode, error = %e, "Control mode initialisation failed");
            }
        }
        if entry.start_calibration {
            self.calibration.restart();
        }
        if entry.reset_pid {
            self.pid.reset();
        }
        match joint.send_trigger(entry.trigger) {
            Ok(rtt) => debug!(
                value = entry.trigger,
                rtt_ms = rtt.as_secs_f64() * 1_000.0,
                "Trigger round trip"
            ),
            Err(e) => warn!(value = entry.trigger, error = %e, "Trigger write failed"),
        }
    }

    // ─── Tick ───────────────────────────────────────────────────────

    /// Run the control law with `dt` measured from the monotonic clock.
    pub fn during(&mut self, joint: &mut dyn RobotJoint, now: Instant) {
        let dt = match self.last_tick {
            Some(last) => now.saturating_duration_since(last).as_secs_f64(),
            None => 1.0 / self.settings.nominal_frequency_hz,
        };
        self.last_tick = Some(now);
        self.step(joint, dt);
    }

    /// Run the control law of the current mode once. `dt` in seconds.
    ///
    /// Drive write failures are logged; the next tick retries.
    pub fn step(&mut self, joint: &mut dyn RobotJoint, dt: f64) {
        if !self.activation.is_active() {
            return;
        }

        let mode = self.modes.mode();
        let result = match (mode, TrackingLaw::for_mode(mode)) {
            (_, Some(law)) => self.track(law, joint, dt),
            (ControllerMode::Calibration, None) => {
                self.calibration.step(joint);
                Ok(())
            }
            (ControllerMode::ZeroTorque, None) => joint.set_torque(0.0),
            (ControllerMode::PositionFollow, None) => joint.set_position(self.joint_command.position),
            (ControllerMode::TorqueFollow, None) => joint.set_torque(self.joint_command.effort),
            (_, None) => Ok(()),
        };
        if let Err(e) = result {
            warn!(?mode, error = %e, "Drive write failed");
        }
    }

    fn track(
        &mut self,
        law: TrackingLaw,
        joint: &mut dyn RobotJoint,
        dt: f64,
    ) -> Result<(), DriveError> {
        let alpha = lowpass_alpha(dt, self.settings.filter_cutoff_hz);
        joint.filter_position(alpha);
        joint.filter_interaction_torque(alpha);

        let sensor = joint.interaction_torque();
        let command = self.interaction_command.data.first().copied().unwrap_or(0.0);
        self.spring_torque = law.spring_torque(command);
        let error = law.error(sensor, self.spring_torque);

        let frequency = self.settings.nominal_frequency_hz;
        let output = pid_compute(&mut self.pid, &PidGains::from(&self.params), error, frequency);
        let result = joint.set_torque_compensated(output, sensor, self.params.ff_ratio);

        let period = law.reset_period_secs(
            self.settings.spring_integral_reset_secs,
            self.params.integral_reset_secs,
        );
        if self.pid.reset_integral_if_due(reset_period_ticks(period, frequency)) {
            debug!(?law, "Integral reset");
        }
        result
    }

    // ─── Telemetry ──────────────────────────────────────────────────

    pub fn joint_state(&self, joint: &dyn RobotJoint) -> JointStateMessage {
        let flip_axis = self.params.flip.then_some(self.settings.flip_axis);
        JointStateMessage::new(
            joint.name(),
            joint.position(),
            joint.velocity(),
            joint.torque(),
            flip_axis,
        )
    }

    pub fn wrench(&self, joint: &dyn RobotJoint) -> InteractionWrenchMessage {
        InteractionWrenchMessage::new(self.spring_torque, joint.interaction_torque())
    }
}
