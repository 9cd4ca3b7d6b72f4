//! Controller mode switching against a recording drive.
//!
//! Every switch re-initialises the drive control mode (where the new mode
//! needs one) and writes the diagnostic trigger exactly once.

use exo_common::control::{ControllerMode, ExternalEvent, JointCommand, ParameterSnapshot};
use exo_common::drive::DriveState;
use exo_control_unit::JointController;
use exo_control_unit::joint::{DriveJoint, RobotJoint};
use exo_control_unit::state::activation::ActivationState;
use exo_hal::transport::{CommandLog, LoopbackTransport};

use super::config;

const TORQUE_MODE: &str = "[1] 1 write 0x6060 0 i8 4";
const TRIGGER_ON: &str = "[1] 1 write 0x2010 14 i16 1";
const TRIGGER_OFF: &str = "[1] 1 write 0x2010 14 i16 0";

fn entered() -> (JointController, DriveJoint, CommandLog) {
    let config = config("kinco", "loopback");
    let transport = LoopbackTransport::new();
    let log = transport.log();
    let mut joint = DriveJoint::new(&config, Box::new(transport));
    joint.initialize().unwrap();
    let mut controller = JointController::new(&config);
    controller.enter(&mut joint).unwrap();
    log.clear();
    (controller, joint, log)
}

fn mode(controller_mode: ControllerMode) -> ParameterSnapshot {
    ParameterSnapshot {
        controller_mode,
        ..ParameterSnapshot::default()
    }
}

#[test]
fn entry_configures_torque_control() {
    let config = config("kinco", "loopback");
    let transport = LoopbackTransport::new();
    let log = transport.log();
    let mut joint = DriveJoint::new(&config, Box::new(transport));
    joint.initialize().unwrap();
    let mut controller = JointController::new(&config);
    controller.enter(&mut joint).unwrap();

    assert_eq!(log.matching(TORQUE_MODE).len(), 1);
    assert_eq!(controller.mode(), ControllerMode::Uninitialized);
    assert!(log.matching("0x2010").is_empty());
}

#[test]
fn failed_entry_disables_the_drive() {
    let config = config("kinco", "loopback");
    let transport = LoopbackTransport::new().fail_matching("0x6060");
    let log = transport.log();
    let mut joint = DriveJoint::new(&config, Box::new(transport));
    joint.initialize().unwrap();
    let mut controller = JointController::new(&config);

    assert!(controller.enter(&mut joint).is_err());
    assert_eq!(controller.activation_state(), ActivationState::Exited);
    assert_eq!(log.matching("write 0x6040 0 u16 0x0").len(), 1);
    assert_eq!(joint.drive().state(), DriveState::SwitchOnDisabled);

    log.clear();
    controller.exit(&mut joint).unwrap();
    assert!(log.is_empty());
}

#[test]
fn torque_follow_to_virtual_spring() {
    let (mut controller, mut joint, log) = entered();
    controller.apply_parameters(mode(ControllerMode::TorqueFollow), &mut joint);
    assert_eq!(log.matching(TORQUE_MODE).len(), 1);
    assert_eq!(log.matching(TRIGGER_OFF).len(), 1);

    log.clear();
    controller.apply_parameters(mode(ControllerMode::VirtualSpring), &mut joint);
    assert_eq!(log.matching(TORQUE_MODE).len(), 1);
    assert_eq!(log.matching(TRIGGER_ON).len(), 1);
    assert!(log.matching(TRIGGER_OFF).is_empty());
    assert_eq!(controller.pid().tick_count(), 0);
}

#[test]
fn virtual_spring_to_transparency() {
    let (mut controller, mut joint, log) = entered();
    controller.apply_parameters(mode(ControllerMode::VirtualSpring), &mut joint);
    log.clear();

    controller.apply_parameters(mode(ControllerMode::Transparency), &mut joint);
    assert_eq!(log.matching(TORQUE_MODE).len(), 1);
    assert_eq!(log.matching(TRIGGER_OFF).len(), 1);
    assert_eq!(controller.mode(), ControllerMode::Transparency);
}

#[test]
fn repeated_mode_runs_no_entry_actions() {
    let (mut controller, mut joint, log) = entered();
    controller.apply_parameters(mode(ControllerMode::VirtualSpring), &mut joint);
    log.clear();

    let retuned = ParameterSnapshot {
        kp: 2.0,
        ki: 0.5,
        ..mode(ControllerMode::VirtualSpring)
    };
    controller.apply_parameters(retuned, &mut joint);
    assert!(log.is_empty(), "unexpected commands {:?}", log.commands());
    assert_eq!(controller.parameters().kp, 2.0);
}

#[test]
fn uninitialized_only_writes_trigger() {
    let (mut controller, mut joint, log) = entered();
    controller.apply_parameters(mode(ControllerMode::ZeroTorque), &mut joint);
    log.clear();

    controller.apply_parameters(mode(ControllerMode::Uninitialized), &mut joint);
    assert_eq!(log.commands(), vec![TRIGGER_OFF.to_string()]);
}

#[test]
fn zero_torque_writes_zero_target() {
    let (mut controller, mut joint, log) = entered();
    controller.apply_parameters(mode(ControllerMode::ZeroTorque), &mut joint);
    log.clear();

    joint.refresh().unwrap();
    controller.step(&mut joint, 1.0 / 800.0);
    assert_eq!(log.matching("write 0x60f6 8 i16 0").len(), 1);
}

#[test]
fn position_follow_tracks_joint_command() {
    let (mut controller, mut joint, log) = entered();
    controller.apply_parameters(mode(ControllerMode::PositionFollow), &mut joint);
    assert_eq!(log.matching("write 0x6060 0 i8 1").len(), 1);
    assert_eq!(log.matching("write 0x6040 0 u16 0x103f").len(), 1);

    let command = JointCommand {
        position: 12.5,
        velocity: 0.0,
        effort: 0.0,
    };
    controller.handle_event(ExternalEvent::JointCommand(command), &mut joint);
    joint.refresh().unwrap();
    controller.step(&mut joint, 1.0 / 800.0);
    assert_eq!(log.matching("write 0x607a 0 i32 1250").len(), 1);
}

#[test]
fn torque_follow_tracks_effort() {
    let (mut controller, mut joint, log) = entered();
    controller.apply_parameters(mode(ControllerMode::TorqueFollow), &mut joint);
    let command = JointCommand {
        position: 0.0,
        velocity: 0.0,
        effort: -1.5,
    };
    controller.handle_event(ExternalEvent::JointCommand(command), &mut joint);
    joint.refresh().unwrap();
    controller.step(&mut joint, 1.0 / 800.0);
    assert_eq!(log.matching("write 0x60f6 8 i16 -150").len(), 1);
}

#[test]
fn exit_disables_drive() {
    let (mut controller, mut joint, log) = entered();
    controller.exit(&mut joint).unwrap();
    assert_eq!(
        log.commands(),
        vec![
            "[1] 1 write 0x6040 0 u16 0x6".to_string(),
            "[1] 1 write 0x6040 0 u16 0x0".to_string(),
        ]
    );
    log.clear();
    controller.exit(&mut joint).unwrap();
    assert!(log.is_empty());
}
