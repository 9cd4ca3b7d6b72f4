//! Full control loop against the simulated drive.
//!
//! Runs the cycle body tick by tick with a fixed physics step: entry,
//! homing against the simulated hard stop, transparency, shutdown.

use std::sync::mpsc;

use exo_common::control::{ControllerMode, ExternalEvent, ParameterSnapshot};
use exo_common::drive::DriveState;
use exo_control_unit::calibration::CalibrationStage;
use exo_control_unit::cycle::{CycleError, CycleRunner};
use exo_control_unit::joint::{DriveJoint, RobotJoint};
use exo_control_unit::state::activation::ActivationState;
use exo_hal::transport::{DriveIdentity, SimulatedGateway, SimulationConfig};
use exo_hal::{DriveVendor, TransportRegistry};

use super::{RecordingSink, TickClock, config};

fn parameters(controller_mode: ControllerMode) -> ExternalEvent {
    ExternalEvent::Parameters(ParameterSnapshot {
        controller_mode,
        ..ParameterSnapshot::default()
    })
}

fn calibrate_and_run(vendor: &str) {
    let config = config(vendor, "simulation");
    let transport = TransportRegistry::with_builtin()
        .create(&config.transport, config.drive.identity())
        .unwrap();
    let mut joint = DriveJoint::new(&config, transport);
    joint.initialize().unwrap();

    let (tx, rx) = mpsc::channel();
    let sink = RecordingSink::default();
    let mut runner = CycleRunner::new(&config, joint, rx, Box::new(sink.clone()));
    runner.start().unwrap();
    assert_eq!(runner.controller().activation_state(), ActivationState::Active);

    let mut clock = TickClock::new(&config);
    tx.send(parameters(ControllerMode::Calibration)).unwrap();
    runner.tick(clock.next());
    assert_eq!(runner.controller().mode(), ControllerMode::Calibration);
    assert_eq!(runner.controller().calibration_stage(), CalibrationStage::Homing);

    let mut ticks = 1;
    while runner.controller().calibration_stage() != CalibrationStage::Done {
        runner.tick(clock.next());
        ticks += 1;
        assert!(ticks < 5_000, "calibration did not finish");
    }
    // 45 degrees at 30 deg/s.
    assert!(ticks > 1_000, "hard stop reached after {ticks} ticks");
    assert!((runner.joint().position_offset() - 15.0).abs() < 1e-9);

    // The drive settles on the reference position.
    for _ in 0..1_000 {
        runner.tick(clock.next());
    }
    assert!((runner.joint().position() - 16.0).abs() < 0.05);
    let (state, wrench) = sink.last().unwrap();
    assert_eq!(state.name, "M1_joint");
    assert!((state.position - 16.0).abs() < 0.05);
    assert_eq!(wrench.torque_y, 0.0);
    assert_eq!(sink.len(), ticks + 1_000);

    tx.send(ExternalEvent::Parameters(ParameterSnapshot {
        kp: 1.0,
        ki: 0.1,
        controller_mode: ControllerMode::Transparency,
        ..ParameterSnapshot::default()
    }))
    .unwrap();
    runner.tick(clock.next());
    assert_eq!(runner.controller().mode(), ControllerMode::Transparency);
    for _ in 0..100 {
        runner.tick(clock.next());
    }
    assert_eq!(runner.controller().pid().tick_count(), 100);

    runner.shutdown().unwrap();
    assert_eq!(runner.controller().activation_state(), ActivationState::Exited);
    assert_eq!(runner.joint().drive().state(), DriveState::SwitchOnDisabled);
}

#[test]
fn kinco_drive_calibrates_and_tracks() {
    calibrate_and_run("kinco");
}

#[test]
fn standard_drive_calibrates_and_tracks() {
    calibrate_and_run("standard");
}

#[test]
fn silent_drive_fails_entry() {
    let config = config("kinco", "simulation");
    let identity = DriveIdentity {
        node_id: 9,
        vendor: DriveVendor::Kinco,
        ..DriveIdentity::default()
    };
    let transport = SimulatedGateway::new(identity, SimulationConfig::default());
    let joint = DriveJoint::new(&config, Box::new(transport));

    let (_tx, rx) = mpsc::channel();
    let mut runner = CycleRunner::new(&config, joint, rx, Box::new(RecordingSink::default()));
    assert!(matches!(runner.start(), Err(CycleError::Init(_))));
    assert_ne!(
        runner.controller().activation_state(),
        ActivationState::Active
    );
}
