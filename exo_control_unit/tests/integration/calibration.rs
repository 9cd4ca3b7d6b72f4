//! Homing calibration over the drive protocol.
//!
//! Sensor and encoder readings are scripted per tick; the assertions check
//! the commands reaching the bus.

use exo_common::control::{ControllerMode, ParameterSnapshot};
use exo_control_unit::JointController;
use exo_control_unit::calibration::CalibrationStage;
use exo_control_unit::joint::{DriveJoint, RobotJoint};
use exo_hal::transport::CommandLog;

use super::{BusValues, ScriptedBus, config};

const POSITION: (u16, u8) = (0x6064, 0);
const VELOCITY: (u16, u8) = (0x606C, 0);
const SENSOR: (u16, u8) = (0x2205, 1);

struct Rig {
    controller: JointController,
    joint: DriveJoint,
    values: BusValues,
    log: CommandLog,
}

impl Rig {
    fn new() -> Self {
        let config = config("kinco", "loopback");
        let (bus, values, log) = ScriptedBus::new();
        values.set(POSITION.0, POSITION.1, 3_000);
        values.set(SENSOR.0, SENSOR.1, 50);

        let mut joint = DriveJoint::new(&config, Box::new(bus));
        joint.initialize().unwrap();
        let mut controller = JointController::new(&config);
        controller.enter(&mut joint).unwrap();
        Self {
            controller,
            joint,
            values,
            log,
        }
    }

    fn set(&self, object: (u16, u8), value: i64) {
        self.values.set(object.0, object.1, value);
    }

    fn select(&mut self, controller_mode: ControllerMode) {
        let snapshot = ParameterSnapshot {
            controller_mode,
            ..ParameterSnapshot::default()
        };
        self.controller.apply_parameters(snapshot, &mut self.joint);
    }

    fn tick(&mut self) -> CalibrationStage {
        self.joint.refresh().unwrap();
        self.controller.step(&mut self.joint, 1.0 / 800.0);
        self.controller.calibration_stage()
    }
}

#[test]
fn homing_sequence_reaches_done() {
    let mut rig = Rig::new();
    assert!((rig.joint.sensor_offset() - 0.5).abs() < 1e-12);

    rig.log.clear();
    rig.select(ControllerMode::Calibration);
    assert_eq!(rig.log.matching("write 0x6060 0 i8 3").len(), 1);
    assert_eq!(rig.log.matching("write 0x2010 14 i16 0").len(), 1);

    rig.set(VELOCITY, -3_000);
    assert_eq!(rig.tick(), CalibrationStage::Homing);
    assert_eq!(rig.log.matching("write 0x60ff 0 i32 -3000").len(), 1);

    // Stalled against the stop: 1.5 deg/s, 2.5 Nm above the entry zero.
    rig.log.clear();
    rig.set(POSITION, -1_500);
    rig.set(VELOCITY, 150);
    rig.set(SENSOR, 300);
    assert_eq!(rig.tick(), CalibrationStage::Settling);
    assert_eq!(rig.controller.calibration_velocity(), 0.0);
    assert_eq!(rig.log.matching("write 0x60ff 0 i32 0").len(), 1);
    assert_eq!(rig.log.matching("write 0x6060 0 i8 1").len(), 1);
    assert!((rig.joint.position_offset() - 15.0).abs() < 1e-12);
    assert_eq!(rig.joint.position(), 0.0);

    // Sensor drifted outside the dead-band once off the stop.
    rig.log.clear();
    rig.set(SENSOR, 90);
    assert_eq!(rig.tick(), CalibrationStage::Done);
    assert_eq!(rig.log.matching("write 0x607a 0 i32 100").len(), 1);
    assert!((rig.joint.sensor_offset() - 0.9).abs() < 1e-12);
    assert_eq!(rig.joint.interaction_torque(), 0.0);

    rig.log.clear();
    assert_eq!(rig.tick(), CalibrationStage::Done);
    assert!(rig.log.matching("write").is_empty());
}

#[test]
fn moving_joint_keeps_homing() {
    let mut rig = Rig::new();
    rig.select(ControllerMode::Calibration);

    rig.set(VELOCITY, -2_500);
    rig.set(SENSOR, 400);
    for _ in 0..10 {
        assert_eq!(rig.tick(), CalibrationStage::Homing);
    }
    assert!(rig.log.matching("write 0x6060 0 i8 1").is_empty());
}

#[test]
fn reselecting_calibration_restarts_homing() {
    let mut rig = Rig::new();
    rig.select(ControllerMode::Calibration);
    rig.set(VELOCITY, 0);
    rig.set(SENSOR, 300);
    rig.tick();
    rig.tick();
    assert_eq!(rig.controller.calibration_stage(), CalibrationStage::Done);

    rig.select(ControllerMode::ZeroTorque);
    rig.select(ControllerMode::Calibration);
    assert_eq!(rig.controller.calibration_stage(), CalibrationStage::Homing);
    assert_eq!(rig.controller.calibration_velocity(), -30.0);
}
