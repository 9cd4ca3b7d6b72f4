//! Per-node drive abstraction.
//!
//! A [`Drive`] owns the node's address map, tracked lifecycle and configured
//! control mode, and turns every operation into an ordered batch of
//! [`Request`]s sent through a [`Transport`]. Batches are "send all, fail
//! fast": the first rejected command aborts the rest, nothing is rolled back.
//!
//! # Sequences
//!
//! | Operation | Commands |
//! |-----------|----------|
//! | `init` | preop, 7 PDO mappings, error reset |
//! | position | start, `0xf`, mode 1, profile vel/acc/dec, Kinco `0x103f` |
//! | velocity | start, `0xf`, mode 3, profile acc/dec |
//! | torque | start, `0xf`, mode 4 |
//! | error reset | `0x6`, `0x80`, `0x6` |
//! | disable | `0x6`, `0x0` |

use exo_common::drive::{
    ControlMode, ControlWord, DataType, DriveError, DriveState, MotorProfile, Register,
};
use tracing::{debug, error, info, trace, warn};

use crate::codec::{NmtCommand, ObjectDictionaryCodec, Reply, Request, SdoValue};
use crate::lifecycle::{Lifecycle, LifecycleEvent};
use crate::pdo::STANDARD_MAPPINGS;
use crate::transport::{DriveIdentity, Transport};
use crate::vendor::{AddressMap, DriveProfiles, DriveVendor};

/// Latest process data read from the drive [counts].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProcessData {
    pub status_word: u16,
    pub position: i32,
    pub velocity: i32,
    pub torque: i16,
}

/// One node on the fieldbus.
#[derive(Debug, Clone)]
pub struct Drive {
    identity: DriveIdentity,
    codec: ObjectDictionaryCodec,
    addresses: AddressMap,
    lifecycle: Lifecycle,
    control_mode: ControlMode,
    profiles: DriveProfiles,
}

impl Drive {
    pub fn new(identity: DriveIdentity, profiles: DriveProfiles) -> Self {
        Self {
            codec: ObjectDictionaryCodec::new(identity.bus, identity.node_id),
            addresses: AddressMap::for_vendor(identity.vendor),
            lifecycle: Lifecycle::new(),
            control_mode: ControlMode::None,
            identity,
            profiles,
        }
    }

    // ─── Accessors ──────────────────────────────────────────────────

    #[inline]
    pub fn node_id(&self) -> u8 {
        self.identity.node_id
    }

    #[inline]
    pub fn vendor(&self) -> DriveVendor {
        self.identity.vendor
    }

    #[inline]
    pub fn state(&self) -> DriveState {
        self.lifecycle.state()
    }

    #[inline]
    pub fn control_mode(&self) -> ControlMode {
        self.control_mode
    }

    pub fn addresses(&self) -> &AddressMap {
        &self.addresses
    }

    pub fn codec(&self) -> ObjectDictionaryCodec {
        self.codec
    }

    fn write_register(&self, register: Register, value: SdoValue) -> Request {
        self.codec.write_request(
            self.addresses.address(register),
            self.addresses.subindex(register),
            register.data_type(),
            value,
        )
    }

    fn control_word(&self, word: ControlWord) -> Request {
        self.write_register(Register::ControlWord, SdoValue::Hex(u32::from(word.bits())))
    }

    fn mode_of_operation(&self, mode: ControlMode) -> Option<Request> {
        mode.mode_of_operation().map(|m| {
            self.write_register(Register::ModesOfOperation, SdoValue::Dec(i64::from(m)))
        })
    }

    // ─── Sequences ──────────────────────────────────────────────────

    /// PDO mapping batches in configuration order, labelled by step.
    pub fn pdo_batches(&self) -> Vec<(&'static str, Vec<Request>)> {
        STANDARD_MAPPINGS
            .iter()
            .map(|m| (m.step, m.requests(&self.codec, &self.addresses)))
            .collect()
    }

    /// Mode-initialization batch for `mode`.
    pub fn mode_sequence(&self, mode: ControlMode) -> Vec<Request> {
        let mut batch = vec![
            self.codec.nmt_request(NmtCommand::Start),
            self.control_word(ControlWord::ENABLE),
        ];
        batch.extend(self.mode_of_operation(mode));

        let profile_writes = |profile: &MotorProfile, with_velocity: bool| {
            let mut writes = Vec::with_capacity(3);
            if with_velocity {
                writes.push(self.write_register(
                    Register::ProfileVelocity,
                    SdoValue::Dec(i64::from(profile.velocity)),
                ));
            }
            writes.push(self.write_register(
                Register::ProfileAcceleration,
                SdoValue::Dec(i64::from(profile.acceleration)),
            ));
            writes.push(self.write_register(
                Register::ProfileDeceleration,
                SdoValue::Dec(i64::from(profile.deceleration)),
            ));
            writes
        };

        match mode {
            ControlMode::Position => {
                batch.extend(profile_writes(&self.profiles.position, true));
                if let Some(word) = self.vendor().instant_position_word() {
                    batch.push(self.control_word(word));
                }
            }
            ControlMode::Velocity => batch.extend(profile_writes(&self.profiles.velocity, false)),
            ControlMode::Torque | ControlMode::None => {}
        }
        batch
    }

    /// Shutdown, fault reset, shutdown.
    pub fn reset_error_sequence(&self) -> [Request; 3] {
        [
            self.control_word(ControlWord::SHUTDOWN),
            self.control_word(ControlWord::RESET_FAULT),
            self.control_word(ControlWord::SHUTDOWN),
        ]
    }

    /// Shutdown, then disable voltage.
    pub fn disable_sequence(&self) -> [Request; 2] {
        [
            self.control_word(ControlWord::SHUTDOWN),
            self.control_word(ControlWord::DISABLE_VOLTAGE),
        ]
    }

    // ─── Transport ──────────────────────────────────────────────────

    /// Send one request and interpret the reply.
    ///
    /// Control-word writes that the gateway accepted are fed to the
    /// tracked lifecycle.
    pub fn send(&mut self, transport: &mut dyn Transport, request: &Request) -> Result<Reply, DriveError> {
        let line = request.to_string();
        trace!(node_id = self.node_id(), command = %line, "SDO");
        let raw = transport.send(&line)?;
        let reply: Reply = raw.parse()?;
        if let Reply::Error(code) = reply {
            return Err(DriveError::Rejected {
                command: line,
                code,
            });
        }
        if let Some(word) = request.control_word(self.addresses.address(Register::ControlWord)) {
            self.lifecycle.track_control_word(self.node_id(), word);
        }
        Ok(reply)
    }

    /// Send every request in order, stopping at the first failure.
    pub fn send_batch(&mut self, transport: &mut dyn Transport, batch: &[Request]) -> Result<(), DriveError> {
        for request in batch {
            self.send(transport, request)?;
        }
        Ok(())
    }

    // ─── Operations ─────────────────────────────────────────────────

    /// Put the node in pre-operational.
    pub fn preop(&mut self, transport: &mut dyn Transport) -> Result<(), DriveError> {
        let request = self.codec.nmt_request(NmtCommand::PreOperational);
        self.send(transport, &request)?;
        self.lifecycle.handle_event(LifecycleEvent::InitComplete);
        Ok(())
    }

    pub fn start(&mut self, transport: &mut dyn Transport) -> Result<(), DriveError> {
        let request = self.codec.nmt_request(NmtCommand::Start);
        self.send(transport, &request).map(|_| ())
    }

    pub fn stop(&mut self, transport: &mut dyn Transport) -> Result<(), DriveError> {
        let request = self.codec.nmt_request(NmtCommand::Stop);
        self.send(transport, &request).map(|_| ())
    }

    /// Configure every PDO mapping, aborting at the first failing step.
    ///
    /// # Errors
    /// `DriveError::PdoConfig` naming the step that failed.
    pub fn init_pdos(&mut self, transport: &mut dyn Transport) -> Result<(), DriveError> {
        for (step, batch) in self.pdo_batches() {
            debug!(node_id = self.node_id(), step, "Set up PDO");
            if let Err(e) = self.send_batch(transport, &batch) {
                error!(node_id = self.node_id(), step, error = %e, "PDO setup failed");
                return Err(DriveError::PdoConfig {
                    step,
                    node_id: self.node_id(),
                });
            }
        }
        Ok(())
    }

    /// Preop, PDO mapping, then error reset.
    ///
    /// On failure the node stays pre-operational and must not be started.
    pub fn init(&mut self, transport: &mut dyn Transport) -> Result<(), DriveError> {
        info!(node_id = self.node_id(), vendor = %self.vendor(), "Initializing drive");
        self.preop(transport)?;
        self.init_pdos(transport)?;
        self.reset_error(transport)?;
        info!(node_id = self.node_id(), state = ?self.state(), "Drive initialized");
        Ok(())
    }

    fn init_mode(&mut self, transport: &mut dyn Transport, mode: ControlMode) -> Result<(), DriveError> {
        debug!(node_id = self.node_id(), ?mode, "Initialising control mode");
        let batch = self.mode_sequence(mode);
        match self.send_batch(transport, &batch) {
            Ok(()) => {
                self.control_mode = mode;
                Ok(())
            }
            Err(e) => {
                self.control_mode = ControlMode::None;
                Err(e)
            }
        }
    }

    pub fn init_position_control(&mut self, transport: &mut dyn Transport) -> Result<(), DriveError> {
        self.init_mode(transport, ControlMode::Position)
    }

    pub fn init_velocity_control(&mut self, transport: &mut dyn Transport) -> Result<(), DriveError> {
        self.init_mode(transport, ControlMode::Velocity)
    }

    pub fn init_torque_control(&mut self, transport: &mut dyn Transport) -> Result<(), DriveError> {
        self.init_mode(transport, ControlMode::Torque)
    }

    pub fn reset_error(&mut self, transport: &mut dyn Transport) -> Result<(), DriveError> {
        debug!(node_id = self.node_id(), "Reset error");
        let batch = self.reset_error_sequence();
        self.send_batch(transport, &batch)
    }

    /// Leave the drive in SwitchOnDisabled.
    pub fn disable(&mut self, transport: &mut dyn Transport) -> Result<(), DriveError> {
        info!(node_id = self.node_id(), "Disabling drive");
        let batch = self.disable_sequence();
        self.send_batch(transport, &batch)?;
        self.control_mode = ControlMode::None;
        Ok(())
    }

    // ─── Targets ────────────────────────────────────────────────────

    /// Register a target for `requested` goes to, if the drive accepts one now.
    fn check_target(&self, requested: ControlMode) -> Result<Register, DriveError> {
        if !self.lifecycle.is_operational() {
            return Err(DriveError::NotOperational(self.state()));
        }
        match requested.target_register() {
            Some(register) if self.control_mode == requested => Ok(register),
            _ => Err(DriveError::ModeMismatch {
                configured: self.control_mode,
                requested,
            }),
        }
    }

    /// Write a position target; the standard variant latches it with a set-point pulse.
    pub fn set_target_position(&mut self, transport: &mut dyn Transport, counts: i32) -> Result<(), DriveError> {
        let register = self.check_target(ControlMode::Position)?;
        let target = self.write_register(register, SdoValue::Dec(i64::from(counts)));
        self.send(transport, &target)?;
        if self.vendor().needs_set_point_confirm() {
            let latch = ControlWord::ENABLE
                | ControlWord::NEW_SET_POINT
                | ControlWord::CHANGE_SET_IMMEDIATELY;
            let release = ControlWord::ENABLE | ControlWord::CHANGE_SET_IMMEDIATELY;
            let confirm = [self.control_word(latch), self.control_word(release)];
            self.send_batch(transport, &confirm)?;
        }
        Ok(())
    }

    pub fn set_target_velocity(&mut self, transport: &mut dyn Transport, counts_per_s: i32) -> Result<(), DriveError> {
        let register = self.check_target(ControlMode::Velocity)?;
        let target = self.write_register(register, SdoValue::Dec(i64::from(counts_per_s)));
        self.send(transport, &target).map(|_| ())
    }

    pub fn set_target_torque(&mut self, transport: &mut dyn Transport, counts: i16) -> Result<(), DriveError> {
        let register = self.check_target(ControlMode::Torque)?;
        let target = self.write_register(register, SdoValue::Dec(i64::from(counts)));
        self.send(transport, &target).map(|_| ())
    }

    // ─── Process data ───────────────────────────────────────────────

    fn read_register(&mut self, transport: &mut dyn Transport, register: Register) -> Result<i64, DriveError> {
        let request = self.codec.read_request(
            self.addresses.address(register),
            self.addresses.subindex(register),
            register.data_type(),
        );
        self.read(transport, &request)
    }

    fn read(&mut self, transport: &mut dyn Transport, request: &Request) -> Result<i64, DriveError> {
        match self.send(transport, request)? {
            Reply::Value(v) => Ok(v),
            Reply::Ok | Reply::Error(_) => Err(DriveError::MalformedReply(format!(
                "expected a value for '{request}'"
            ))),
        }
    }

    /// Sync the bus and read status word, position, velocity and torque.
    ///
    /// The reported status word overrides the tracked lifecycle state.
    pub fn refresh(&mut self, transport: &mut dyn Transport) -> Result<ProcessData, DriveError> {
        transport.sync()?;
        let status_word = self.read_register(transport, Register::StatusWord)? as u16;
        let reported = DriveState::from_status_word(status_word);
        if reported.is_fault() && !self.state().is_fault() {
            warn!(node_id = self.node_id(), status_word, state = ?reported, "Drive fault");
        }
        self.lifecycle.observe(reported);
        Ok(ProcessData {
            status_word,
            position: self.read_register(transport, Register::ActualPos)? as i32,
            velocity: self.read_register(transport, Register::ActualVel)? as i32,
            torque: self.read_register(transport, Register::ActualTor)? as i16,
        })
    }

    /// Read an arbitrary object at subindex `subindex`.
    pub fn read_object(
        &mut self,
        transport: &mut dyn Transport,
        address: u16,
        subindex: u8,
        data_type: DataType,
    ) -> Result<i64, DriveError> {
        let request = self.codec.read_request(address, subindex, data_type);
        self.read(transport, &request)
    }

    /// Read an arbitrary object at subindex 0.
    pub fn read_sdo(&mut self, transport: &mut dyn Transport, address: u16, data_type: DataType) -> Result<i64, DriveError> {
        self.read_object(transport, address, 0, data_type)
    }

    /// Write an `i32` to an arbitrary object at subindex 0.
    pub fn write_sdo(&mut self, transport: &mut dyn Transport, address: u16, value: i32) -> Result<(), DriveError> {
        let request = self
            .codec
            .write_request(address, 0, DataType::I32, SdoValue::Hex(value as u32));
        self.send(transport, &request).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::loopback::{CommandLog, LoopbackTransport};

    fn drive(vendor: DriveVendor) -> Drive {
        Drive::new(
            DriveIdentity {
                bus: 1,
                node_id: 2,
                vendor,
            },
            DriveProfiles::default(),
        )
    }

    fn setup(vendor: DriveVendor) -> (Drive, LoopbackTransport, CommandLog) {
        let transport = LoopbackTransport::new();
        let log = transport.log();
        (drive(vendor), transport, log)
    }

    #[test]
    fn init_sends_preop_pdos_then_reset() {
        let (mut d, mut t, log) = setup(DriveVendor::Kinco);
        d.init(&mut t).unwrap();
        let commands = log.commands();
        assert_eq!(commands.first().map(String::as_str), Some("[1] 2 preop"));
        assert_eq!(
            &commands[commands.len() - 3..],
            &[
                "[1] 2 write 0x6040 0 u16 0x6",
                "[1] 2 write 0x6040 0 u16 0x80",
                "[1] 2 write 0x6040 0 u16 0x6",
            ]
        );
        assert!(commands.contains(&"[1] 2 write 0x1603 1 u32 0x60f60810".to_string()));
        assert_eq!(d.state(), DriveState::ReadyToSwitchOn);
    }

    #[test]
    fn init_is_idempotent_on_success() {
        let (mut d, mut t, log) = setup(DriveVendor::Kinco);
        d.init(&mut t).unwrap();
        let first = log.commands();
        log.clear();
        d.init(&mut t).unwrap();
        assert_eq!(log.commands(), first);
    }

    #[test]
    fn pdo_failure_aborts_remaining_steps() {
        let mut t = LoopbackTransport::new().fail_matching("0x1a01 1");
        let log = t.log();
        let mut d = drive(DriveVendor::Kinco);
        let err = d.init(&mut t).unwrap_err();
        assert_eq!(
            err,
            DriveError::PdoConfig {
                step: "TPDO2 position/velocity",
                node_id: 2
            }
        );
        let commands = log.commands();
        assert_eq!(commands.last().unwrap(), "[1] 2 write 0x1a01 1 u32 0x60640020");
        assert!(log.matching("0x1a02").is_empty());
        assert!(log.matching("0x6040").is_empty());
    }

    #[test]
    fn kinco_position_sequence() {
        let d = drive(DriveVendor::Kinco);
        let lines: Vec<String> = d
            .mode_sequence(ControlMode::Position)
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(
            lines,
            vec![
                "[1] 2 start",
                "[1] 2 write 0x6040 0 u16 0xf",
                "[1] 2 write 0x6060 0 i8 1",
                "[1] 2 write 0x6081 0 i32 4000000",
                "[1] 2 write 0x6083 0 i32 240000",
                "[1] 2 write 0x6084 0 i32 240000",
                "[1] 2 write 0x6040 0 u16 0x103f",
            ]
        );
    }

    #[test]
    fn standard_position_sequence_has_no_instant_flag() {
        let d = drive(DriveVendor::Standard);
        let lines: Vec<String> = d
            .mode_sequence(ControlMode::Position)
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(lines.len(), 6);
        assert!(!lines.iter().any(|l| l.ends_with("0x103f")));
    }

    #[test]
    fn torque_and_velocity_sequences() {
        let d = drive(DriveVendor::Kinco);
        let torque: Vec<String> = d
            .mode_sequence(ControlMode::Torque)
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(
            torque,
            vec![
                "[1] 2 start",
                "[1] 2 write 0x6040 0 u16 0xf",
                "[1] 2 write 0x6060 0 i8 4",
            ]
        );
        let velocity = d.mode_sequence(ControlMode::Velocity);
        assert_eq!(velocity.len(), 5);
        assert_eq!(velocity[2].to_string(), "[1] 2 write 0x6060 0 i8 3");
    }

    #[test]
    fn reset_error_is_exactly_three_writes() {
        let (mut d, mut t, log) = setup(DriveVendor::Standard);
        d.reset_error(&mut t).unwrap();
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn mode_init_failure_clears_control_mode() {
        let mut t = LoopbackTransport::new().fail_matching("0x6060");
        let log = t.log();
        let mut d = drive(DriveVendor::Kinco);
        d.preop(&mut t).unwrap();
        assert!(d.init_torque_control(&mut t).is_err());
        assert_eq!(d.control_mode(), ControlMode::None);
        assert!(log.commands().last().unwrap().contains("0x6060"));
    }

    #[test]
    fn targets_require_operation_enabled() {
        let (mut d, mut t, _log) = setup(DriveVendor::Kinco);
        assert!(matches!(
            d.set_target_torque(&mut t, 10),
            Err(DriveError::NotOperational(DriveState::NotReadyToSwitchOn))
        ));
    }

    #[test]
    fn targets_require_matching_mode() {
        let (mut d, mut t, _log) = setup(DriveVendor::Kinco);
        d.init(&mut t).unwrap();
        d.init_torque_control(&mut t).unwrap();
        assert!(matches!(
            d.set_target_velocity(&mut t, 100),
            Err(DriveError::ModeMismatch {
                configured: ControlMode::Torque,
                requested: ControlMode::Velocity
            })
        ));
    }

    #[test]
    fn kinco_torque_target_uses_remapped_object() {
        let (mut d, mut t, log) = setup(DriveVendor::Kinco);
        d.init(&mut t).unwrap();
        d.init_torque_control(&mut t).unwrap();
        log.clear();
        d.set_target_torque(&mut t, -35).unwrap();
        assert_eq!(log.commands(), vec!["[1] 2 write 0x60f6 8 i16 -35"]);
    }

    #[test]
    fn standard_position_target_is_confirmed() {
        let (mut d, mut t, log) = setup(DriveVendor::Standard);
        d.init(&mut t).unwrap();
        d.init_position_control(&mut t).unwrap();
        log.clear();
        d.set_target_position(&mut t, 1600).unwrap();
        assert_eq!(
            log.commands(),
            vec![
                "[1] 2 write 0x607a 0 i32 1600",
                "[1] 2 write 0x6040 0 u16 0x3f",
                "[1] 2 write 0x6040 0 u16 0x2f",
            ]
        );
    }

    #[test]
    fn kinco_position_target_needs_no_confirmation() {
        let (mut d, mut t, log) = setup(DriveVendor::Kinco);
        d.init(&mut t).unwrap();
        d.init_position_control(&mut t).unwrap();
        log.clear();
        d.set_target_position(&mut t, 1600).unwrap();
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn refresh_reads_process_data() {
        let mut t = LoopbackTransport::new()
            .with_value(0x6064, 0, 4200)
            .with_value(0x606C, 0, -15)
            .with_value(0x6078, 0, 33);
        let mut d = drive(DriveVendor::Kinco);
        d.init(&mut t).unwrap();
        d.init_torque_control(&mut t).unwrap();
        let data = d.refresh(&mut t).unwrap();
        assert_eq!(data.position, 4200);
        assert_eq!(data.velocity, -15);
        assert_eq!(data.torque, 33);
        assert_eq!(d.state(), DriveState::OperationEnabled);
    }

    #[test]
    fn refresh_adopts_reported_fault() {
        let mut t = LoopbackTransport::new().with_value(0x6041, 0, 0x0008);
        let mut d = drive(DriveVendor::Standard);
        d.refresh(&mut t).unwrap();
        assert_eq!(d.state(), DriveState::Fault);
    }

    #[test]
    fn disable_leaves_switch_on_disabled() {
        let (mut d, mut t, log) = setup(DriveVendor::Kinco);
        d.init(&mut t).unwrap();
        d.init_torque_control(&mut t).unwrap();
        log.clear();
        d.disable(&mut t).unwrap();
        assert_eq!(
            log.commands(),
            vec!["[1] 2 write 0x6040 0 u16 0x6", "[1] 2 write 0x6040 0 u16 0x0"]
        );
        assert_eq!(d.state(), DriveState::SwitchOnDisabled);
        assert_eq!(d.control_mode(), ControlMode::None);
    }

    #[test]
    fn generic_sdo_helpers() {
        let mut t = LoopbackTransport::new().with_value(0x2010, 0, 7);
        let log = t.log();
        let mut d = drive(DriveVendor::Kinco);
        assert_eq!(d.read_sdo(&mut t, 0x2010, DataType::U8).unwrap(), 7);
        d.write_sdo(&mut t, 0x2381, 300).unwrap();
        assert_eq!(
            log.commands(),
            vec!["[1] 2 read 0x2010 0 u8", "[1] 2 write 0x2381 0 i32 0x12c"]
        );
    }

    #[test]
    fn rejected_reply_surfaces_abort_code() {
        let mut t = LoopbackTransport::new().fail_at(1);
        let mut d = drive(DriveVendor::Standard);
        assert!(matches!(
            d.start(&mut t),
            Err(DriveError::Rejected { code: 0x0800_0000, .. })
        ));
    }
}
