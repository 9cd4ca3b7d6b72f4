//! Simulated gateway.
//!
//! Parses the wire strings literally and emulates a single drive: the CiA 402
//! lifecycle, modes of operation 1/3/4, a one-sided mechanical hard stop and
//! an interaction torque sensor with a constant bias. All quantities are in
//! drive counts.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use exo_common::consts::{INTERACTION_SENSOR_ADDRESS, INTERACTION_SENSOR_SUBINDEX};
use exo_common::drive::{DriveError, Register};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::{DriveIdentity, Transport};
use crate::codec::{Command, NmtCommand, Request};
use crate::lifecycle::{Lifecycle, LifecycleEvent};
use crate::vendor::AddressMap;

/// Abort code returned for objects the simulation refuses.
const ABORT_NO_OBJECT: u32 = 0x0602_0000;

/// Longest physics step taken for one sync.
const MAX_STEP: Duration = Duration::from_millis(50);

/// `[transport.simulation]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Encoder position at power-up.
    pub initial_position: i32,
    /// Mechanical hard stop; the joint cannot move below it.
    pub hard_stop: i32,
    pub sensor_address: u16,
    pub sensor_subindex: u8,
    /// Sensor reading added while pushing into the hard stop.
    pub contact_torque: i32,
    /// Constant sensor offset.
    pub sensor_bias: i32,
    /// Position-mode tracking bandwidth [1/s].
    pub position_gain: f64,
    /// Torque-mode acceleration per torque count [counts/s² per count].
    pub torque_gain: f64,
    /// Torque-mode viscous damping [1/s].
    pub damping: f64,
    /// Physics step per sync in µs; 0 steps by wall-clock time.
    pub fixed_step_us: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            initial_position: 3_000,
            hard_stop: -1_500,
            sensor_address: INTERACTION_SENSOR_ADDRESS,
            sensor_subindex: INTERACTION_SENSOR_SUBINDEX,
            contact_torque: 300,
            sensor_bias: 50,
            position_gain: 20.0,
            torque_gain: 50.0,
            damping: 5.0,
            fixed_step_us: 0,
        }
    }
}

/// In-process transport emulating one drive behind a gateway.
pub struct SimulatedGateway {
    identity: DriveIdentity,
    config: SimulationConfig,
    addresses: AddressMap,
    lifecycle: Lifecycle,
    started: bool,
    mode: i8,
    objects: HashMap<(u16, u8), i64>,
    position: f64,
    velocity: f64,
    at_stop: bool,
    last_sync: Option<Instant>,
    seq: u64,
}

impl SimulatedGateway {
    pub fn new(identity: DriveIdentity, config: SimulationConfig) -> Self {
        let mut lifecycle = Lifecycle::new();
        lifecycle.handle_event(LifecycleEvent::InitComplete);
        let position = f64::from(config.initial_position.max(config.hard_stop));
        Self {
            identity,
            addresses: AddressMap::for_vendor(identity.vendor),
            config,
            lifecycle,
            started: false,
            mode: 0,
            objects: HashMap::new(),
            position,
            velocity: 0.0,
            at_stop: false,
            last_sync: None,
            seq: 0,
        }
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn velocity(&self) -> f64 {
        self.velocity
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn target(&self, register: Register) -> f64 {
        let key = (
            self.addresses.address(register),
            self.addresses.subindex(register),
        );
        self.objects.get(&key).copied().unwrap_or(0) as f64
    }

    /// Started on the bus and enabled; only then does the drive act on targets.
    fn driving(&self) -> bool {
        self.started && self.lifecycle.is_operational()
    }

    fn actual_torque(&self) -> i64 {
        if self.driving() && self.mode == 4 {
            self.target(Register::TargetTor) as i64
        } else {
            0
        }
    }

    fn sensor(&self) -> i64 {
        let contact = if self.at_stop {
            self.config.contact_torque
        } else {
            0
        };
        i64::from(self.config.sensor_bias + contact)
    }

    /// Advance the joint model by `dt`.
    pub fn step(&mut self, dt: Duration) {
        let dt = dt.min(MAX_STEP).as_secs_f64();
        let pushing_down = match (self.driving(), self.mode) {
            (true, 1) => {
                self.velocity =
                    (self.target(Register::TargetPos) - self.position) * self.config.position_gain;
                self.velocity < 0.0
            }
            (true, 3) => {
                self.velocity = self.target(Register::TargetVel);
                self.velocity < 0.0
            }
            (true, 4) => {
                let torque = self.target(Register::TargetTor);
                self.velocity +=
                    (torque * self.config.torque_gain - self.config.damping * self.velocity) * dt;
                torque < 0.0
            }
            _ => {
                self.velocity = 0.0;
                false
            }
        };

        self.position += self.velocity * dt;
        let stop = f64::from(self.config.hard_stop);
        if self.position <= stop {
            self.position = stop;
            self.velocity = self.velocity.max(0.0);
            self.at_stop = pushing_down;
        } else {
            self.at_stop = false;
        }
        trace!(
            position = self.position,
            velocity = self.velocity,
            at_stop = self.at_stop,
            "Simulation step"
        );
    }

    fn read(&self, address: u16, subindex: u8) -> Option<i64> {
        if address == self.config.sensor_address && subindex == self.config.sensor_subindex {
            return Some(self.sensor());
        }
        let value = match self.addresses.register_at(address) {
            Some(Register::StatusWord) => i64::from(self.lifecycle.state().status_bits()),
            Some(Register::ActualPos) => self.position.round() as i64,
            Some(Register::ActualVel) => self.velocity.round() as i64,
            Some(Register::ActualTor) => self.actual_torque(),
            Some(Register::ModesOfOperation) => i64::from(self.mode),
            _ => return self.objects.get(&(address, subindex)).copied(),
        };
        Some(value)
    }

    fn write(&mut self, address: u16, subindex: u8, value: i64) {
        match self.addresses.register_at(address) {
            Some(Register::ControlWord) => {
                self.lifecycle.apply_control_word(value as u16);
            }
            Some(Register::ModesOfOperation) => {
                self.mode = value as i8;
                debug!(mode = self.mode, "Simulated drive mode of operation");
            }
            _ => {}
        }
        self.objects.insert((address, subindex), value);
    }

    fn nmt(&mut self, command: NmtCommand) {
        match command {
            NmtCommand::Start => self.started = true,
            NmtCommand::PreOperational | NmtCommand::Stop => self.started = false,
            NmtCommand::ResetNode => {
                self.started = false;
                self.objects.clear();
                self.mode = 0;
                self.lifecycle = Lifecycle::new();
                self.lifecycle.handle_event(LifecycleEvent::InitComplete);
            }
        }
    }
}

impl Transport for SimulatedGateway {
    fn name(&self) -> &'static str {
        "simulation"
    }

    fn send(&mut self, line: &str) -> Result<String, DriveError> {
        self.seq += 1;
        let seq = self.seq;
        let request: Request = line.parse()?;
        if request.node_id != self.identity.node_id || request.bus != self.identity.bus {
            // Nobody answers on the bus.
            return Err(DriveError::Timeout(line.to_string()));
        }

        let reply = match request.command {
            Command::Write {
                address,
                subindex,
                data_type,
                value,
            } => {
                self.write(address, subindex, value.as_i64(data_type));
                format!("[{seq}] OK")
            }
            Command::Read {
                address,
                subindex,
                data_type,
            } => match self.read(address, subindex) {
                Some(v) => format!("[{seq}] {}", data_type.normalize(v)),
                None => format!("[{seq}] ERROR: 0x{ABORT_NO_OBJECT:x}"),
            },
            Command::Nmt(command) => {
                self.nmt(command);
                format!("[{seq}] OK")
            }
        };
        Ok(reply)
    }

    fn sync(&mut self) -> Result<(), DriveError> {
        let dt = if self.config.fixed_step_us > 0 {
            Duration::from_micros(self.config.fixed_step_us)
        } else {
            let now = Instant::now();
            let dt = self
                .last_sync
                .map_or(Duration::ZERO, |last| now.duration_since(last));
            self.last_sync = Some(now);
            dt
        };
        self.step(dt);
        Ok(())
    }
}
