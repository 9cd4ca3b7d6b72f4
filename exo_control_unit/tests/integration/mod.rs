//! Shared fixtures for the integration tests.

mod calibration;
mod config_loading;
mod mode_switching;
mod simulation;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use exo_common::control::{InteractionWrenchMessage, JointStateMessage};
use exo_common::drive::DriveError;
use exo_control_unit::config::{ExoConfig, load_config_from_str};
use exo_control_unit::telemetry::TelemetrySink;
use exo_hal::transport::{CommandLog, LoopbackTransport, Transport};

/// Configuration for one drive of `vendor` over transport `kind`.
pub fn config(vendor: &str, kind: &str) -> ExoConfig {
    load_config_from_str(&format!(
        r#"
[shared]
service_name = "exo-it"

[drive]
vendor = "{vendor}"

[transport]
kind = "{kind}"

[transport.simulation]
fixed_step_us = 1250
"#
    ))
    .unwrap()
}

/// Object values the test can change after the transport has been boxed.
#[derive(Debug, Clone, Default)]
pub struct BusValues {
    inner: Arc<Mutex<HashMap<(u16, u8), i64>>>,
}

impl BusValues {
    pub fn set(&self, address: u16, subindex: u8, value: i64) {
        self.inner.lock().unwrap().insert((address, subindex), value);
    }
}

/// Loopback transport whose read values follow a shared [`BusValues`].
pub struct ScriptedBus {
    loopback: LoopbackTransport,
    values: BusValues,
}

impl ScriptedBus {
    pub fn new() -> (Self, BusValues, CommandLog) {
        let loopback = LoopbackTransport::new();
        let log = loopback.log();
        let values = BusValues::default();
        let bus = Self {
            loopback,
            values: values.clone(),
        };
        (bus, values, log)
    }
}

impl Transport for ScriptedBus {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn send(&mut self, line: &str) -> Result<String, DriveError> {
        for (&(address, subindex), &value) in self.values.inner.lock().unwrap().iter() {
            self.loopback.set_value(address, subindex, value);
        }
        self.loopback.send(line)
    }
}

/// Sink remembering every published message.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    pub records: Arc<Mutex<Vec<(JointStateMessage, InteractionWrenchMessage)>>>,
}

impl RecordingSink {
    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn last(&self) -> Option<(JointStateMessage, InteractionWrenchMessage)> {
        self.records.lock().unwrap().last().cloned()
    }
}

impl TelemetrySink for RecordingSink {
    fn publish(&mut self, joint_state: &JointStateMessage, wrench: &InteractionWrenchMessage) {
        self.records
            .lock()
            .unwrap()
            .push((joint_state.clone(), wrench.clone()));
    }
}

/// Deterministic tick clock advancing one nominal cycle per call.
pub struct TickClock {
    now: Instant,
    cycle: Duration,
}

impl TickClock {
    pub fn new(config: &ExoConfig) -> Self {
        Self {
            now: Instant::now(),
            cycle: config.cycle_time(),
        }
    }

    pub fn next(&mut self) -> Instant {
        self.now += self.cycle;
        self.now
    }
}
