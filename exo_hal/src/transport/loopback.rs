//! Recording transport.
//!
//! Every command line is appended to a shared [`CommandLog`] before it is
//! answered, including the ones the transport is told to reject. Control
//! words are tracked through a [`Lifecycle`] so status-word reads reflect
//! what was written.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use exo_common::drive::{DriveError, Register};

use super::Transport;
use crate::codec::{Command, Request};
use crate::lifecycle::{Lifecycle, LifecycleEvent};

/// Abort code used for injected rejections (general error).
pub const INJECTED_ABORT: u32 = 0x0800_0000;

/// Shared, cloneable view of the commands a loopback transport received.
#[derive(Debug, Clone, Default)]
pub struct CommandLog {
    inner: Arc<Mutex<Vec<String>>>,
}

impl CommandLog {
    fn lock(&self) -> MutexGuard<'_, Vec<String>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn push(&self, line: &str) {
        self.lock().push(line.to_string());
    }

    /// Snapshot of every line received so far.
    pub fn commands(&self) -> Vec<String> {
        self.lock().clone()
    }

    /// Lines containing `pattern`.
    pub fn matching(&self, pattern: &str) -> Vec<String> {
        self.lock()
            .iter()
            .filter(|l| l.contains(pattern))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

/// Transport that answers every command locally.
#[derive(Debug)]
pub struct LoopbackTransport {
    log: CommandLog,
    sent: usize,
    fail_at: Option<usize>,
    fail_matching: Option<String>,
    values: HashMap<(u16, u8), i64>,
    device: Lifecycle,
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackTransport {
    /// Loopback with a booted device (SwitchOnDisabled).
    pub fn new() -> Self {
        let mut device = Lifecycle::new();
        device.handle_event(LifecycleEvent::InitComplete);
        Self {
            log: CommandLog::default(),
            sent: 0,
            fail_at: None,
            fail_matching: None,
            values: HashMap::new(),
            device,
        }
    }

    /// Reject the `n`-th command (1-based).
    pub fn fail_at(mut self, n: usize) -> Self {
        self.fail_at = Some(n);
        self
    }

    /// Reject every command containing `pattern`.
    pub fn fail_matching(mut self, pattern: &str) -> Self {
        self.fail_matching = Some(pattern.to_string());
        self
    }

    /// Value returned for reads of `address`/`subindex`.
    pub fn with_value(mut self, address: u16, subindex: u8, value: i64) -> Self {
        self.values.insert((address, subindex), value);
        self
    }

    pub fn set_value(&mut self, address: u16, subindex: u8, value: i64) {
        self.values.insert((address, subindex), value);
    }

    /// Handle onto the command log; stays valid after the transport is boxed.
    pub fn log(&self) -> CommandLog {
        self.log.clone()
    }

    fn should_fail(&self, line: &str) -> bool {
        self.fail_at == Some(self.sent)
            || self
                .fail_matching
                .as_deref()
                .is_some_and(|p| line.contains(p))
    }

    fn answer(&mut self, line: &str) -> String {
        let seq = self.sent;
        let Ok(request) = line.parse::<Request>() else {
            return format!("[{seq}] ERROR: 0x{INJECTED_ABORT:x}");
        };
        match request.command {
            Command::Write {
                address,
                subindex,
                data_type,
                value,
            } => {
                let value = value.as_i64(data_type);
                if address == Register::ControlWord.default_address() {
                    self.device.apply_control_word(value as u16);
                }
                self.values.insert((address, subindex), value);
                format!("[{seq}] OK")
            }
            Command::Read {
                address,
                subindex,
                data_type,
            } => {
                let value = if address == Register::StatusWord.default_address() {
                    self.values
                        .get(&(address, subindex))
                        .copied()
                        .unwrap_or(self.device.state().status_bits() as i64)
                } else {
                    self.values.get(&(address, subindex)).copied().unwrap_or(0)
                };
                format!("[{seq}] {}", data_type.normalize(value))
            }
            Command::Nmt(_) => format!("[{seq}] OK"),
        }
    }
}

impl Transport for LoopbackTransport {
    fn name(&self) -> &'static str {
        "loopback"
    }

    fn send(&mut self, line: &str) -> Result<String, DriveError> {
        self.sent += 1;
        self.log.push(line);
        if self.should_fail(line) {
            return Ok(format!("[{}] ERROR: 0x{INJECTED_ABORT:x}", self.sent));
        }
        Ok(self.answer(line))
    }
}
