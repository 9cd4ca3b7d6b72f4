//! Telemetry publication and inbound event delivery.
//!
//! Outbound: one joint-state and one interaction-wrench record per tick,
//! through a [`TelemetrySink`]. Inbound: JSON-lines [`ExternalEvent`]s read on
//! a helper thread and drained by the cycle in a bounded, non-blocking poll.

use std::io::{BufRead, Write};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use serde::Serialize;
use tracing::{debug, trace, warn};

use exo_common::control::{ExternalEvent, InteractionWrenchMessage, JointStateMessage};

// ─── Outbound ───────────────────────────────────────────────────────

/// One published record, tagged by topic.
#[derive(Debug, Serialize)]
#[serde(tag = "topic", rename_all = "snake_case")]
pub enum TelemetryRecord<'a> {
    JointState(&'a JointStateMessage),
    InteractionWrench(&'a InteractionWrenchMessage),
}

/// Destination of per-tick telemetry.
pub trait TelemetrySink {
    fn publish(&mut self, joint_state: &JointStateMessage, wrench: &InteractionWrenchMessage);
}

/// Writes each record as one JSON line.
pub struct JsonLinesSink<W: Write> {
    writer: W,
    failed: bool,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            failed: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_record(&mut self, record: &TelemetryRecord<'_>) -> std::io::Result<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")
    }
}

impl<W: Write> TelemetrySink for JsonLinesSink<W> {
    fn publish(&mut self, joint_state: &JointStateMessage, wrench: &InteractionWrenchMessage) {
        let result = self
            .write_record(&TelemetryRecord::JointState(joint_state))
            .and_then(|()| self.write_record(&TelemetryRecord::InteractionWrench(wrench)))
            .and_then(|()| self.writer.flush());
        match result {
            Ok(()) => self.failed = false,
            // Warn once per outage, not once per tick.
            Err(e) if !self.failed => {
                self.failed = true;
                warn!(error = %e, "Telemetry write failed");
            }
            Err(_) => {}
        }
    }
}

/// Emits telemetry as `trace!` events.
#[derive(Debug, Default)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn publish(&mut self, joint_state: &JointStateMessage, wrench: &InteractionWrenchMessage) {
        trace!(
            name = %joint_state.name,
            position = joint_state.position,
            velocity = joint_state.velocity,
            effort = joint_state.effort,
            torque_y = wrench.torque_y,
            torque_z = wrench.torque_z,
            "Telemetry"
        );
    }
}

// ─── Inbound ────────────────────────────────────────────────────────

/// Parse one JSON line into an event. Blank lines yield `None`.
pub fn parse_event_line(line: &str) -> Option<Result<ExternalEvent, serde_json::Error>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    Some(serde_json::from_str(line))
}

/// Forward every event read from `reader` into `tx` until EOF or the
/// receiver is dropped. Malformed lines are logged and skipped.
pub fn forward_events<R: BufRead>(reader: R, tx: &Sender<ExternalEvent>) {
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Event input read failed");
                break;
            }
        };
        match parse_event_line(&line) {
            None => {}
            Some(Ok(event)) => {
                if tx.send(event).is_err() {
                    break;
                }
            }
            Some(Err(e)) => warn!(error = %e, line = %line, "Ignoring malformed event"),
        }
    }
    debug!("Event input closed");
}

/// Spawn the stdin reader thread.
pub fn spawn_stdin_reader() -> std::io::Result<(Receiver<ExternalEvent>, JoinHandle<()>)> {
    let (tx, rx) = mpsc::channel();
    let handle = thread::Builder::new()
        .name("exo-events".to_string())
        .spawn(move || forward_events(std::io::stdin().lock(), &tx))?;
    Ok((rx, handle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use exo_common::control::{ControllerMode, JointCommand};
    use std::io::Cursor;

    #[test]
    fn json_lines_records() {
        let mut sink = JsonLinesSink::new(Vec::new());
        let state = JointStateMessage::new("M1_joint", 10.0, -1.0, 0.5, None);
        let wrench = InteractionWrenchMessage::new(2.0, 0.25);
        sink.publish(&state, &wrench);
        let out = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["topic"], "joint_state");
        assert_eq!(first["name"], "M1_joint");
        assert_eq!(first["position"], 10.0);

        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["topic"], "interaction_wrench");
        assert_eq!(second["frame_id"], "interaction_torque_sensor");
        assert_eq!(second["torque_y"], -2.0);
        assert_eq!(second["torque_z"], 0.25);
    }

    #[test]
    fn parse_lines() {
        assert!(parse_event_line("   ").is_none());
        let event = parse_event_line(r#"{"type":"parameters","kp":2.0,"controller_mode":4}"#)
            .unwrap()
            .unwrap();
        match event {
            ExternalEvent::Parameters(p) => {
                assert_eq!(p.kp, 2.0);
                assert_eq!(p.controller_mode, ControllerMode::VirtualSpring);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(parse_event_line("{not json").unwrap().is_err());
    }

    #[test]
    fn forwards_valid_lines_only() {
        let input = concat!(
            r#"{"type":"joint_command","position":1.0,"velocity":0.0,"effort":2.0}"#,
            "\n\ngarbage\n",
            r#"{"type":"interaction_torque","data":[0.5]}"#,
            "\n"
        );
        let (tx, rx) = mpsc::channel();
        forward_events(Cursor::new(input), &tx);
        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![
                ExternalEvent::JointCommand(JointCommand {
                    position: 1.0,
                    velocity: 0.0,
                    effort: 2.0
                }),
                ExternalEvent::InteractionTorque(
                    exo_common::control::InteractionTorqueCommand { data: vec![0.5] }
                ),
            ]
        );
    }

    #[test]
    fn stops_when_receiver_dropped() {
        let input = concat!(r#"{"type":"interaction_torque","data":[]}"#, "\n").repeat(3);
        let (tx, rx) = mpsc::channel();
        drop(rx);
        forward_events(Cursor::new(input), &tx);
    }
}
