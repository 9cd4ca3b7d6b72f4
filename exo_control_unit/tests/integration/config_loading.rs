//! Configuration loading from disk.

use std::io::Write;
use std::path::Path;

use exo_common::config::ConfigError;
use exo_control_unit::config::load_config;
use exo_hal::{DriveVendor, TransportRegistry};

const SAMPLE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../config/exo.toml");

#[test]
fn sample_config_loads_and_validates() {
    let config = load_config(Path::new(SAMPLE)).unwrap();
    assert_eq!(config.shared.service_name, "exo-m1");
    assert_eq!(config.drive.vendor, DriveVendor::Kinco);
    assert_eq!(config.joint.sensor_address, 0x2205);
    assert_eq!(config.trigger.subindex, 14);
    assert_eq!(config.control.cycle_time_us, 1250);
    assert_eq!(config.transport.simulation.hard_stop, -1500);
}

#[test]
fn sample_transport_is_registered() {
    let config = load_config(Path::new(SAMPLE)).unwrap();
    let registry = TransportRegistry::with_builtin();
    assert!(registry.contains(&config.transport.kind));
    let transport = registry
        .create(&config.transport, config.drive.identity())
        .unwrap();
    assert_eq!(transport.name(), "simulation");
}

#[test]
fn edited_copy_is_validated() {
    let sample = std::fs::read_to_string(SAMPLE).unwrap();
    let broken = sample.replace("node_id = 1\nvendor", "node_id = 200\nvendor");
    assert_ne!(sample, broken);

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(broken.as_bytes()).unwrap();
    let err = load_config(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::ValidationError(ref m) if m.contains("drive.node_id")));
}

#[test]
fn unparsable_file_is_a_parse_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"[shared\nservice_name = ").unwrap();
    assert!(matches!(
        load_config(file.path()),
        Err(ConfigError::ParseError(_))
    ));
}

#[test]
fn missing_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");
    assert!(matches!(
        load_config(&path),
        Err(ConfigError::FileNotFound(_))
    ));
}
