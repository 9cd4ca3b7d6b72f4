//! # EXO Control Unit
//!
//! Loads the configuration, initialises the drive through the configured
//! transport, enters the control state and runs the periodic loop until
//! SIGINT/SIGTERM. The drive is disabled on the way out.
//!
//! Parameter and command events are read from stdin as JSON lines;
//! telemetry goes to stdout as JSON lines, logs to stderr.

use clap::{Parser, ValueEnum};
use exo_common::consts::DEFAULT_CONFIG_PATH;
use exo_control_unit::config::{ExoConfig, load_config};
use exo_control_unit::cycle::{CycleRunner, rt_setup};
use exo_control_unit::joint::{DriveJoint, RobotJoint};
use exo_control_unit::telemetry::{JsonLinesSink, TelemetrySink, TracingSink, spawn_stdin_reader};
use exo_hal::TransportRegistry;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

/// Where per-tick telemetry goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TelemetryOutput {
    /// JSON lines on stdout.
    Stdout,
    /// TRACE-level log events.
    Log,
}

/// EXO Control Unit - single-joint exoskeleton controller
#[derive(Parser, Debug)]
#[command(name = "exo_control_unit")]
#[command(version)]
#[command(about = "Periodic control loop for one exoskeleton joint actuator")]
struct Args {
    /// Path to the configuration TOML.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override `[transport] kind` (gateway, loopback, simulation).
    #[arg(long)]
    transport: Option<String>,

    /// Telemetry destination.
    #[arg(long, value_enum, default_value_t = TelemetryOutput::Stdout)]
    telemetry: TelemetryOutput,

    /// CPU core to pin the control thread to (default: 1).
    #[arg(long, default_value_t = 1)]
    cpu_core: usize,

    /// SCHED_FIFO priority (default: 80).
    #[arg(long, default_value_t = 80)]
    rt_priority: i32,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();
    let loaded = load_config(&args.config);

    let level = match (&loaded, args.verbose) {
        (_, true) => Level::DEBUG,
        (Ok(config), false) => config
            .shared
            .log_level
            .as_directive()
            .parse()
            .unwrap_or(Level::INFO),
        (Err(_), false) => Level::INFO,
    };
    setup_tracing(&args, level);

    info!("EXO Control Unit v{} starting...", env!("CARGO_PKG_VERSION"));

    let result = loaded
        .map_err(|e| Box::new(e) as Box<dyn std::error::Error>)
        .and_then(|config| run(&args, config));
    if let Err(e) = result {
        error!("FATAL: {e}");
        process::exit(1);
    }

    info!("EXO Control Unit shutdown complete");
}

fn run(args: &Args, mut config: ExoConfig) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(kind) = &args.transport {
        config.transport.kind = kind.clone();
    }
    info!(
        service = %config.shared.service_name,
        node_id = config.drive.node_id,
        vendor = %config.drive.vendor,
        transport = %config.transport.kind,
        cycle_time_us = config.control.cycle_time_us,
        "Config OK"
    );

    rt_setup(args.cpu_core, args.rt_priority)?;
    info!(
        "RT setup complete (cpu_core={}, priority={})",
        args.cpu_core, args.rt_priority
    );

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    })?;

    let registry = TransportRegistry::with_builtin();
    let transport = registry.create(&config.transport, config.drive.identity())?;
    let mut joint = DriveJoint::new(&config, transport);
    joint.initialize()?;

    let (events, _reader) = spawn_stdin_reader()?;
    let sink: Box<dyn TelemetrySink> = match args.telemetry {
        TelemetryOutput::Stdout => Box::new(JsonLinesSink::new(std::io::stdout())),
        TelemetryOutput::Log => Box::new(TracingSink),
    };

    let mut runner = CycleRunner::new(&config, joint, events, sink);
    runner.start()?;

    let result = runner.run(&running);
    runner.shutdown()?;
    result?;
    Ok(())
}

/// Setup tracing subscriber based on CLI arguments. Logs go to stderr.
fn setup_tracing(args: &Args, level: Level) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .compact()
            .init();
    }
}
