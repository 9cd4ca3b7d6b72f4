//! Periodic control cycle: refresh → control law → publish → events.
//!
//! ## RT Setup Sequence
//! 1. `mlockall(MCL_CURRENT | MCL_FUTURE)` - lock all pages.
//! 2. Prefault stack pages.
//! 3. `sched_setaffinity` - pin to one CPU core.
//! 4. `sched_setscheduler(SCHED_FIFO, prio)` - RT priority.
//!
//! ## Cycle Loop
//! Absolute-time sleep on `CLOCK_MONOTONIC` with the `rt` feature,
//! `thread::sleep` to the next boundary otherwise. Overruns are counted,
//! not fatal. The loop ends when the running flag clears.
//!
//! ## Cycle Body
//! 1. Refresh the joint (process data, interaction sensor).
//! 2. Run the control law of the current mode.
//! 3. Publish joint state and interaction wrench.
//! 4. Drain at most `max_events_per_tick` inbound events.
//!
//! Events are applied only in step 4, so the control law of one tick always
//! sees one consistent parameter snapshot.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, info, warn};

use exo_common::control::ExternalEvent;
use exo_common::drive::DriveError;

use crate::config::ExoConfig;
use crate::controller::JointController;
use crate::joint::RobotJoint;
use crate::telemetry::TelemetrySink;

// ─── Cycle Statistics ───────────────────────────────────────────────

/// O(1) per-cycle timing statistics.
#[derive(Debug, Clone)]
pub struct CycleStats {
    /// Total cycles executed.
    pub cycle_count: u64,
    /// Last cycle duration [ns].
    pub last_cycle_ns: i64,
    /// Minimum cycle duration [ns].
    pub min_cycle_ns: i64,
    /// Maximum cycle duration [ns].
    pub max_cycle_ns: i64,
    /// Running sum for average computation.
    pub sum_cycle_ns: i64,
    /// Cycles whose body ran longer than the cycle time.
    pub overruns: u64,
    /// Maximum wake-up latency [ns].
    pub max_latency_ns: i64,
}

impl CycleStats {
    pub const fn new() -> Self {
        Self {
            cycle_count: 0,
            last_cycle_ns: 0,
            min_cycle_ns: i64::MAX,
            max_cycle_ns: 0,
            sum_cycle_ns: 0,
            overruns: 0,
            max_latency_ns: 0,
        }
    }

    /// Record a cycle duration.
    #[inline]
    pub fn record(&mut self, duration_ns: i64, latency_ns: i64) {
        self.cycle_count += 1;
        self.last_cycle_ns = duration_ns;
        self.min_cycle_ns = self.min_cycle_ns.min(duration_ns);
        self.max_cycle_ns = self.max_cycle_ns.max(duration_ns);
        self.sum_cycle_ns += duration_ns;
        self.max_latency_ns = self.max_latency_ns.max(latency_ns);
    }

    /// Average cycle time [ns] (0 if no cycles).
    #[inline]
    pub fn avg_cycle_ns(&self) -> i64 {
        if self.cycle_count == 0 {
            0
        } else {
            self.sum_cycle_ns / self.cycle_count as i64
        }
    }
}

impl Default for CycleStats {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Errors ─────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum CycleError {
    /// RT setup failed (mlockall, affinity, scheduler).
    #[error("RT setup failed: {0}")]
    RtSetup(String),
    /// The controller could not enter its active state.
    #[error("controller entry failed: {0}")]
    Init(DriveError),
    /// The drive could not be disabled on shutdown.
    #[error("shutdown failed: {0}")]
    Shutdown(DriveError),
}

// ─── RT Setup ───────────────────────────────────────────────────────

#[cfg(feature = "rt")]
fn rt_mlockall() -> Result<(), CycleError> {
    use nix::sys::mman::{MlockallFlags, mlockall};
    mlockall(MlockallFlags::MCL_CURRENT | MlockallFlags::MCL_FUTURE)
        .map_err(|e| CycleError::RtSetup(format!("mlockall failed: {e}")))
}

#[cfg(not(feature = "rt"))]
fn rt_mlockall() -> Result<(), CycleError> {
    Ok(())
}

/// Touch a stack buffer so its pages are resident before the loop starts.
fn prefault_stack() {
    let mut buf = [0u8; 256 * 1024];
    for byte in buf.iter_mut() {
        // SAFETY: `byte` is a valid, aligned, exclusive reference into `buf`.
        unsafe { core::ptr::write_volatile(byte, 0xFF) };
    }
    core::hint::black_box(&buf);
}

#[cfg(feature = "rt")]
fn rt_set_affinity(cpu: usize) -> Result<(), CycleError> {
    use nix::sched::{CpuSet, sched_setaffinity};
    use nix::unistd::Pid;

    let mut cpuset = CpuSet::new();
    cpuset
        .set(cpu)
        .map_err(|e| CycleError::RtSetup(format!("CpuSet::set({cpu}) failed: {e}")))?;
    sched_setaffinity(Pid::from_raw(0), &cpuset)
        .map_err(|e| CycleError::RtSetup(format!("sched_setaffinity failed: {e}")))
}

#[cfg(not(feature = "rt"))]
fn rt_set_affinity(_cpu: usize) -> Result<(), CycleError> {
    Ok(())
}

#[cfg(feature = "rt")]
fn rt_set_scheduler(priority: i32) -> Result<(), CycleError> {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    // SAFETY: `param` is a valid sched_param for the duration of the call.
    let ret = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        return Err(CycleError::RtSetup(format!(
            "sched_setscheduler(SCHED_FIFO, {priority}) failed: {err}"
        )));
    }
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_set_scheduler(_priority: i32) -> Result<(), CycleError> {
    Ok(())
}

/// Perform the RT setup sequence. All steps except prefaulting are no-ops
/// without the `rt` feature.
pub fn rt_setup(cpu_core: usize, rt_priority: i32) -> Result<(), CycleError> {
    rt_mlockall()?;
    prefault_stack();
    rt_set_affinity(cpu_core)?;
    rt_set_scheduler(rt_priority)?;
    Ok(())
}

// ─── Cycle Runner ───────────────────────────────────────────────────

/// Owns the controller, the joint and the event/telemetry endpoints.
pub struct CycleRunner<J: RobotJoint> {
    controller: JointController,
    joint: J,
    events: Receiver<ExternalEvent>,
    sink: Box<dyn TelemetrySink>,
    cycle_time_ns: i64,
    max_events_per_tick: usize,
    stats: CycleStats,
}

impl<J: RobotJoint> CycleRunner<J> {
    pub fn new(
        config: &ExoConfig,
        joint: J,
        events: Receiver<ExternalEvent>,
        sink: Box<dyn TelemetrySink>,
    ) -> Self {
        Self {
            controller: JointController::new(config),
            joint,
            events,
            sink,
            cycle_time_ns: i64::from(config.control.cycle_time_us) * 1_000,
            max_events_per_tick: config.control.max_events_per_tick,
            stats: CycleStats::new(),
        }
    }

    pub fn controller(&self) -> &JointController {
        &self.controller
    }

    pub fn joint(&self) -> &J {
        &self.joint
    }

    pub fn stats(&self) -> &CycleStats {
        &self.stats
    }

    /// Run the controller entry actions.
    pub fn start(&mut self) -> Result<(), CycleError> {
        self.controller
            .enter(&mut self.joint)
            .map_err(CycleError::Init)
    }

    /// Execute one cycle body at time `now`.
    pub fn tick(&mut self, now: Instant) {
        if let Err(e) = self.joint.refresh() {
            warn!(error = %e, "Joint refresh failed");
        }

        self.controller.during(&mut self.joint, now);

        let joint_state = self.controller.joint_state(&self.joint);
        let wrench = self.controller.wrench(&self.joint);
        self.sink.publish(&joint_state, &wrench);

        for event in self.events.try_iter().take(self.max_events_per_tick) {
            self.controller.handle_event(event, &mut self.joint);
        }
    }

    /// Cycle until `running` clears.
    pub fn run(&mut self, running: &AtomicBool) -> Result<(), CycleError> {
        info!(cycle_time_ns = self.cycle_time_ns, "Entering control loop");

        #[cfg(feature = "rt")]
        let result = self.run_rt_loop(running);

        #[cfg(not(feature = "rt"))]
        let result = self.run_sim_loop(running);

        info!(
            cycles = self.stats.cycle_count,
            avg_ns = self.stats.avg_cycle_ns(),
            max_ns = self.stats.max_cycle_ns,
            overruns = self.stats.overruns,
            max_latency_ns = self.stats.max_latency_ns,
            "Control loop stopped"
        );
        result
    }

    /// Exit actions: disable the drive.
    pub fn shutdown(&mut self) -> Result<(), CycleError> {
        self.controller
            .exit(&mut self.joint)
            .map_err(CycleError::Shutdown)
    }

    fn record(&mut self, duration_ns: i64, latency_ns: i64) {
        self.stats.record(duration_ns, latency_ns);
        if duration_ns > self.cycle_time_ns {
            self.stats.overruns += 1;
            debug!(
                duration_ns,
                budget_ns = self.cycle_time_ns,
                "Cycle overrun"
            );
        }
    }

    /// RT cycle loop using `clock_nanosleep(TIMER_ABSTIME)`.
    #[cfg(feature = "rt")]
    fn run_rt_loop(&mut self, running: &AtomicBool) -> Result<(), CycleError> {
        use nix::time::{ClockId, ClockNanosleepFlags, clock_gettime, clock_nanosleep};

        let clock = ClockId::CLOCK_MONOTONIC;
        let now = || clock_gettime(clock).map_err(|e| CycleError::RtSetup(format!("clock_gettime: {e}")));
        let mut next_wake = now()?;

        while running.load(Ordering::Relaxed) {
            let cycle_start = now()?;
            let latency_ns = timespec_diff_ns(&cycle_start, &next_wake).max(0);

            self.tick(Instant::now());

            let cycle_end = now()?;
            self.record(timespec_diff_ns(&cycle_end, &cycle_start), latency_ns);

            next_wake = timespec_add_ns(next_wake, self.cycle_time_ns);
            let _ = clock_nanosleep(clock, ClockNanosleepFlags::TIMER_ABSTIME, &next_wake);
        }
        Ok(())
    }

    /// Simulation cycle loop using `std::thread::sleep`.
    #[cfg(not(feature = "rt"))]
    fn run_sim_loop(&mut self, running: &AtomicBool) -> Result<(), CycleError> {
        use std::time::Duration;

        let cycle = Duration::from_nanos(self.cycle_time_ns as u64);
        let mut next_wake = Instant::now();

        while running.load(Ordering::Relaxed) {
            let cycle_start = Instant::now();
            let latency_ns = cycle_start.saturating_duration_since(next_wake).as_nanos() as i64;

            self.tick(cycle_start);

            self.record(cycle_start.elapsed().as_nanos() as i64, latency_ns);

            next_wake += cycle;
            let now = Instant::now();
            if next_wake > now {
                std::thread::sleep(next_wake - now);
            } else {
                // Behind schedule: restart pacing instead of bursting.
                next_wake = now;
            }
        }
        Ok(())
    }
}

// ─── Time Helpers ───────────────────────────────────────────────────

#[cfg(feature = "rt")]
fn timespec_add_ns(ts: nix::sys::time::TimeSpec, ns: i64) -> nix::sys::time::TimeSpec {
    use nix::sys::time::TimeSpec;
    let mut secs = ts.tv_sec();
    let mut nanos = ts.tv_nsec() + ns;
    while nanos >= 1_000_000_000 {
        secs += 1;
        nanos -= 1_000_000_000;
    }
    while nanos < 0 {
        secs -= 1;
        nanos += 1_000_000_000;
    }
    TimeSpec::new(secs, nanos)
}

/// Compute `a - b` in nanoseconds.
#[cfg(feature = "rt")]
fn timespec_diff_ns(a: &nix::sys::time::TimeSpec, b: &nix::sys::time::TimeSpec) -> i64 {
    (a.tv_sec() - b.tv_sec()) * 1_000_000_000 + (a.tv_nsec() - b.tv_nsec())
}

// ─── Tests ──────────────────────────────────────────────────────────
