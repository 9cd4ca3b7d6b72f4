//! Discrete PID torque tracker with periodic integral reset.
//!
//! Derivative and integral use the nominal control frequency, not the
//! measured `dt`, so gains keep their meaning under timing jitter:
//! ```text
//! derivative = (e − e_prev) · f_nominal
//! integral  += e / f_nominal
//! output     = kp·e + kd·derivative + ki·integral
//! ```
//! There is no output clamping. The integral is zeroed every N ticks.

use exo_common::control::ParameterSnapshot;

/// Internal state of the torque PID.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PidState {
    integral: f64,
    prev_error: f64,
    /// Ticks since the last integral reset.
    tick_count: u64,
}

impl PidState {
    /// Reset all internal state to zero.
    #[inline]
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    #[inline]
    pub fn integral(&self) -> f64 {
        self.integral
    }

    #[inline]
    pub fn prev_error(&self) -> f64 {
        self.prev_error
    }

    #[inline]
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Restart the reset period without touching the accumulator.
    #[inline]
    pub fn reset_tick_count(&mut self) {
        self.tick_count = 0;
    }

    /// Zero the integral and the tick counter once `threshold` ticks have elapsed.
    ///
    /// Returns `true` when a reset happened.
    #[inline]
    pub fn reset_integral_if_due(&mut self, threshold: u64) -> bool {
        if self.tick_count >= threshold {
            self.integral = 0.0;
            self.tick_count = 0;
            true
        } else {
            false
        }
    }
}

/// PID gains, taken from the current parameter snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl From<&ParameterSnapshot> for PidGains {
    fn from(params: &ParameterSnapshot) -> Self {
        Self {
            kp: params.kp,
            ki: params.ki,
            kd: params.kd,
        }
    }
}

/// Integral reset period in ticks for a period in seconds.
///
/// Never less than one tick.
#[inline]
pub fn reset_period_ticks(period_secs: f64, nominal_hz: f64) -> u64 {
    let ticks = (period_secs * nominal_hz).round();
    if ticks.is_finite() && ticks >= 1.0 {
        ticks as u64
    } else {
        1
    }
}

/// Compute one PID tick and count it towards the integral reset period.
///
/// Returns 0.0 without touching the state if `nominal_hz` is not positive.
#[inline]
pub fn pid_compute(state: &mut PidState, gains: &PidGains, error: f64, nominal_hz: f64) -> f64 {
    if nominal_hz <= 0.0 {
        return 0.0;
    }

    let derivative = (error - state.prev_error) * nominal_hz;
    state.integral += error / nominal_hz;
    state.prev_error = error;
    state.tick_count += 1;

    gains.kp * error + gains.kd * derivative + gains.ki * state.integral
}
