//! First-order low-pass filtering of joint position and interaction torque.
//!
//! The coefficient is recomputed every tick from the measured `dt`:
//! ```text
//! alpha = (2·π·dt·fc) / (2·π·dt·fc + 1)
//! y[n]  = alpha·x[n] + (1 − alpha)·y[n−1]
//! ```

use core::f64::consts::PI;

/// Smoothing coefficient for a single-pole RC filter.
///
/// Returns 0.0 (hold previous output) for non-positive `dt` or `cutoff_hz`.
/// Always in `[0, 1)`.
#[inline]
pub fn lowpass_alpha(dt: f64, cutoff_hz: f64) -> f64 {
    if dt <= 0.0 || cutoff_hz <= 0.0 || !dt.is_finite() {
        return 0.0;
    }
    let omega = 2.0 * PI * dt * cutoff_hz;
    // Large omega rounds the ratio to 1.0.
    (omega / (omega + 1.0)).min(1.0 - f64::EPSILON)
}

/// Low-pass filter state.
///
/// Seeded with the first sample so the output does not ramp up from zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct LowPassState {
    prev_output: Option<f64>,
}

impl LowPassState {
    #[inline]
    pub fn reset(&mut self) {
        self.prev_output = None;
    }

    /// Last filtered value, if any sample has been applied.
    #[inline]
    pub fn value(&self) -> Option<f64> {
        self.prev_output
    }

    /// Apply one sample with the given coefficient.
    #[inline]
    pub fn apply(&mut self, alpha: f64, input: f64) -> f64 {
        let output = match self.prev_output {
            Some(prev) => alpha * input + (1.0 - alpha) * prev,
            None => input,
        };
        self.prev_output = Some(output);
        output
    }
}
