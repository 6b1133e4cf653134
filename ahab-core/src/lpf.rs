//! One-pole exponential-decay register cells.
//!
//! An LPF cell holds `(last_timestamp, value)` and decays the stored value
//! by `exp(-(t - t_prev) / tau)` on every sample, following the Tofino LPF
//! semantics. Rate mode accumulates decayed samples (a byte rate over the
//! time constant); sample mode tracks a moving estimate of the sample value
//! itself.
//!
//! The decay factor is evaluated without floating point: the exponent
//! `delta / (tau * ln 2)` is computed in Q16, its whole part becomes a right
//! shift, and its fractional part indexes a 32-entry Q16 table of
//! `2^(-i/32)`. The fractional index truncates, so the factor errs slightly
//! high; the absolute error stays below 2 %.

/// `2^(-i/32)` in Q16, for `i` in `0..32`.
const DECAY_FRAC_Q16: [u32; 32] = [
    65536, 64132, 62757, 61413, 60097, 58809, 57549, 56316, 55109, 53928, 52773, 51642, 50535,
    49452, 48393, 47356, 46341, 45348, 44376, 43425, 42495, 41584, 40693, 39821, 38968, 38133,
    37316, 36516, 35734, 34968, 34219, 33486,
];

/// `ln 2` in Q16.
const LN2_Q16: u64 = 45_426;

/// Decay exponents at or beyond this many doublings flush the value to zero.
const MAX_DOUBLINGS: u64 = 64;

/// Whether a cell integrates rates or tracks sample magnitudes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum LpfMode {
    /// `v' = s + v * exp(-delta/tau)`.
    Rate,
    /// `v' = v + (s - v) * (1 - exp(-delta/tau))`.
    Sample,
}

/// Shared timing parameters for a family of LPF cells.
///
/// Cells store only their `(timestamp, value)` pair; the time constant and
/// read-out scaling live here so sketch rows stay two words per cell.
#[derive(Clone, Copy, Debug)]
pub(crate) struct LpfParams {
    /// `tau * ln 2` in nanoseconds; the interval over which a stored value
    /// halves.
    tau_ln2_ns: u64,
    scale_down: u32,
    mode: LpfMode,
}

impl LpfParams {
    pub(crate) fn new(time_constant_ns: u64, scale_down: u32, mode: LpfMode) -> Self {
        let tau_ln2_ns = ((u128::from(time_constant_ns) * u128::from(LN2_Q16)) >> 16) as u64;
        Self {
            tau_ln2_ns: tau_ln2_ns.max(1),
            scale_down,
            mode,
        }
    }

    /// The decayed value of `x` after `delta` nanoseconds.
    fn decayed(&self, x: u64, delta: u64) -> u64 {
        if x == 0 {
            return 0;
        }
        let exponent_q16 = (u128::from(delta) << 16) / u128::from(self.tau_ln2_ns);
        if exponent_q16 >= u128::from(MAX_DOUBLINGS) << 16 {
            return 0;
        }
        let doublings = (exponent_q16 >> 16) as u32;
        let frac_index = ((exponent_q16 >> 11) & 31) as usize;
        let scaled = (u128::from(x) * u128::from(DECAY_FRAC_Q16[frac_index])) >> 16;
        (scaled >> doublings) as u64
    }
}

/// A single `(timestamp, value)` LPF register.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct LpfCell {
    last_timestamp: u64,
    value: u64,
}

impl LpfCell {
    /// Feeds a sample into the cell and returns the scaled new value.
    ///
    /// Callers are expected to present monotone timestamps; a regressed
    /// timestamp is treated as simultaneous with the stored one (no decay),
    /// which keeps the filter state correct at the cost of one under-decayed
    /// sample.
    pub(crate) fn update(&mut self, params: &LpfParams, timestamp: u64, sample: u64) -> u64 {
        let delta = timestamp.saturating_sub(self.last_timestamp);
        self.value = match params.mode {
            LpfMode::Rate => sample.saturating_add(params.decayed(self.value, delta)),
            LpfMode::Sample => {
                // s - d(s) + d(v); the subtraction stays in range because
                // decay never exceeds its input.
                (sample - params.decayed(sample, delta))
                    .saturating_add(params.decayed(self.value, delta))
            }
        };
        self.last_timestamp = self.last_timestamp.max(timestamp);
        self.value >> params.scale_down
    }

    /// Returns the current value with the read-out scaling applied, without
    /// advancing time.
    pub(crate) fn read(&self, params: &LpfParams) -> u64 {
        self.value >> params.scale_down
    }

    /// Clears the stored value but keeps the timestamp, so the next sample
    /// decays from the correct instant.
    pub(crate) fn reset_value(&mut self) {
        self.value = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rate_params(tau: u64) -> LpfParams {
        LpfParams::new(tau, 0, LpfMode::Rate)
    }

    #[test]
    fn rate_mode_accumulates_simultaneous_samples() {
        let params = rate_params(1_000_000);
        let mut cell = LpfCell::default();
        for _ in 0..10 {
            cell.update(&params, 500, 100);
        }
        assert_eq!(cell.read(&params), 1000);
    }

    #[test]
    fn rate_mode_halves_after_tau_ln2() {
        let params = rate_params(1_000_000);
        let mut cell = LpfCell::default();
        cell.update(&params, 0, 1_000_000);
        let halved = cell.update(&params, 693_147, 0);
        let error = halved.abs_diff(500_000);
        assert!(error < 25_000, "decay after tau*ln2 was {halved}");
    }

    #[test]
    fn rate_mode_flushes_after_long_idle() {
        let params = rate_params(1_000);
        let mut cell = LpfCell::default();
        cell.update(&params, 0, u64::MAX / 2);
        assert_eq!(cell.update(&params, 10_000_000, 0), 0);
    }

    #[test]
    fn sample_mode_converges_to_constant_input() {
        let params = LpfParams::new(1_000, 0, LpfMode::Sample);
        let mut cell = LpfCell::default();
        let mut last = 0;
        for step in 1..=50u64 {
            last = cell.update(&params, step * 2_000, 600);
        }
        assert!(last.abs_diff(600) <= 6, "sample mode settled at {last}");
    }

    #[test]
    fn regressed_timestamp_applies_no_decay() {
        let params = rate_params(1_000);
        let mut cell = LpfCell::default();
        cell.update(&params, 1_000_000, 400);
        let value = cell.update(&params, 0, 100);
        assert_eq!(value, 500);
    }

    #[test]
    fn scale_down_shifts_read_out() {
        let params = LpfParams::new(1_000_000, 3, LpfMode::Rate);
        let mut cell = LpfCell::default();
        assert_eq!(cell.update(&params, 0, 800), 100);
        assert_eq!(cell.read(&params), 100);
    }

    #[test]
    fn reset_value_keeps_timestamp() {
        let params = rate_params(1_000_000);
        let mut cell = LpfCell::default();
        cell.update(&params, 5_000, 123);
        cell.reset_value();
        assert_eq!(cell.read(&params), 0);
        // A fresh sample at the same instant must not decay.
        assert_eq!(cell.update(&params, 5_000, 77), 77);
    }
}
