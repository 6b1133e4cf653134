//! Per-slice fair-rate threshold estimation.
//!
//! Each slice tracks its current threshold plus a set of nearby candidate
//! thresholds. Every packet charges each candidate's LPF with the bytes that
//! candidate would have admitted; at epoch end the pair of candidates whose
//! admitted-byte counts straddle the slice capacity is located and the new
//! threshold is interpolated between them, Newton style, through the
//! approximate-division primitive.

use tracing::debug;

use crate::{
    config::{CandidateStrategy, SliceConfig},
    lpf::{LpfCell, LpfParams},
    numeric::{RatioMath, msb64},
};

/// One candidate threshold plus the LPF counting bytes it would admit.
#[derive(Clone, Debug)]
struct Candidate {
    threshold: u64,
    admitted: LpfCell,
}

/// Per-slice threshold state.
#[derive(Clone, Debug)]
pub(crate) struct ThresholdEstimator {
    threshold: u64,
    strategy: CandidateStrategy,
    candidates: Vec<Candidate>,
    lpf: LpfParams,
    max_flow_rate: u64,
    packets_this_epoch: u64,
}

impl ThresholdEstimator {
    pub(crate) fn new(
        initial_threshold: u64,
        strategy: CandidateStrategy,
        lpf: LpfParams,
    ) -> Self {
        let mut estimator = Self {
            threshold: initial_threshold,
            strategy,
            candidates: Vec::new(),
            lpf,
            max_flow_rate: 0,
            packets_this_epoch: 0,
        };
        estimator.regenerate_candidates();
        estimator
    }

    /// The threshold currently enforced on this slice.
    pub(crate) fn current(&self) -> u64 {
        self.threshold
    }

    /// Charges every candidate with the bytes it would have admitted from a
    /// packet of `size` bytes whose flow runs at `rate`.
    pub(crate) fn observe(&mut self, math: &RatioMath, timestamp: u64, size: u64, rate: u64) {
        for candidate in &mut self.candidates {
            let admitted = math.bytes_accepted(rate, candidate.threshold, size);
            candidate.admitted.update(&self.lpf, timestamp, admitted);
        }
        self.max_flow_rate = self.max_flow_rate.max(rate);
        self.packets_this_epoch += 1;
    }

    /// Picks the next threshold for a slice whose capacity this epoch was
    /// `capacity`. A slice that saw no packets keeps its threshold: with no
    /// admission evidence every candidate counter reads zero and any bracket
    /// choice would be noise.
    pub(crate) fn end_epoch(
        &mut self,
        math: &RatioMath,
        config: &SliceConfig,
        capacity: u64,
        slice_demand: u64,
        trunk_under_subscribed: bool,
    ) -> u64 {
        if self.packets_this_epoch == 0 {
            self.reset_epoch_state();
            return self.threshold;
        }

        let mut next = self.select_winner(math, capacity);
        if trunk_under_subscribed {
            // Nothing is competing for the spare capacity; cap threshold
            // inflation at the fastest rate actually observed plus the
            // slice's own slack.
            let ceiling = self
                .max_flow_rate
                .saturating_add(capacity.saturating_sub(slice_demand));
            next = next.min(ceiling);
        }
        next = next.clamp(config.clamp_min, config.clamp_max);

        debug!(
            old = self.threshold,
            new = next,
            capacity,
            "threshold updated"
        );
        self.threshold = next;
        self.regenerate_candidates();
        self.reset_epoch_state();
        self.threshold
    }

    /// Candidate thresholds in ascending order; exposed for tests.
    #[cfg(test)]
    pub(crate) fn candidate_thresholds(&self) -> Vec<u64> {
        self.candidates.iter().map(|c| c.threshold).collect()
    }

    fn select_winner(&self, math: &RatioMath, capacity: u64) -> u64 {
        let counts: Vec<u64> = self
            .candidates
            .iter()
            .map(|c| c.admitted.read(&self.lpf))
            .collect();
        let first_reaching = counts.iter().position(|&count| count >= capacity);
        match first_reaching {
            // Capacity exceeds every candidate's admitted bytes.
            None => self.candidates[self.candidates.len() - 1].threshold,
            // Even the lowest candidate admits at least the capacity.
            Some(0) => self.candidates[0].threshold,
            Some(hi) if counts[hi] == capacity => self.candidates[hi].threshold,
            Some(hi) => {
                let lo = hi - 1;
                interpolate(
                    math,
                    self.candidates[lo].threshold,
                    self.candidates[hi].threshold,
                    counts[lo],
                    counts[hi],
                    capacity,
                )
            }
        }
    }

    fn regenerate_candidates(&mut self) {
        let thresholds = candidate_thresholds(self.strategy, self.threshold);
        if thresholds.len() == self.candidates.len() {
            // Keep each candidate's LPF timestamp so the first sample of the
            // next epoch decays from the correct instant.
            for (candidate, threshold) in self.candidates.iter_mut().zip(thresholds) {
                candidate.threshold = threshold;
                candidate.admitted.reset_value();
            }
        } else {
            self.candidates = thresholds
                .into_iter()
                .map(|threshold| Candidate {
                    threshold,
                    admitted: LpfCell::default(),
                })
                .collect();
        }
    }

    fn reset_epoch_state(&mut self) {
        for candidate in &mut self.candidates {
            candidate.admitted.reset_value();
        }
        self.max_flow_rate = 0;
        self.packets_this_epoch = 0;
    }
}

/// `t_a + ((c - c_a) / (c_b - c_a)) * (t_b - t_a)`, with the quotient taken
/// through the configured ratio strategy. A degenerate bracket returns the
/// low end.
fn interpolate(math: &RatioMath, t_a: u64, t_b: u64, c_a: u64, c_b: u64, capacity: u64) -> u64 {
    if c_b <= c_a || t_b <= t_a {
        return t_a;
    }
    let progress = math.ratio(capacity.saturating_sub(c_a), c_b - c_a);
    t_a + progress.apply(t_b - t_a)
}

/// Candidate thresholds for `current`, strictly increasing, with the current
/// threshold in the middle.
fn candidate_thresholds(strategy: CandidateStrategy, current: u64) -> Vec<u64> {
    let t = current.max(2);
    let mut thresholds = match strategy {
        CandidateStrategy::PowerTwoJump => {
            let rounded = round_log2(t);
            let decrease = 1u64 << rounded.saturating_sub(1);
            let increase = 1u64 << rounded.saturating_sub(2);
            vec![t.saturating_sub(decrease).max(1), t, t.saturating_add(increase)]
        }
        CandidateStrategy::RatioThree => vec![t / 2, t, t.saturating_mul(2)],
        CandidateStrategy::RatioFive => vec![
            t / 2,
            t / 2 + t / 4,
            t,
            t.saturating_add(t / 2),
            t.saturating_mul(2),
        ],
    };
    // Spacing must be strictly monotone for bracket selection to be sound.
    for index in 1..thresholds.len() {
        if thresholds[index] <= thresholds[index - 1] {
            thresholds[index] = thresholds[index - 1] + 1;
        }
    }
    thresholds
}

/// `round(log2 t)` for `t >= 1`: the exponent of the nearest power of two.
fn round_log2(t: u64) -> u32 {
    let floor = msb64(t);
    // Round up when t >= 2^(floor + 1/2), i.e. t^2 >= 2 * 4^floor.
    let squared = u128::from(t) * u128::from(t);
    if squared >= 2u128 << (2 * floor) {
        floor + 1
    } else {
        floor
    }
}

#[cfg(test)]
mod tests;
