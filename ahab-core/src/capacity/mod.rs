//! Inter-slice capacity estimation.
//!
//! The estimator tracks one demand LPF per slice and, at epoch end, derives
//! a *scaled* trunk capacity `S >= P` such that clipping every slice's
//! demand to its weighted share of `S` fills the physical capacity `P`.
//! When the trunk is under-subscribed no such `S` exists; speculative mode
//! instead lets the busiest slice grow into the whole idle margin.
//!
//! Weights are fixed at construction and carried as Q32 fractions so the
//! epoch computation stays in integer arithmetic.

use tracing::{debug, instrument};

use crate::{
    config::CapacityMode,
    lpf::{LpfCell, LpfParams},
    numeric::lowest_input_reaching,
};

/// A slice weight as a Q32 fraction of the trunk.
#[derive(Clone, Copy, Debug)]
struct WeightQ32(u64);

impl WeightQ32 {
    fn from_f64(weight: f64) -> Self {
        Self((weight * f64::powi(2.0, 32)).round() as u64)
    }

    /// `floor(weight * total)`.
    fn share_of(self, total: u64) -> u64 {
        ((u128::from(total) * u128::from(self.0)) >> 32) as u64
    }

    /// Smallest `total` whose share reaches `target`: `ceil(target / w)`.
    fn total_reaching(self, target: u64) -> u64 {
        let wide = (u128::from(target) << 32).div_ceil(u128::from(self.0));
        u64::try_from(wide).unwrap_or(u64::MAX)
    }
}

/// Verdict produced by [`CapacityEstimator::end_epoch`].
#[derive(Clone, Copy, Debug)]
pub(crate) struct CapacityDecision {
    /// Whether total demand fell short of the physical capacity.
    pub(crate) under_subscribed: bool,
}

/// Per-trunk capacity state.
#[derive(Clone, Debug)]
pub(crate) struct CapacityEstimator {
    mode: CapacityMode,
    speculative: bool,
    physical: u64,
    scaled: u64,
    weights: Box<[WeightQ32]>,
    min_weight: WeightQ32,
    demand: Vec<LpfCell>,
    lpf: LpfParams,
}

impl CapacityEstimator {
    pub(crate) fn new(
        weights: &[f64],
        physical: u64,
        mode: CapacityMode,
        speculative: bool,
        lpf: LpfParams,
    ) -> Self {
        let weights: Box<[WeightQ32]> = weights.iter().map(|&w| WeightQ32::from_f64(w)).collect();
        let min_weight = weights
            .iter()
            .copied()
            .min_by_key(|w| w.0)
            .unwrap_or(WeightQ32(1 << 32));
        let demand = vec![LpfCell::default(); weights.len()];
        Self {
            mode,
            speculative,
            physical,
            scaled: physical,
            weights,
            min_weight,
            demand,
            lpf,
        }
    }

    /// Records `size` bytes of demand for `slice` at `timestamp`, dropped
    /// bytes included.
    pub(crate) fn observe(&mut self, slice: usize, timestamp: u64, size: u64) {
        self.demand[slice].update(&self.lpf, timestamp, size);
    }

    /// The current demand estimate for `slice`.
    pub(crate) fn demand_estimate(&self, slice: usize) -> u64 {
        self.demand[slice].read(&self.lpf)
    }

    /// The capacity available to `slice` under the current scaling.
    pub(crate) fn capacity_for(&self, slice: usize) -> u64 {
        self.weights[slice].share_of(self.scaled)
    }

    /// The scaled trunk capacity chosen at the last epoch end.
    pub(crate) fn scaled_capacity(&self) -> u64 {
        self.scaled
    }

    /// Recomputes the scaled capacity from the demand read-outs.
    #[instrument(name = "capacity.end_epoch", skip(self))]
    pub(crate) fn end_epoch(&mut self) -> CapacityDecision {
        let demands: Vec<u64> = (0..self.demand.len())
            .map(|slice| self.demand_estimate(slice))
            .collect();
        let total: u64 = demands.iter().fold(0, |acc, &d| acc.saturating_add(d));
        let under_subscribed = total < self.physical;

        self.scaled = match self.mode {
            CapacityMode::Fixed => self.physical,
            CapacityMode::ScaledHistograms if !under_subscribed => {
                self.solve_oversubscribed(&demands)
            }
            CapacityMode::ScaledHistograms if self.speculative => {
                self.solve_speculative(&demands, total)
            }
            CapacityMode::ScaledHistograms => self.max_scale(),
        };
        debug!(
            scaled = self.scaled,
            total_demand = total,
            under_subscribed,
            "capacity rescaled"
        );
        CapacityDecision { under_subscribed }
    }

    /// Bytes the trunk would carry if the scaled capacity were `scaled`.
    fn carried_at(&self, demands: &[u64], scaled: u64) -> u64 {
        demands
            .iter()
            .zip(self.weights.iter())
            .map(|(&demand, weight)| demand.min(weight.share_of(scaled)))
            .fold(0u64, u64::saturating_add)
    }

    /// Smallest `S` in `[P, P / min(w)]` carrying the full physical
    /// capacity. Total demand at or above `P` guarantees a solution exists
    /// in the range.
    fn solve_oversubscribed(&self, demands: &[u64]) -> u64 {
        lowest_input_reaching(self.physical, self.physical, self.max_scale(), |scaled| {
            self.carried_at(demands, scaled)
        })
    }

    /// Grows the busiest slice into the trunk's idle margin:
    /// `S = (d_busiest + (P - total)) / w_busiest`.
    fn solve_speculative(&self, demands: &[u64], total: u64) -> u64 {
        let busiest = demands
            .iter()
            .enumerate()
            .max_by_key(|&(_, &demand)| demand)
            .map_or(0, |(slice, _)| slice);
        let margin = self.physical - total;
        let target = demands[busiest].saturating_add(margin);
        self.weights[busiest]
            .total_reaching(target)
            .max(self.physical)
    }

    fn max_scale(&self) -> u64 {
        self.min_weight.total_reaching(self.physical)
    }
}

/// The exact max-min fair per-member threshold for `demands` sharing
/// `capacity`: the smallest `t` with `sum(min(d_i, t)) >= capacity`, or
/// `capacity` itself when the demands fit without limiting.
///
/// This is the oracle the approximate epoch loop converges towards; the CLI
/// and the tests use it as a reference.
///
/// # Examples
/// ```
/// use ahab_core::exact_fair_threshold;
///
/// // Three members wanting 10, 40, and 90 units of a 60-unit link share
/// // fairly at 25: 10 + 25 + 25 = 60.
/// assert_eq!(exact_fair_threshold(&[10, 40, 90], 60), 25);
/// // An idle link limits nobody.
/// assert_eq!(exact_fair_threshold(&[10, 20], 60), 60);
/// ```
#[must_use]
pub fn exact_fair_threshold(demands: &[u64], capacity: u64) -> u64 {
    let clipped_sum = |threshold: u64| {
        demands
            .iter()
            .map(|&demand| demand.min(threshold))
            .fold(0u64, u64::saturating_add)
    };
    if clipped_sum(capacity) < capacity {
        return capacity;
    }
    lowest_input_reaching(capacity, 0, capacity, clipped_sum)
}
