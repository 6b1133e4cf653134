//! The per-packet dispatcher and epoch driver for one virtual trunk.
//!
//! A trunk owns the flow-rate sketch, one threshold estimator per slice, and
//! the capacity estimator. Packet processing is arithmetic-only and
//! non-blocking; all state lives in sketch cells and slice/trunk state, so
//! the dispatcher itself is stateless per packet.
//!
//! Concurrency model: single writer per trunk. Packets and epoch ticks for
//! one trunk must be serialised by the caller; separate trunks share
//! nothing mutable.

use std::sync::atomic::{AtomicBool, Ordering};

use rand::{Rng, SeedableRng, rngs::SmallRng};
use tracing::{debug, instrument};

use crate::{
    capacity::CapacityEstimator,
    config::{DropPolicy, SliceConfig},
    numeric::RatioMath,
    sketch::{FlowKey, LpfMinSketch},
    snapshot::{RuntimeCounters, SliceSnapshot, TrunkSnapshot},
    threshold::ThresholdEstimator,
};

/// Scaled rate estimates saturate at the 32-bit limit.
const RATE_SATURATION_LIMIT: u64 = u32::MAX as u64;

/// Drop probabilities are 16-bit fixed point, capped one step below
/// certainty so a policed flow always keeps a trickle.
const MAX_DROP_PROBABILITY_Q16: u64 = (1 << 16) - 2;

/// One slice's immutable configuration and mutable threshold state.
#[derive(Debug)]
pub(crate) struct SliceState {
    pub(crate) config: SliceConfig,
    pub(crate) estimator: ThresholdEstimator,
}

/// A capped virtual trunk enforcing approximate max-min fairness across its
/// slices.
///
/// Construct with [`crate::TrunkBuilder`]; feed packets in timestamp order
/// with [`Trunk::process`]; tick [`Trunk::end_epoch`] on the control
/// cadence; export state with [`Trunk::snapshot`].
///
/// # Examples
/// ```
/// use ahab_core::{FlowKey, TrunkBuilder};
///
/// let mut trunk = TrunkBuilder::new()
///     .with_weights(&[0.5, 0.5])
///     .with_physical_capacity(10_000)
///     .build()
///     .expect("configuration is valid");
/// trunk.process(0, 1500, 0, FlowKey::new(7));
/// trunk.end_epoch();
/// let snapshot = trunk.snapshot();
/// assert_eq!(snapshot.slices.len(), 2);
/// ```
#[derive(Debug)]
pub struct Trunk {
    slices: Box<[SliceState]>,
    sketch: LpfMinSketch,
    capacity: CapacityEstimator,
    math: RatioMath,
    drop_policy: DropPolicy,
    rng: SmallRng,
    physical_capacity: u64,
    last_timestamp: u64,
    counters: RuntimeCounters,
    epoch_active: AtomicBool,
}

impl Trunk {
    pub(crate) fn new(
        slices: Box<[SliceState]>,
        sketch: LpfMinSketch,
        capacity: CapacityEstimator,
        math: RatioMath,
        drop_policy: DropPolicy,
        physical_capacity: u64,
        rng_seed: u64,
    ) -> Self {
        Self {
            slices,
            sketch,
            capacity,
            math,
            drop_policy,
            rng: SmallRng::seed_from_u64(rng_seed),
            physical_capacity,
            last_timestamp: 0,
            counters: RuntimeCounters::default(),
            epoch_active: AtomicBool::new(false),
        }
    }

    /// Returns the number of slices sharing this trunk.
    #[must_use]
    pub fn num_slices(&self) -> usize {
        self.slices.len()
    }

    /// Returns the physical downlink capacity in bytes per epoch.
    #[must_use]
    pub fn physical_capacity(&self) -> u64 {
        self.physical_capacity
    }

    /// Observes one packet and returns the bytes to drop (or, under the
    /// Bernoulli policy, the whole packet size when it lost the draw).
    ///
    /// Packets must arrive in non-decreasing timestamp order; a regressed
    /// timestamp is clamped forward and counted. A zero-sized packet or an
    /// out-of-range slice id is a no-op.
    pub fn process(
        &mut self,
        timestamp_ns: u64,
        size_bytes: u64,
        slice_id: usize,
        flow_key: FlowKey,
    ) -> u64 {
        if size_bytes == 0 || slice_id >= self.slices.len() {
            return 0;
        }
        let timestamp = self.admit_timestamp(timestamp_ns);
        self.counters.packets += 1;

        // Scale up before the sketch, scale down after the read, so lighter
        // slices see proportionally more pressure at the same threshold.
        let config = self.slices[slice_id].config;
        let scaled_size = size_bytes.saturating_mul(config.scale_factor);
        let scaled_estimate = self.sketch.update(flow_key, slice_id, timestamp, scaled_size);
        let scaled_estimate = if scaled_estimate > RATE_SATURATION_LIMIT {
            self.counters.rate_saturations += 1;
            #[cfg(feature = "metrics")]
            metrics::counter!("ahab_rate_saturations").increment(1);
            RATE_SATURATION_LIMIT
        } else {
            scaled_estimate
        };
        let rate = scaled_estimate / config.scale_factor;

        let threshold = self.slices[slice_id].estimator.current();
        let dropped = self.drop_decision(size_bytes, rate, threshold);

        let math = &self.math;
        self.slices[slice_id]
            .estimator
            .observe(math, timestamp, size_bytes, rate);
        self.capacity.observe(slice_id, timestamp, size_bytes);
        dropped
    }

    /// Recomputes the scaled capacity and every slice threshold.
    ///
    /// Always completes in bounded work. A tick that arrives while another
    /// is in flight returns immediately without mutation.
    #[instrument(name = "trunk.end_epoch", skip(self), fields(slices = self.slices.len()))]
    pub fn end_epoch(&mut self) {
        if self.epoch_active.swap(true, Ordering::AcqRel) {
            debug!("re-entrant epoch tick ignored");
            return;
        }
        let decision = self.capacity.end_epoch();
        let capacity = &self.capacity;
        let math = &self.math;
        for (slice_id, slice) in self.slices.iter_mut().enumerate() {
            slice.estimator.end_epoch(
                math,
                &slice.config,
                capacity.capacity_for(slice_id),
                capacity.demand_estimate(slice_id),
                decision.under_subscribed,
            );
        }
        self.counters.epochs += 1;
        #[cfg(feature = "metrics")]
        metrics::counter!("ahab_epochs").increment(1);
        self.epoch_active.store(false, Ordering::Release);
    }

    /// Captures the current control state for exporters.
    #[must_use]
    pub fn snapshot(&self) -> TrunkSnapshot {
        let slices = self
            .slices
            .iter()
            .enumerate()
            .map(|(slice_id, slice)| SliceSnapshot {
                slice_id,
                threshold: slice.estimator.current(),
                demand_estimate: self.capacity.demand_estimate(slice_id),
                capacity: self.capacity.capacity_for(slice_id),
            })
            .collect();
        TrunkSnapshot {
            scaled_capacity: self.capacity.scaled_capacity(),
            slices,
            counters: self.counters.clone(),
        }
    }

    fn admit_timestamp(&mut self, timestamp: u64) -> u64 {
        if timestamp < self.last_timestamp {
            self.counters.timestamp_regressions += 1;
            #[cfg(feature = "metrics")]
            metrics::counter!("ahab_timestamp_regressions").increment(1);
            debug!(
                timestamp,
                clamped_to = self.last_timestamp,
                "timestamp regression clamped"
            );
            self.last_timestamp
        } else {
            self.last_timestamp = timestamp;
            timestamp
        }
    }

    fn drop_decision(&mut self, size: u64, rate: u64, threshold: u64) -> u64 {
        match self.drop_policy {
            DropPolicy::Expected => size - self.math.bytes_accepted(rate, threshold, size),
            DropPolicy::Bernoulli => {
                if rate <= threshold {
                    return 0;
                }
                let survival_q16 = self.math.ratio(threshold, rate).apply(1 << 16);
                let drop_q16 = ((1u64 << 16) - 1)
                    .saturating_sub(survival_q16)
                    .min(MAX_DROP_PROBABILITY_Q16);
                let draw = self.rng.gen_range(0..1u64 << 16);
                if draw < drop_q16 { size } else { 0 }
            }
        }
    }
}
