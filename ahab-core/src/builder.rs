//! Builder and validation surface for constructing [`Trunk`] instances.

use crate::{
    Result,
    capacity::CapacityEstimator,
    config::{
        CandidateStrategy, CapacityMode, DropPolicy, InterpolatorKind, SketchParams, SliceConfig,
    },
    error::AhabError,
    lpf::{LpfMode, LpfParams},
    numeric::RatioMath,
    sketch::LpfMinSketch,
    threshold::ThresholdEstimator,
    trunk::{SliceState, Trunk},
};

const DEFAULT_CLAMP_MIN: u64 = 8;
const DEFAULT_CLAMP_MAX: u64 = 1 << 30;
const DEFAULT_RNG_SEED: u64 = 0x5EED_BEEF;
/// Fresh slices start at an arbitrary fraction of their fair share; the
/// control loop converges from there within a few epochs.
const INITIAL_THRESHOLD_DIVISOR: u64 = 6;
const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Configures and constructs [`Trunk`] instances.
///
/// # Examples
/// ```
/// use ahab_core::{CandidateStrategy, CapacityMode, TrunkBuilder};
///
/// let trunk = TrunkBuilder::new()
///     .with_weights(&[0.5, 0.25, 0.125, 0.125])
///     .with_physical_capacity(5_000)
///     .with_candidate_strategy(CandidateStrategy::PowerTwoJump)
///     .with_capacity_mode(CapacityMode::ScaledHistograms)
///     .build()
///     .expect("builder configuration is valid");
/// assert_eq!(trunk.num_slices(), 4);
/// ```
#[derive(Debug, Clone)]
pub struct TrunkBuilder {
    weights: Vec<f64>,
    physical_capacity: u64,
    sketch: SketchParams,
    candidate_strategy: CandidateStrategy,
    interpolator: InterpolatorKind,
    capacity_mode: CapacityMode,
    speculative: bool,
    drop_policy: DropPolicy,
    clamp_min: u64,
    clamp_max: u64,
    initial_threshold: Option<u64>,
    rng_seed: u64,
}

impl Default for TrunkBuilder {
    fn default() -> Self {
        Self {
            weights: Vec::new(),
            physical_capacity: 0,
            sketch: SketchParams::default(),
            candidate_strategy: CandidateStrategy::PowerTwoJump,
            interpolator: InterpolatorKind::table_default(),
            capacity_mode: CapacityMode::ScaledHistograms,
            speculative: true,
            drop_policy: DropPolicy::Expected,
            clamp_min: DEFAULT_CLAMP_MIN,
            clamp_max: DEFAULT_CLAMP_MAX,
            initial_threshold: None,
            rng_seed: DEFAULT_RNG_SEED,
        }
    }
}

impl TrunkBuilder {
    /// Creates a builder populated with default parameters. Weights and the
    /// physical capacity must be supplied before [`TrunkBuilder::build`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the per-slice fair-share weights. They must lie in `(0, 1]` and
    /// sum to one; powers of two keep the scale factors exact.
    #[must_use]
    pub fn with_weights(mut self, weights: &[f64]) -> Self {
        self.weights = weights.to_vec();
        self
    }

    /// Sets the physical downlink capacity in bytes per epoch.
    #[must_use]
    pub fn with_physical_capacity(mut self, capacity: u64) -> Self {
        self.physical_capacity = capacity;
        self
    }

    /// Overrides the flow-rate sketch shape and timing.
    #[must_use]
    pub fn with_sketch_params(mut self, params: SketchParams) -> Self {
        self.sketch = params;
        self
    }

    /// Selects how threshold candidates are spaced.
    #[must_use]
    pub fn with_candidate_strategy(mut self, strategy: CandidateStrategy) -> Self {
        self.candidate_strategy = strategy;
        self
    }

    /// Selects the ratio-evaluation strategy for the drop and interpolation
    /// paths.
    #[must_use]
    pub fn with_interpolator(mut self, interpolator: InterpolatorKind) -> Self {
        self.interpolator = interpolator;
        self
    }

    /// Selects how per-slice capacities are derived each epoch.
    #[must_use]
    pub fn with_capacity_mode(mut self, mode: CapacityMode) -> Self {
        self.capacity_mode = mode;
        self
    }

    /// Enables or disables speculative scaling when the trunk is
    /// under-subscribed.
    #[must_use]
    pub fn with_speculative_scaling(mut self, speculative: bool) -> Self {
        self.speculative = speculative;
        self
    }

    /// Selects the per-packet drop decision policy.
    #[must_use]
    pub fn with_drop_policy(mut self, policy: DropPolicy) -> Self {
        self.drop_policy = policy;
        self
    }

    /// Overrides the threshold clamp range.
    #[must_use]
    pub fn with_threshold_clamps(mut self, min: u64, max: u64) -> Self {
        self.clamp_min = min;
        self.clamp_max = max;
        self
    }

    /// Pins every slice's starting threshold instead of deriving it from
    /// the slice's share of the physical capacity.
    #[must_use]
    pub fn with_initial_threshold(mut self, threshold: u64) -> Self {
        self.initial_threshold = Some(threshold);
        self
    }

    /// Seeds the Bernoulli drop draws to make runs reproducible.
    #[must_use]
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = seed;
        self
    }

    /// Validates the configuration and constructs a [`Trunk`].
    ///
    /// # Errors
    /// Returns an [`AhabError`] naming the first invalid parameter; see the
    /// variants for the accepted ranges.
    pub fn build(self) -> Result<Trunk> {
        self.validate()?;

        let max_weight = self.weights.iter().copied().fold(0.0f64, f64::max);
        let lpf = LpfParams::new(self.sketch.time_constant_ns(), 0, LpfMode::Rate);
        let math = RatioMath::from_kind(self.interpolator);

        let slices: Box<[SliceState]> = self
            .weights
            .iter()
            .map(|&weight| {
                let config = SliceConfig {
                    scale_factor: (max_weight / weight).round().max(1.0) as u64,
                    clamp_min: self.clamp_min,
                    clamp_max: self.clamp_max,
                };
                let share = (weight * self.physical_capacity as f64) as u64;
                let initial = self
                    .initial_threshold
                    .unwrap_or(share / INITIAL_THRESHOLD_DIVISOR)
                    .clamp(self.clamp_min, self.clamp_max);
                SliceState {
                    config,
                    estimator: ThresholdEstimator::new(initial, self.candidate_strategy, lpf),
                }
            })
            .collect();

        let capacity = CapacityEstimator::new(
            &self.weights,
            self.physical_capacity,
            self.capacity_mode,
            self.speculative,
            lpf,
        );
        let sketch = LpfMinSketch::new(&self.sketch);

        Ok(Trunk::new(
            slices,
            sketch,
            capacity,
            math,
            self.drop_policy,
            self.physical_capacity,
            self.rng_seed,
        ))
    }

    fn validate(&self) -> Result<()> {
        if self.weights.is_empty() {
            return Err(AhabError::NoSlices);
        }
        for (slice, &weight) in self.weights.iter().enumerate() {
            if !(weight > 0.0 && weight <= 1.0) {
                return Err(AhabError::WeightOutOfRange { slice, weight });
            }
        }
        let total: f64 = self.weights.iter().sum();
        if (total - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(AhabError::WeightSumInvalid { total });
        }
        if self.physical_capacity == 0 {
            return Err(AhabError::ZeroCapacity);
        }
        let (width, height) = (self.sketch.width(), self.sketch.height());
        if !(2..=8).contains(&width) || height == 0 || !height.is_power_of_two() {
            return Err(AhabError::SketchShapeInvalid { width, height });
        }
        if self.sketch.time_constant_ns() == 0 {
            return Err(AhabError::ZeroTimeConstant);
        }
        if self.sketch.scale_down() > 16 {
            return Err(AhabError::ScaleDownTooLarge {
                got: self.sketch.scale_down(),
            });
        }
        if let InterpolatorKind::TableBased {
            ratio_bits,
            mantissa_bits,
        } = self.interpolator
        {
            if !(3..=10).contains(&ratio_bits) {
                return Err(AhabError::RatioBitsInvalid { got: ratio_bits });
            }
            if !(4..=12).contains(&mantissa_bits) {
                return Err(AhabError::MantissaBitsInvalid { got: mantissa_bits });
            }
        }
        if self.clamp_min < 2 || self.clamp_min >= self.clamp_max {
            return Err(AhabError::ClampRangeInvalid {
                min: self.clamp_min,
                max: self.clamp_max,
            });
        }
        if let Some(initial) = self.initial_threshold {
            if initial < self.clamp_min || initial > self.clamp_max {
                return Err(AhabError::InitialThresholdOutOfRange {
                    got: initial,
                    min: self.clamp_min,
                    max: self.clamp_max,
                });
            }
        }
        Ok(())
    }
}
