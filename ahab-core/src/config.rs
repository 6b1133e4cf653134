//! Configuration types shared across the AHAB engine.
//!
//! Strategy enums are resolved once at construction; the hot path never
//! dispatches on them per packet.

/// Shape and timing parameters for the flow-rate sketch.
///
/// # Examples
/// ```
/// use ahab_core::SketchParams;
///
/// let params = SketchParams::new(3, 2048).with_time_constant_ns(16_000_000);
/// assert_eq!(params.width(), 3);
/// assert_eq!(params.height(), 2048);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SketchParams {
    width: usize,
    height: usize,
    time_constant_ns: u64,
    scale_down: u32,
}

impl SketchParams {
    /// Creates sketch parameters with the given row count and row height.
    ///
    /// The height must be a power of two and the width must lie in `2..=8`;
    /// both are validated by [`crate::TrunkBuilder::build`].
    #[must_use]
    pub const fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            time_constant_ns: 16_000_000,
            scale_down: 0,
        }
    }

    /// Overrides the LPF time constant, in nanoseconds.
    #[must_use]
    pub const fn with_time_constant_ns(mut self, time_constant_ns: u64) -> Self {
        self.time_constant_ns = time_constant_ns;
        self
    }

    /// Overrides the right-shift applied to sketch read-outs.
    #[must_use]
    pub const fn with_scale_down(mut self, scale_down: u32) -> Self {
        self.scale_down = scale_down;
        self
    }

    /// Returns the number of independent hash rows.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Returns the number of LPF cells per row.
    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    /// Returns the LPF time constant in nanoseconds.
    #[must_use]
    pub const fn time_constant_ns(&self) -> u64 {
        self.time_constant_ns
    }

    /// Returns the right-shift applied to sketch read-outs.
    #[must_use]
    pub const fn scale_down(&self) -> u32 {
        self.scale_down
    }
}

impl Default for SketchParams {
    fn default() -> Self {
        Self::new(3, 2048)
    }
}

/// How a slice's next-epoch threshold candidates are spaced around the
/// current threshold.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CandidateStrategy {
    /// `(T - 2^(r-1), T, T + 2^(r-2))` with `r = round(log2 T)`, roughly
    /// `(T/2, T, 1.25T)`. The candidate deltas are powers of two, so the
    /// interpolation multiply reduces to a shift.
    PowerTwoJump,
    /// `(T/2, T, 2T)`.
    RatioThree,
    /// `(T/2, 3T/4, T, 3T/2, 2T)`.
    RatioFive,
}

/// How ratios are evaluated on the packet and interpolation paths.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InterpolatorKind {
    /// Full-width integer division.
    Exact,
    /// Mantissa/exponent lookup over operands rounded to `ratio_bits` bits.
    TableBased {
        /// Operand width after normalisation; recommended 5-8.
        ratio_bits: u32,
        /// Significant bits of stored quotients; recommended 6-8.
        mantissa_bits: u32,
    },
}

impl InterpolatorKind {
    /// The default lookup-table configuration.
    #[must_use]
    pub const fn table_default() -> Self {
        Self::TableBased {
            ratio_bits: 7,
            mantissa_bits: 8,
        }
    }
}

/// How the trunk's scaled capacity is derived each epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CapacityMode {
    /// Re-slice the trunk from observed per-slice demands.
    ScaledHistograms,
    /// Pin every slice to its weighted share of the physical capacity.
    Fixed,
}

/// How the per-packet drop decision is taken.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropPolicy {
    /// Deterministically account the expected number of dropped bytes.
    Expected,
    /// Drop whole packets with probability `1 - T/rate` (16-bit fixed point,
    /// capped below certainty).
    Bernoulli,
}

/// Immutable per-slice configuration fixed at trunk construction.
///
/// The weight itself lives with the capacity estimator; the dispatcher only
/// needs its reciprocal scale factor.
#[derive(Clone, Copy, Debug)]
pub(crate) struct SliceConfig {
    /// `max_weight / weight`, used to up-scale packet sizes before sketch
    /// insertion. Exact when weights are powers of two.
    pub(crate) scale_factor: u64,
    /// Lower bound on the slice threshold.
    pub(crate) clamp_min: u64,
    /// Upper bound on the slice threshold.
    pub(crate) clamp_max: u64,
}
