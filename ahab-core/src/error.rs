//! Error types for the AHAB core library.
//!
//! Defines the configuration error enum exposed by the public API and a
//! convenient result alias. Runtime packet processing never surfaces errors;
//! it degrades gracefully and counts anomalies instead (see
//! [`crate::RuntimeCounters`]).

use std::fmt;

use thiserror::Error;

/// Stable codes describing [`AhabError`] variants.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum AhabErrorCode {
    /// No slice weights were supplied.
    NoSlices,
    /// A slice weight fell outside `(0, 1]`.
    WeightOutOfRange,
    /// Slice weights did not sum to one.
    WeightSumInvalid,
    /// The physical trunk capacity was zero.
    ZeroCapacity,
    /// The sketch width or height was outside its supported range.
    SketchShapeInvalid,
    /// The LPF time constant was zero.
    ZeroTimeConstant,
    /// The sketch read-out scale-down exceeded its supported range.
    ScaleDownTooLarge,
    /// The division-table operand width was outside its supported range.
    RatioBitsInvalid,
    /// The division-table mantissa width was outside its supported range.
    MantissaBitsInvalid,
    /// The threshold clamp range was empty or its floor too small.
    ClampRangeInvalid,
    /// The initial threshold fell outside the configured clamp range.
    InitialThresholdOutOfRange,
}

impl AhabErrorCode {
    /// Return the stable machine-readable representation of this error code.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoSlices => "TRUNK_NO_SLICES",
            Self::WeightOutOfRange => "TRUNK_WEIGHT_OUT_OF_RANGE",
            Self::WeightSumInvalid => "TRUNK_WEIGHT_SUM_INVALID",
            Self::ZeroCapacity => "TRUNK_ZERO_CAPACITY",
            Self::SketchShapeInvalid => "TRUNK_SKETCH_SHAPE_INVALID",
            Self::ZeroTimeConstant => "TRUNK_ZERO_TIME_CONSTANT",
            Self::ScaleDownTooLarge => "TRUNK_SCALE_DOWN_TOO_LARGE",
            Self::RatioBitsInvalid => "TRUNK_RATIO_BITS_INVALID",
            Self::MantissaBitsInvalid => "TRUNK_MANTISSA_BITS_INVALID",
            Self::ClampRangeInvalid => "TRUNK_CLAMP_RANGE_INVALID",
            Self::InitialThresholdOutOfRange => "TRUNK_INITIAL_THRESHOLD_OUT_OF_RANGE",
        }
    }
}

impl fmt::Display for AhabErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type produced when constructing a [`crate::Trunk`].
///
/// All variants are configuration errors: they are raised by
/// [`crate::TrunkBuilder::build`] and are non-recoverable without changing
/// the configuration.
#[non_exhaustive]
#[derive(Clone, Debug, Error, PartialEq)]
pub enum AhabError {
    /// No slice weights were supplied.
    #[error("a trunk requires at least one slice weight")]
    NoSlices,
    /// A slice weight fell outside `(0, 1]`.
    #[error("slice {slice} has weight {weight} outside (0, 1]")]
    WeightOutOfRange {
        /// Index of the offending slice.
        slice: usize,
        /// The rejected weight.
        weight: f64,
    },
    /// Slice weights did not sum to one.
    #[error("slice weights sum to {total}, expected 1.0")]
    WeightSumInvalid {
        /// Sum of the supplied weights.
        total: f64,
    },
    /// The physical trunk capacity was zero.
    #[error("physical capacity must be greater than zero")]
    ZeroCapacity,
    /// The sketch width or height was outside its supported range.
    #[error("sketch shape {width}x{height} is invalid (width in 2..=8, height a non-zero power of two)")]
    SketchShapeInvalid {
        /// Number of hash rows requested.
        width: usize,
        /// Number of cells per row requested.
        height: usize,
    },
    /// The LPF time constant was zero.
    #[error("the LPF time constant must be greater than zero")]
    ZeroTimeConstant,
    /// The sketch read-out scale-down exceeded its supported range.
    #[error("sketch scale-down {got} exceeds the supported maximum of 16")]
    ScaleDownTooLarge {
        /// The rejected scale-down shift.
        got: u32,
    },
    /// The division-table operand width was outside its supported range.
    #[error("ratio_bits {got} is outside the supported range 3..=10")]
    RatioBitsInvalid {
        /// The rejected operand width.
        got: u32,
    },
    /// The division-table mantissa width was outside its supported range.
    #[error("mantissa_bits {got} is outside the supported range 4..=12")]
    MantissaBitsInvalid {
        /// The rejected mantissa width.
        got: u32,
    },
    /// The threshold clamp range was empty or its floor too small.
    #[error("threshold clamp range [{min}, {max}] is invalid (min >= 2 and min < max required)")]
    ClampRangeInvalid {
        /// The rejected clamp floor.
        min: u64,
        /// The rejected clamp ceiling.
        max: u64,
    },
    /// The initial threshold fell outside the configured clamp range.
    #[error("initial threshold {got} is outside the clamp range [{min}, {max}]")]
    InitialThresholdOutOfRange {
        /// The rejected initial threshold.
        got: u64,
        /// The configured clamp floor.
        min: u64,
        /// The configured clamp ceiling.
        max: u64,
    },
}

impl AhabError {
    /// Retrieve the stable [`AhabErrorCode`] for this error.
    pub const fn code(&self) -> AhabErrorCode {
        match self {
            Self::NoSlices => AhabErrorCode::NoSlices,
            Self::WeightOutOfRange { .. } => AhabErrorCode::WeightOutOfRange,
            Self::WeightSumInvalid { .. } => AhabErrorCode::WeightSumInvalid,
            Self::ZeroCapacity => AhabErrorCode::ZeroCapacity,
            Self::SketchShapeInvalid { .. } => AhabErrorCode::SketchShapeInvalid,
            Self::ZeroTimeConstant => AhabErrorCode::ZeroTimeConstant,
            Self::ScaleDownTooLarge { .. } => AhabErrorCode::ScaleDownTooLarge,
            Self::RatioBitsInvalid { .. } => AhabErrorCode::RatioBitsInvalid,
            Self::MantissaBitsInvalid { .. } => AhabErrorCode::MantissaBitsInvalid,
            Self::ClampRangeInvalid { .. } => AhabErrorCode::ClampRangeInvalid,
            Self::InitialThresholdOutOfRange { .. } => AhabErrorCode::InitialThresholdOutOfRange,
        }
    }
}

/// Convenient alias for results returned by the core API.
pub type Result<T> = core::result::Result<T, AhabError>;
