//! Approximate division via a mantissa/exponent lookup table.
//!
//! The table stores `(num + 0.5) / (den + 0.5)` for every operand pair after
//! both have been right-shifted so the denominator occupies exactly
//! `ratio_bits` bits. The `+0.5` unbiases the error introduced by rounding
//! the operands. Applying a quotient to a multiplicand then needs only a
//! widening multiply and a shift, which is the whole point: the packet path
//! never divides.

use crate::config::InterpolatorKind;

use super::ternary::{MsbClassifier, msb64};

/// Quotients smaller than `2^-16` are stored as zero.
const MIN_QUOTIENT_EXP: i32 = -16;

/// A quotient in `mantissa * 2^exponent` form.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Ratio {
    mantissa: u64,
    exponent: i32,
}

impl Ratio {
    /// The zero quotient.
    pub(crate) const ZERO: Self = Self {
        mantissa: 0,
        exponent: 0,
    };

    /// The unit quotient.
    pub(crate) const ONE: Self = Self {
        mantissa: 1,
        exponent: 0,
    };

    pub(crate) const fn new(mantissa: u64, exponent: i32) -> Self {
        Self { mantissa, exponent }
    }

    /// Computes `x * self`, rounding toward zero and saturating at
    /// `u64::MAX`.
    pub(crate) fn apply(self, x: u64) -> u64 {
        let wide = u128::from(x) * u128::from(self.mantissa);
        let shifted = if self.exponent >= 0 {
            wide.checked_shl(self.exponent.unsigned_abs())
                .unwrap_or(u128::MAX)
        } else {
            let shift = self.exponent.unsigned_abs();
            if shift >= 128 { 0 } else { wide >> shift }
        };
        u64::try_from(shifted).unwrap_or(u64::MAX)
    }
}

/// Lookup table mapping normalised `(num, den)` pairs to quotients.
#[derive(Clone, Debug)]
pub(crate) struct ApproxDivisionTable {
    ratio_bits: u32,
    entries: Box<[Ratio]>,
    classifier: MsbClassifier,
}

impl ApproxDivisionTable {
    /// Populates the table for `den` in `[2^(ratio_bits-1), 2^ratio_bits)`
    /// and `num <= den`. Table construction is the one place arbitrary
    /// precision is acceptable; the data path only reads it.
    pub(crate) fn new(ratio_bits: u32, mantissa_bits: u32) -> Self {
        let half = 1usize << (ratio_bits - 1);
        let mut entries = vec![Ratio::ZERO; half << ratio_bits].into_boxed_slice();
        for den in half..(half << 1) {
            for num in 0..=den {
                let quotient = (num as f64 + 0.5) / (den as f64 + 0.5);
                let index = ((den - half) << ratio_bits) + num;
                entries[index] = quantise(quotient, mantissa_bits);
            }
        }
        Self {
            ratio_bits,
            entries,
            classifier: MsbClassifier::new(),
        }
    }

    /// Looks up `num / den` after normalising `den` to `ratio_bits` bits.
    ///
    /// Requires `num <= den` and `den > 0`; out-of-contract operands clamp.
    pub(crate) fn ratio(&self, num: u64, den: u64) -> Ratio {
        if den == 0 || num == 0 {
            return Ratio::ZERO;
        }
        if num >= den {
            return Ratio::ONE;
        }
        let msb = self.msb_of(den);
        let target = self.ratio_bits - 1;
        let (num_n, den_n) = if msb >= target {
            let shift = msb - target;
            (num >> shift, den >> shift)
        } else {
            let shift = target - msb;
            (num << shift, den << shift)
        };
        let half = 1usize << (self.ratio_bits - 1);
        let index = ((den_n as usize - half) << self.ratio_bits) + num_n as usize;
        self.entries[index]
    }

    fn msb_of(&self, den: u64) -> u32 {
        u32::try_from(den).map_or_else(
            |_| msb64(den),
            |narrow| self.classifier.classify(narrow).unwrap_or(0),
        )
    }
}

fn quantise(quotient: f64, mantissa_bits: u32) -> Ratio {
    if quotient < f64::powi(2.0, MIN_QUOTIENT_EXP) {
        return Ratio::ZERO;
    }
    let exponent = quotient.log2().floor() as i32 - mantissa_bits as i32 + 1;
    let mantissa = (quotient * f64::powi(2.0, -exponent)).round() as u64;
    Ratio::new(mantissa, exponent)
}

/// Ratio evaluation strategy selected once at construction.
#[derive(Clone, Debug)]
pub(crate) enum RatioMath {
    /// Full-width integer division, expressed in the same mantissa/exponent
    /// form so both strategies share one application path.
    Exact,
    /// Mantissa/exponent lookup over rounded operands.
    Table(ApproxDivisionTable),
}

impl RatioMath {
    pub(crate) fn from_kind(kind: InterpolatorKind) -> Self {
        match kind {
            InterpolatorKind::Exact => Self::Exact,
            InterpolatorKind::TableBased {
                ratio_bits,
                mantissa_bits,
            } => Self::Table(ApproxDivisionTable::new(ratio_bits, mantissa_bits)),
        }
    }

    /// Computes `num / den` with `num <= den`, as a [`Ratio`].
    pub(crate) fn ratio(&self, num: u64, den: u64) -> Ratio {
        match self {
            Self::Exact => {
                if den == 0 || num == 0 {
                    Ratio::ZERO
                } else if num >= den {
                    Ratio::ONE
                } else {
                    let mantissa = ((u128::from(num) << 32) / u128::from(den)) as u64;
                    Ratio::new(mantissa, -32)
                }
            }
            Self::Table(table) => table.ratio(num, den),
        }
    }

    /// Bytes of a `size`-byte packet a policer admits in expectation when
    /// the flow runs at `rate` against `limit`: `size * min(1, limit/rate)`,
    /// rounded toward zero.
    pub(crate) fn bytes_accepted(&self, rate: u64, limit: u64, size: u64) -> u64 {
        if limit >= rate {
            size
        } else {
            self.ratio(limit, rate).apply(size)
        }
    }
}
