//! Integer primitives backing the fixed-point data path.
//!
//! Everything here is implementable with shifts, compares, and small table
//! lookups: a ternary-match most-significant-bit classifier, an approximate
//! division table, and a bounded monotone binary search.

mod divide;
mod search;
mod ternary;

pub(crate) use divide::{ApproxDivisionTable, Ratio, RatioMath};
pub(crate) use search::lowest_input_reaching;
pub(crate) use ternary::{MsbClassifier, msb64};

#[cfg(test)]
mod tests;
