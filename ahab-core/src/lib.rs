//! AHAB core library: approximate max-min fair-share bandwidth policing.
//!
//! A [`Trunk`] models a capped physical downlink shared by weighted traffic
//! *slices*. Every packet updates a time-decaying rate sketch; flows whose
//! estimated rate exceeds their slice's threshold shed a proportional
//! fraction of their bytes. An epoch tick re-slices the trunk across the
//! slices from their observed demands and converges each slice's threshold
//! towards its max-min fair per-flow rate by bracketed interpolation.
//!
//! The data path is integer-only: shifts, compares, and small table lookups.
//!
//! # Metrics
//!
//! With the `metrics` feature enabled the trunk emits:
//!
//! - `ahab_timestamp_regressions` (counter)
//! - `ahab_rate_saturations` (counter)
//! - `ahab_epochs` (counter)
//!
//! These metric names are stable for downstream crates. The same values are
//! always available without the feature through
//! [`TrunkSnapshot::counters`].

mod builder;
mod capacity;
mod config;
mod error;
mod lpf;
mod numeric;
mod sketch;
mod snapshot;
mod threshold;
mod trunk;

pub use crate::{
    builder::TrunkBuilder,
    capacity::exact_fair_threshold,
    config::{CandidateStrategy, CapacityMode, DropPolicy, InterpolatorKind, SketchParams},
    error::{AhabError, AhabErrorCode, Result},
    sketch::FlowKey,
    snapshot::{RuntimeCounters, SliceSnapshot, TrunkSnapshot},
    trunk::Trunk,
};
