//! Read-only state snapshots for control-plane exporters.

/// Monotonic runtime counters accumulated since construction.
///
/// Runtime anomalies are never surfaced as errors; they are counted here
/// instead so an exporter can watch for degradation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RuntimeCounters {
    /// Packets accepted by [`crate::Trunk::process`].
    pub packets: u64,
    /// Completed epoch ticks.
    pub epochs: u64,
    /// Packets whose timestamp regressed and was clamped forward.
    pub timestamp_regressions: u64,
    /// Scaled rate estimates that saturated the 32-bit range.
    pub rate_saturations: u64,
}

/// Per-slice state at snapshot time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SliceSnapshot {
    /// Index of the slice within the trunk.
    pub slice_id: usize,
    /// The per-flow byte-rate threshold currently enforced.
    pub threshold: u64,
    /// The slice's demand LPF read-out.
    pub demand_estimate: u64,
    /// The slice's share of the scaled trunk capacity.
    pub capacity: u64,
}

/// A consistent view of a trunk's control state.
///
/// Produced by [`crate::Trunk::snapshot`]; intended for rule installers and
/// telemetry exporters, which treat it as a fire-and-forget payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrunkSnapshot {
    /// The scaled trunk capacity chosen at the last epoch end.
    pub scaled_capacity: u64,
    /// Per-slice thresholds, demands, and capacities.
    pub slices: Vec<SliceSnapshot>,
    /// Monotonic runtime counters.
    pub counters: RuntimeCounters,
}
