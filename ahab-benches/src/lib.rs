//! Workload builders shared by the ahab benchmarks.

use ahab_core::{SketchParams, Trunk, TrunkBuilder};
use ahab_test_support::trace::{TraceBuilder, TracePacket};

/// A four-slice trunk sized like the reference testbed deployment.
#[must_use]
pub fn testbed_trunk() -> Trunk {
    TrunkBuilder::new()
        .with_weights(&[0.5, 0.25, 0.125, 0.125])
        .with_physical_capacity(64_500)
        .with_sketch_params(SketchParams::new(3, 2048).with_time_constant_ns(16_000_000))
        .build()
        .expect("benchmark configuration is valid")
}

/// A deterministic mixed-slice workload of `packets` packets.
#[must_use]
pub fn mixed_workload(packets: usize) -> Vec<TracePacket> {
    let per_slice = packets / 4;
    TraceBuilder::new(0xBE4C_4A0B)
        .with_max_spacing_ns(1_200)
        .slice(512, per_slice)
        .slice(256, per_slice)
        .slice(64, per_slice)
        .slice(64, packets - 3 * per_slice)
        .build()
}
