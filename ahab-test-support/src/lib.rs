//! Shared test utilities used across ahab crates.

pub mod logging {
    //! Tracing bootstrap for tests.

    use std::sync::OnceLock;

    static INITIALISED: OnceLock<()> = OnceLock::new();

    /// Installs a per-test tracing subscriber once per process.
    ///
    /// Safe to call from every test; later calls are no-ops, as is losing
    /// the race against a subscriber installed elsewhere.
    pub fn init() {
        INITIALISED.get_or_init(|| {
            let _ = tracing_subscriber::fmt()
                .with_test_writer()
                .with_max_level(tracing_subscriber::filter::LevelFilter::DEBUG)
                .try_init();
        });
    }
}

pub mod trace {
    //! Deterministic synthetic packet traces.
    //!
    //! A [`TraceBuilder`] produces the same packet sequence for the same
    //! seed, with strictly increasing timestamps and a randomised interleave
    //! across slices, so engine tests and benches can replay identical load
    //! patterns.

    use rand::{Rng, SeedableRng, rngs::SmallRng};
    use std::fmt::Write as _;

    /// One synthetic packet.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct TracePacket {
        /// Monotonic timestamp in nanoseconds.
        pub timestamp_ns: u64,
        /// Payload size in bytes.
        pub size: u64,
        /// Destination slice.
        pub slice_id: usize,
        /// Raw flow identifier.
        pub flow: u64,
    }

    #[derive(Clone, Copy, Debug)]
    struct SliceLoad {
        flows: u64,
        packets: usize,
    }

    /// Builds deterministic multi-slice packet traces.
    ///
    /// # Examples
    /// ```
    /// use ahab_test_support::trace::TraceBuilder;
    ///
    /// let trace = TraceBuilder::new(7).slice(4, 100).slice(2, 50).build();
    /// assert_eq!(trace.len(), 150);
    /// assert!(trace.windows(2).all(|w| w[0].timestamp_ns < w[1].timestamp_ns));
    /// ```
    #[derive(Clone, Debug)]
    pub struct TraceBuilder {
        seed: u64,
        start_ns: u64,
        max_spacing_ns: u64,
        slices: Vec<SliceLoad>,
    }

    impl TraceBuilder {
        /// Creates a builder whose output is fully determined by `seed`.
        #[must_use]
        pub fn new(seed: u64) -> Self {
            Self {
                seed,
                start_ns: 0,
                max_spacing_ns: 2_000,
                slices: Vec::new(),
            }
        }

        /// Offsets every timestamp by `start_ns`.
        #[must_use]
        pub fn with_start_ns(mut self, start_ns: u64) -> Self {
            self.start_ns = start_ns;
            self
        }

        /// Caps the random gap between consecutive packets.
        #[must_use]
        pub fn with_max_spacing_ns(mut self, max_spacing_ns: u64) -> Self {
            self.max_spacing_ns = max_spacing_ns.max(2);
            self
        }

        /// Appends a slice sending `packets` packets spread over `flows`
        /// distinct flows.
        #[must_use]
        pub fn slice(mut self, flows: u64, packets: usize) -> Self {
            self.slices.push(SliceLoad {
                flows: flows.max(1),
                packets,
            });
            self
        }

        /// Generates the trace: slices interleaved at random, timestamps
        /// strictly increasing.
        #[must_use]
        pub fn build(&self) -> Vec<TracePacket> {
            let mut rng = SmallRng::seed_from_u64(self.seed);
            let mut remaining: Vec<usize> = self.slices.iter().map(|s| s.packets).collect();
            let total: usize = remaining.iter().sum();
            let mut now = self.start_ns;
            let mut packets = Vec::with_capacity(total);
            for _ in 0..total {
                let mut pick = rng.gen_range(0..remaining.iter().sum::<usize>());
                let slice_id = remaining
                    .iter()
                    .position(|&left| {
                        if pick < left {
                            true
                        } else {
                            pick -= left;
                            false
                        }
                    })
                    .unwrap_or(0);
                remaining[slice_id] -= 1;
                now += rng.gen_range(1..self.max_spacing_ns);
                packets.push(TracePacket {
                    timestamp_ns: now,
                    size: rng.gen_range(40..1_500),
                    slice_id,
                    flow: rng.gen_range(0..self.slices[slice_id].flows),
                });
            }
            packets
        }
    }

    /// Renders a trace in the CLI's `timestamp,size,slice,flow` format.
    #[must_use]
    pub fn to_csv(packets: &[TracePacket]) -> String {
        let mut out = String::new();
        for packet in packets {
            let _ = writeln!(
                out,
                "{},{},{},{}",
                packet.timestamp_ns, packet.size, packet.slice_id, packet.flow
            );
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::trace::{TraceBuilder, to_csv};
    use rstest::rstest;

    #[rstest]
    #[case(1)]
    #[case(0xDEAD_BEEF)]
    fn identical_seeds_produce_identical_traces(#[case] seed: u64) {
        let build = || TraceBuilder::new(seed).slice(8, 200).slice(2, 100).build();
        assert_eq!(build(), build());
    }

    #[test]
    fn timestamps_are_strictly_increasing() {
        let trace = TraceBuilder::new(3).slice(4, 500).build();
        assert!(trace.windows(2).all(|w| w[0].timestamp_ns < w[1].timestamp_ns));
    }

    #[test]
    fn every_slice_sends_its_packet_budget() {
        let trace = TraceBuilder::new(5).slice(4, 120).slice(1, 30).build();
        let first = trace.iter().filter(|p| p.slice_id == 0).count();
        let second = trace.iter().filter(|p| p.slice_id == 1).count();
        assert_eq!((first, second), (120, 30));
    }

    #[test]
    fn csv_has_one_line_per_packet() {
        let trace = TraceBuilder::new(9).slice(2, 25).build();
        let csv = to_csv(&trace);
        assert_eq!(csv.lines().count(), 25);
        let fields: Vec<&str> = csv.lines().next().expect("non-empty").split(',').collect();
        assert_eq!(fields.len(), 4);
    }
}
