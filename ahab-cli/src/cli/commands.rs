//! Command implementations and argument parsing for the ahab CLI.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use ahab_core::{
    AhabError, CandidateStrategy, CapacityMode, DropPolicy, FlowKey, InterpolatorKind,
    SketchParams, Trunk, TrunkBuilder, exact_fair_threshold,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

/// Top-level CLI options parsed by [`clap`].
#[derive(Debug, Parser, Clone)]
#[command(name = "ahab", about = "Replay packet traces through the AHAB fair-share policer.")]
pub struct Cli {
    /// Command to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Supported CLI commands.
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Stream a packet trace through a trunk and report the outcome.
    Replay(ReplayCommand),
}

/// Options accepted by the `replay` command.
#[derive(Debug, Args, Clone)]
pub struct ReplayCommand {
    /// Path to a trace file with one `timestamp_ns,size,slice,flow` packet
    /// per line. Lines starting with `#` are skipped.
    pub trace: PathBuf,

    /// Physical trunk capacity in bytes per epoch.
    #[arg(long)]
    pub capacity: u64,

    /// Comma-separated slice weights; must sum to one.
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    pub weights: Vec<f64>,

    /// Epoch length in nanoseconds of trace time.
    #[arg(long, default_value_t = 100_000_000)]
    pub epoch_ns: u64,

    /// Sketch LPF time constant in nanoseconds.
    #[arg(long, default_value_t = 16_000_000)]
    pub time_constant_ns: u64,

    /// Threshold candidate spacing strategy.
    #[arg(long, value_enum, default_value = "power-two")]
    pub candidates: CandidateMode,

    /// Ratio evaluation strategy for drops and interpolation.
    #[arg(long, value_enum, default_value = "table")]
    pub interpolator: InterpolatorMode,

    /// Capacity derivation mode.
    #[arg(long, value_enum, default_value = "scaled")]
    pub capacity_mode: CapacityArg,

    /// Disable speculative scaling when the trunk is under-subscribed.
    #[arg(long)]
    pub no_speculative: bool,

    /// Per-packet drop decision policy.
    #[arg(long, value_enum, default_value = "expected")]
    pub drop_policy: DropMode,

    /// Pin every slice's starting threshold.
    #[arg(long)]
    pub initial_threshold: Option<u64>,

    /// Emit the summary as JSON instead of the text table.
    #[arg(long)]
    pub json: bool,
}

/// Candidate strategies exposed on the command line.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CandidateMode {
    /// Power-of-two jumps, shift-friendly.
    PowerTwo,
    /// Halving/doubling triplet.
    RatioThree,
    /// Five-point ratio ladder.
    RatioFive,
}

impl From<CandidateMode> for CandidateStrategy {
    fn from(mode: CandidateMode) -> Self {
        match mode {
            CandidateMode::PowerTwo => Self::PowerTwoJump,
            CandidateMode::RatioThree => Self::RatioThree,
            CandidateMode::RatioFive => Self::RatioFive,
        }
    }
}

/// Interpolator strategies exposed on the command line.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum InterpolatorMode {
    /// Full-width integer division.
    Exact,
    /// Approximate division table with default widths.
    Table,
}

impl From<InterpolatorMode> for InterpolatorKind {
    fn from(mode: InterpolatorMode) -> Self {
        match mode {
            InterpolatorMode::Exact => Self::Exact,
            InterpolatorMode::Table => Self::table_default(),
        }
    }
}

/// Capacity modes exposed on the command line.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CapacityArg {
    /// Re-slice the trunk from observed demands.
    Scaled,
    /// Pin weighted shares of the physical capacity.
    Fixed,
}

impl From<CapacityArg> for CapacityMode {
    fn from(mode: CapacityArg) -> Self {
        match mode {
            CapacityArg::Scaled => Self::ScaledHistograms,
            CapacityArg::Fixed => Self::Fixed,
        }
    }
}

/// Drop policies exposed on the command line.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DropMode {
    /// Expected-bytes accounting.
    Expected,
    /// Seeded whole-packet draws.
    Bernoulli,
}

impl From<DropMode> for DropPolicy {
    fn from(mode: DropMode) -> Self {
        match mode {
            DropMode::Expected => Self::Expected,
            DropMode::Bernoulli => Self::Bernoulli,
        }
    }
}

/// Errors surfaced while executing CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// File I/O failed while loading the trace.
    #[error("failed to open `{path}`: {source}")]
    Io {
        /// Path that triggered the failure.
        path: PathBuf,
        /// Underlying operating system error.
        #[source]
        source: io::Error,
    },
    /// A trace line could not be parsed.
    #[error("trace line {line}: {reason}")]
    Trace {
        /// One-based line number of the malformed record.
        line: usize,
        /// What was wrong with it.
        reason: String,
    },
    /// Trunk construction failed.
    #[error(transparent)]
    Core(#[from] AhabError),
}

/// Per-slice outcome of a replay.
#[derive(Debug, Clone, Serialize)]
pub struct SliceReport {
    /// Index of the slice within the trunk.
    pub slice_id: usize,
    /// Final enforced threshold.
    pub threshold: u64,
    /// Final demand LPF read-out.
    pub demand_estimate: u64,
    /// Final share of the scaled capacity.
    pub capacity: u64,
    /// Exact fair threshold over the last epoch's per-flow byte counts;
    /// the oracle the approximate threshold converges towards.
    pub reference_threshold: u64,
}

/// Summarises the outcome of replaying a trace.
#[derive(Debug, Clone, Serialize)]
pub struct ReplaySummary {
    /// Name of the replayed trace file.
    pub trace: String,
    /// Packets processed.
    pub packets: u64,
    /// Bytes offered to the trunk.
    pub bytes: u64,
    /// Bytes dropped by the policer.
    pub dropped_bytes: u64,
    /// Epoch ticks executed.
    pub epochs: u64,
    /// Final scaled trunk capacity.
    pub scaled_capacity: u64,
    /// Clamped timestamp regressions observed in the trace.
    pub timestamp_regressions: u64,
    /// Saturated rate estimates.
    pub rate_saturations: u64,
    /// Per-slice outcomes.
    pub slices: Vec<SliceReport>,
}

/// Executes the CLI command represented by `cli`.
///
/// # Errors
/// Returns [`CliError`] when configuration, trace I/O, or parsing fails.
pub fn run_cli(cli: Cli) -> Result<ReplaySummary, CliError> {
    match cli.command {
        Command::Replay(replay) => run_replay(replay),
    }
}

/// Per-flow byte counts for the current epoch, kept outside the core so the
/// hot path stays free of per-flow state.
#[derive(Default)]
struct FlowLedger {
    bytes: HashMap<(usize, u64), u64>,
}

impl FlowLedger {
    fn record(&mut self, slice_id: usize, flow: u64, size: u64) {
        *self.bytes.entry((slice_id, flow)).or_default() += size;
    }

    /// Exact fair thresholds for the epoch just ended, one per slice.
    fn reference_thresholds(&self, trunk: &Trunk) -> Vec<u64> {
        let snapshot = trunk.snapshot();
        snapshot
            .slices
            .iter()
            .map(|slice| {
                let demands: Vec<u64> = self
                    .bytes
                    .iter()
                    .filter(|((slice_id, _), _)| *slice_id == slice.slice_id)
                    .map(|(_, &bytes)| bytes)
                    .collect();
                exact_fair_threshold(&demands, slice.capacity)
            })
            .collect()
    }

    fn clear(&mut self) {
        self.bytes.clear();
    }
}

fn run_replay(command: ReplayCommand) -> Result<ReplaySummary, CliError> {
    let mut trunk = build_trunk(&command)?;
    let reader = open_trace_reader(&command.trace)?;

    let mut ledger = FlowLedger::default();
    let mut references = vec![0u64; trunk.num_slices()];
    let mut bytes = 0u64;
    let mut dropped_bytes = 0u64;
    let mut next_tick: Option<u64> = None;

    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| CliError::Io {
            path: command.trace.clone(),
            source,
        })?;
        let record = line.trim();
        if record.is_empty() || record.starts_with('#') {
            continue;
        }
        let (timestamp_ns, size, slice_id, flow) =
            parse_trace_line(record).map_err(|reason| CliError::Trace {
                line: index + 1,
                reason,
            })?;

        let tick = *next_tick.get_or_insert(timestamp_ns + command.epoch_ns);
        if timestamp_ns >= tick {
            references = finish_epoch(&mut trunk, &mut ledger);
            // Idle epochs keep thresholds, so a long quiet gap collapses
            // into a single tick.
            let elapsed = (timestamp_ns - tick) / command.epoch_ns;
            next_tick = Some(tick + (elapsed + 1) * command.epoch_ns);
        }

        bytes += size;
        dropped_bytes += trunk.process(timestamp_ns, size, slice_id, FlowKey::new(flow));
        ledger.record(slice_id, flow, size);
    }
    if !ledger.bytes.is_empty() {
        references = finish_epoch(&mut trunk, &mut ledger);
    }

    let snapshot = trunk.snapshot();
    info!(
        packets = snapshot.counters.packets,
        dropped_bytes, "replay complete"
    );
    Ok(ReplaySummary {
        trace: command
            .trace
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("trace")
            .to_owned(),
        packets: snapshot.counters.packets,
        bytes,
        dropped_bytes,
        epochs: snapshot.counters.epochs,
        scaled_capacity: snapshot.scaled_capacity,
        timestamp_regressions: snapshot.counters.timestamp_regressions,
        rate_saturations: snapshot.counters.rate_saturations,
        slices: snapshot
            .slices
            .iter()
            .map(|slice| SliceReport {
                slice_id: slice.slice_id,
                threshold: slice.threshold,
                demand_estimate: slice.demand_estimate,
                capacity: slice.capacity,
                reference_threshold: references.get(slice.slice_id).copied().unwrap_or(0),
            })
            .collect(),
    })
}

fn finish_epoch(trunk: &mut Trunk, ledger: &mut FlowLedger) -> Vec<u64> {
    trunk.end_epoch();
    let references = ledger.reference_thresholds(trunk);
    ledger.clear();
    references
}

fn build_trunk(command: &ReplayCommand) -> Result<Trunk, CliError> {
    let mut builder = TrunkBuilder::new()
        .with_weights(&command.weights)
        .with_physical_capacity(command.capacity)
        .with_sketch_params(
            SketchParams::new(3, 2048).with_time_constant_ns(command.time_constant_ns),
        )
        .with_candidate_strategy(command.candidates.into())
        .with_interpolator(command.interpolator.into())
        .with_capacity_mode(command.capacity_mode.into())
        .with_speculative_scaling(!command.no_speculative)
        .with_drop_policy(command.drop_policy.into());
    if let Some(threshold) = command.initial_threshold {
        builder = builder.with_initial_threshold(threshold);
    }
    Ok(builder.build()?)
}

fn parse_trace_line(record: &str) -> Result<(u64, u64, usize, u64), String> {
    let mut fields = record.split(',').map(str::trim);
    let mut next_field = |name: &str| {
        fields
            .next()
            .ok_or_else(|| format!("missing field `{name}`"))
    };
    let timestamp = parse_field(next_field("timestamp_ns")?, "timestamp_ns")?;
    let size = parse_field(next_field("size")?, "size")?;
    let slice_id = parse_field(next_field("slice")?, "slice")? as usize;
    let flow = parse_field(next_field("flow")?, "flow")?;
    Ok((timestamp, size, slice_id, flow))
}

fn parse_field(raw: &str, name: &str) -> Result<u64, String> {
    raw.parse::<u64>()
        .map_err(|_| format!("field `{name}` is not an unsigned integer: `{raw}`"))
}

fn open_trace_reader(path: &Path) -> Result<BufReader<File>, CliError> {
    let file = File::open(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(BufReader::new(file))
}

/// Renders `summary` to `writer` in a human-readable text format.
///
/// # Errors
/// Returns [`io::Error`] if writing to the supplied writer fails.
pub fn render_summary(summary: &ReplaySummary, mut writer: impl Write) -> io::Result<()> {
    writeln!(writer, "trace: {}", summary.trace)?;
    writeln!(
        writer,
        "packets: {}  bytes: {}  dropped: {}",
        summary.packets, summary.bytes, summary.dropped_bytes
    )?;
    writeln!(
        writer,
        "epochs: {}  scaled capacity: {}",
        summary.epochs, summary.scaled_capacity
    )?;
    if summary.timestamp_regressions > 0 || summary.rate_saturations > 0 {
        writeln!(
            writer,
            "anomalies: {} timestamp regressions, {} rate saturations",
            summary.timestamp_regressions, summary.rate_saturations
        )?;
    }
    writeln!(writer, "slice\tthreshold\tdemand\tcapacity\treference")?;
    for slice in &summary.slices {
        writeln!(
            writer,
            "{}\t{}\t{}\t{}\t{}",
            slice.slice_id,
            slice.threshold,
            slice.demand_estimate,
            slice.capacity,
            slice.reference_threshold
        )?;
    }
    Ok(())
}
