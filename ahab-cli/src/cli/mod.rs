//! Command-line interface orchestration for the ahab replay driver.
//!
//! The CLI currently offers a `replay` command that streams a packet trace
//! through a trunk, ticking the epoch loop on simulated time, and reports
//! the resulting thresholds and capacities.

mod commands;

pub use commands::{
    CandidateMode, CapacityArg, Cli, CliError, Command, DropMode, InterpolatorMode, ReplayCommand,
    ReplaySummary, SliceReport, render_summary, run_cli,
};
