//! Command-line front end for the AHAB rate-fairness engine.

pub mod cli;
pub mod logging;
