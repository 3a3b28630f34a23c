//! # Logging
//!
//! `log` facade backend for the feed tools: timestamped lines to stdout and to
//! a per-run file, with older run files pruned.

/// `fern` dispatch setup and log file pruning.
pub mod setup;

pub use setup::{level_filter, prune_old_logs, setup_logging, LoggerError};
