//! # Configuration Modules
//!
//! Layered settings for the feed tools: built-in defaults, then a JSON config
//! file, then environment variables and command-line flags.

/// `FeedSyncConfig` and its layering.
pub mod config_feed;

pub use config_feed::{load_config, load_from, FeedSyncConfig, ResolvedConfig};
