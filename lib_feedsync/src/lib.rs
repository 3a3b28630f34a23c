//! # lib_feedsync
//!
//! Engagement-state synchronization for categorized content feeds: viewer-specific
//! enrichment of content rows with like and follow edges, optimistic toggles with
//! rollback, and push-driven refetching.
//!
//! The core (`model`, `core`, `error`, the in-memory backend) is always compiled.
//! Network bindings and tooling are feature-gated:
//!
//! - `rest`: PostgREST backend over `retrieve::ky_http`.
//! - `realtime`: Phoenix websocket push channel.
//! - `configs`: layered configuration.
//! - `loggers`: `fern` log setup.

#![forbid(unsafe_code)]

pub mod backend;
pub mod core;
pub mod error;
pub mod model;

#[cfg(feature = "configs")]
pub mod configs;
#[cfg(feature = "loggers")]
pub mod loggers;
#[cfg(feature = "rest")]
pub mod retrieve;

pub use backend::{ChannelTopic, EdgeTable, FeedBackend, Invalidation, MemoryBackend, PushChannel, Subscription};
pub use crate::core::{ContentStore, FeedSession, FetchOutcome, MutationCoordinator, MutationOutcome, StoreSnapshot};
pub use error::{BackendError, BackendResult, ConfigError, FetchError, MutationError, MutationTarget};
pub use model::{Category, ContentItem, EnrichedContentItem, FollowEdge, LikeEdge, ViewerId};
