//! # Core Engine Module
//!
//! The engagement-state synchronization core. Everything here is runtime-agnostic
//! except for task spawning in the invalidation listener, and talks to the
//! outside world only through the `backend` traits.
//!
//! ## Core Components:
//!
//! - **`enrichment`**: pure join of content rows with like and follow edges into
//!   viewer-specific items. Counts are always derived from edges.
//! - **`fetch_guard`**: the single in-flight marker that turns overlapping fetches
//!   of one store into no-ops.
//! - **`content_store`**: the observable item collection of one category.
//! - **`coordinator`**: optimistic like/follow toggles with snapshot rollback.
//! - **`invalidation`**: binds a push subscription to a store's `fetch`.
//! - **`session`**: one store per active category, rebuilt on category or
//!   viewer change and torn down on close.

/// Joins content rows with engagement edges.
pub mod enrichment;
/// Overlap prevention for fetch cycles.
pub mod fetch_guard;
/// The observable item collection of one category.
pub mod content_store;
/// Optimistic like/follow toggles.
pub mod coordinator;
/// Push-invalidation listener task.
pub mod invalidation;
/// Category lifecycle.
pub mod session;

// --- Public API Re-exports ---
pub use content_store::{AppliedPatch, ContentStore, FetchOutcome, StoreSnapshot};
pub use coordinator::{MutationCoordinator, MutationOutcome, MutationPhase};
pub use enrichment::enrich;
pub use fetch_guard::{FetchGuard, FetchPermit};
pub use invalidation::InvalidationListener;
pub use session::FeedSession;
