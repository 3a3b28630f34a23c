//! # Data Model
//!
//! Records exchanged with the backend and the per-viewer view derived from them.
//!
//! - **`content`**: `ContentItem` rows as the backend stores them, the `Category`
//!   classifier, and `EnrichedContentItem`, the derived view carrying like counts
//!   and viewer flags.
//! - **`edges`**: `LikeEdge` and `FollowEdge`, the relation rows whose existence
//!   means "true".
//! - **`viewer`**: the opaque identity of the signed-in member.

/// Content rows, categories and the enriched per-viewer view.
pub mod content;
/// Like and follow relation rows.
pub mod edges;
/// Opaque viewer identity.
pub mod viewer;

pub use content::{Category, ContentItem, EnrichedContentItem};
pub use edges::{FollowEdge, LikeEdge};
pub use viewer::ViewerId;
