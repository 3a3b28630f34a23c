//! # Engagement Edges
//!
//! An edge is a relation row linking a viewer to a target. Its existence means
//! "true" and its absence "false"; the backend keeps at most one row per pair.

use serde::{Deserialize, Serialize};

use crate::model::viewer::ViewerId;

/// A viewer liking a content item. Stored in the `likes` table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LikeEdge {
    /// The viewer who liked the item.
    #[serde(rename = "user_id")]
    pub viewer_id: ViewerId,
    /// The liked item.
    #[serde(rename = "content_id")]
    pub item_id: String,
}

impl LikeEdge {
    pub fn new(viewer_id: ViewerId, item_id: impl Into<String>) -> Self {
        Self {
            viewer_id,
            item_id: item_id.into(),
        }
    }
}

/// A viewer following a creator. Stored in the `follows` table.
///
/// Keyed by the creator's display name rather than an id, so a renamed creator
/// loses the follows recorded under the old name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FollowEdge {
    /// The viewer who follows.
    pub follower_id: ViewerId,
    /// The followed creator, by display name.
    pub creator_name: String,
}

impl FollowEdge {
    pub fn new(follower_id: ViewerId, creator_name: impl Into<String>) -> Self {
        Self {
            follower_id,
            creator_name: creator_name.into(),
        }
    }
}
