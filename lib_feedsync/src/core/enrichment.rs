//! # Edge Enrichment Engine
//!
//! Pure transform from raw rows to the per-viewer view. No I/O and no state.
//!
//! ## Algorithm
//! 1.  One pass over the like edges builds `item id -> like count` and the set of
//!     item ids liked by the viewer. Duplicate edges for the same pair count once,
//!     since the backend models likes as a set.
//! 2.  One pass over the follow edges builds the set of creator names the viewer
//!     follows. Edges belonging to other followers are ignored.
//! 3.  One pass over the items maps each to its enriched form.
//!
//! Total cost is O(N + L + F). The trigger-maintained `likes` column on the item
//! is ignored: the count derived from this fetch's edges always wins.

use std::collections::{HashMap, HashSet};

use crate::model::{ContentItem, EnrichedContentItem, FollowEdge, LikeEdge, ViewerId};

/// Combines content rows with like and follow edges into the view for `viewer`.
///
/// With `viewer == None` every viewer flag is false ("public view"). The output
/// keeps the order and length of `items`.
pub fn enrich(
    items: Vec<ContentItem>,
    likes: &[LikeEdge],
    follows: &[FollowEdge],
    viewer: Option<&ViewerId>,
) -> Vec<EnrichedContentItem> {
    let mut seen: HashSet<(&str, &str)> = HashSet::with_capacity(likes.len());
    let mut like_counts: HashMap<&str, u64> = HashMap::new();
    let mut liked_by_viewer: HashSet<&str> = HashSet::new();

    for edge in likes {
        if !seen.insert((edge.viewer_id.as_str(), edge.item_id.as_str())) {
            continue;
        }
        *like_counts.entry(edge.item_id.as_str()).or_insert(0) += 1;
        if viewer == Some(&edge.viewer_id) {
            liked_by_viewer.insert(edge.item_id.as_str());
        }
    }

    let followed_creators: HashSet<&str> = match viewer {
        Some(v) => follows
            .iter()
            .filter(|edge| &edge.follower_id == v)
            .map(|edge| edge.creator_name.as_str())
            .collect(),
        None => HashSet::new(),
    };

    items
        .into_iter()
        .map(|item| {
            let like_count = like_counts.get(item.id.as_str()).copied().unwrap_or(0);
            let liked = liked_by_viewer.contains(item.id.as_str());
            let followed = followed_creators.contains(item.creator_name.as_str());
            EnrichedContentItem {
                item,
                like_count,
                liked_by_viewer: liked,
                followed_by_viewer: followed,
            }
        })
        .collect()
}
