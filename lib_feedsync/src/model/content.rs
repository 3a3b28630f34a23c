//! # Content Items
//!
//! `ContentItem` mirrors a row of the backend `content` table. It is read-mostly:
//! this crate never creates or deletes one. The `likes` column is a counter the
//! backend maintains with triggers; it is advisory only; the authoritative count
//! is recomputed from like edges on every fetch (see `core::enrichment`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The feed tab a content item belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Stream,
    Listen,
    Blog,
    Gallery,
    Resources,
}

impl Category {
    /// Every category, in tab order.
    pub const ALL: [Category; 5] = [
        Category::Stream,
        Category::Listen,
        Category::Blog,
        Category::Gallery,
        Category::Resources,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Stream => "stream",
            Category::Listen => "listen",
            Category::Blog => "blog",
            Category::Gallery => "gallery",
            Category::Resources => "resources",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string names no known category.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown content category: {0}")]
pub struct ParseCategoryError(pub String);

impl FromStr for Category {
    type Err = ParseCategoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| ParseCategoryError(s.to_string()))
    }
}

/// A row of the backend `content` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: String,
    pub category: Category,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    /// Display name of the creator. Follow edges are keyed by this value.
    pub creator_name: String,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub views: u64,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub plays: u64,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub sales: u64,
    /// Trigger-maintained like counter. Never used for display, and may be
    /// negative after racing decrements.
    #[serde(default, deserialize_with = "lenient_signed")]
    pub likes: Option<i64>,
    #[serde(default)]
    pub is_premium: bool,
    #[serde(default)]
    pub price: Option<f64>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ContentItem {
    /// Builds an item with empty display fields and zeroed counters.
    pub fn new(
        id: impl Into<String>,
        category: Category,
        title: impl Into<String>,
        creator_name: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            category,
            title: title.into(),
            description: None,
            media_url: None,
            thumbnail_url: None,
            creator_name: creator_name.into(),
            views: 0,
            plays: 0,
            sales: 0,
            likes: None,
            is_premium: false,
            price: None,
            created_at,
            updated_at: None,
        }
    }
}

// Display counters are not part of the engagement state, so an out-of-range or
// mistyped value must never fail the whole row.
fn null_as_zero<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| v.as_u64()).unwrap_or(0))
}

fn lenient_signed<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| v.as_i64()))
}

/// A `ContentItem` plus the engagement state derived for one viewer.
///
/// Never persisted. Produced by `core::enrichment::enrich` on every fetch and
/// patched in place only by the mutation coordinator, whose patch has exactly
/// this shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedContentItem {
    #[serde(flatten)]
    pub item: ContentItem,
    /// Number of like edges referencing this item.
    pub like_count: u64,
    /// Whether the viewer has a like edge on this item.
    pub liked_by_viewer: bool,
    /// Whether the viewer follows this item's creator name.
    pub followed_by_viewer: bool,
}

impl EnrichedContentItem {
    pub fn id(&self) -> &str {
        &self.item.id
    }

    pub fn creator_name(&self) -> &str {
        &self.item.creator_name
    }
}
