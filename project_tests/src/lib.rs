//! # Cross-module Test Fixtures
//!
//! Shared builders for the scenarios under `tests/`, which drive feed sessions,
//! stores and coordinators against the in-memory backend.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use lib_feedsync::{Category, ContentItem, FollowEdge, LikeEdge, MemoryBackend, ViewerId};

/// A content row created `minute` minutes into 2024-03-01.
pub fn item(id: &str, category: Category, creator: &str, minute: u32) -> ContentItem {
    let created = Utc
        .with_ymd_and_hms(2024, 3, 1, 12, minute, 0)
        .single()
        .unwrap_or_else(Utc::now);
    ContentItem::new(id, category, format!("Title {}", id), creator, created)
}

pub fn like(viewer: &str, item_id: &str) -> LikeEdge {
    LikeEdge::new(ViewerId::from(viewer), item_id)
}

pub fn follow(viewer: &str, creator: &str) -> FollowEdge {
    FollowEdge::new(ViewerId::from(viewer), creator)
}

/// Two stream items by Jo and one by Mo, a gallery item by Ana. Item `s1` has
/// two likes (u1, u2); `me` follows Mo.
pub fn seeded_backend() -> Arc<MemoryBackend> {
    Arc::new(
        MemoryBackend::new()
            .with_content([
                item("s1", Category::Stream, "Jo", 1),
                item("s2", Category::Stream, "Jo", 2),
                item("s3", Category::Stream, "Mo", 3),
                item("g1", Category::Gallery, "Ana", 4),
            ])
            .with_likes([like("u1", "s1"), like("u2", "s1")])
            .with_follows([follow("me", "Mo")]),
    )
}

/// Polls `cond` until it holds, panicking after five seconds.
pub async fn eventually<F: FnMut() -> bool>(mut cond: F) {
    let polled = tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(polled.is_ok(), "condition not reached within 5s");
}

/// Awaits `fut`, panicking after five seconds.
pub async fn within<T>(fut: impl Future<Output = T>) -> T {
    match tokio::time::timeout(Duration::from_secs(5), fut).await {
        Ok(value) => value,
        Err(_) => panic!("future did not complete within 5s"),
    }
}
