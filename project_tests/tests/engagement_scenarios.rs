//! Enrichment and optimistic toggles through a feed session.

use std::sync::Arc;

use lib_feedsync::{Category, FeedSession, MutationError, ViewerId};
use project_tests::{eventually, item, like, seeded_backend, within};

async fn open_as(viewer: Option<&str>) -> (Arc<lib_feedsync::MemoryBackend>, FeedSession) {
    let backend = seeded_backend();
    let session = FeedSession::open(
        Category::Stream,
        viewer.map(ViewerId::from),
        backend.clone(),
        backend.clone(),
    )
    .await
    .unwrap();
    (backend, session)
}

#[tokio::test]
async fn anonymous_view_has_counts_but_no_viewer_flags() {
    let (backend, session) = open_as(None).await;
    let items = session.snapshot().items;

    assert_eq!(items.len(), 3);
    assert_eq!(items.iter().map(|i| i.id()).collect::<Vec<_>>(), vec!["s3", "s2", "s1"]);
    let s1 = items.iter().find(|i| i.id() == "s1").unwrap();
    assert_eq!(s1.like_count, 2);
    assert!(items.iter().all(|i| !i.liked_by_viewer && !i.followed_by_viewer));
    assert_eq!(backend.follow_reads(), 0);
}

#[tokio::test]
async fn signed_in_view_reflects_the_viewers_edges() {
    let (_backend, session) = open_as(Some("u1")).await;
    let s1 = session.store().item("s1").unwrap();
    assert_eq!(s1.like_count, 2);
    assert!(s1.liked_by_viewer);

    let (_backend, session) = open_as(Some("me")).await;
    let items = session.snapshot().items;
    for creator in ["Jo", "Mo"] {
        let flags: Vec<bool> = items
            .iter()
            .filter(|i| i.creator_name() == creator)
            .map(|i| i.followed_by_viewer)
            .collect();
        assert!(flags.windows(2).all(|w| w[0] == w[1]));
    }
    assert!(session.store().item("s3").unwrap().followed_by_viewer);
}

#[tokio::test]
async fn optimistic_like_reverts_when_the_write_fails() {
    let (backend, session) = open_as(Some("me")).await;
    let session = Arc::new(session);
    let before = session.snapshot().items;

    backend.pause_writes();
    backend.fail_writes(true);
    let toggle = {
        let session = session.clone();
        tokio::spawn(async move { session.toggle_like("s1").await })
    };

    eventually(|| session.store().item("s1").is_some_and(|i| i.like_count == 3)).await;
    assert!(session.store().item("s1").unwrap().liked_by_viewer);

    backend.resume_writes();
    let err = within(toggle).await.unwrap().unwrap_err();
    assert!(matches!(err, MutationError::Failed { .. }));
    assert_eq!(session.snapshot().items, before);
}

#[tokio::test]
async fn double_toggle_restores_the_original_item() {
    let (backend, session) = open_as(Some("me")).await;
    let original = session.store().item("s2").unwrap();

    session.toggle_like("s2").await.unwrap();
    session.toggle_like("s2").await.unwrap();

    assert_eq!(session.store().item("s2").unwrap(), original);
    assert!(backend.likes().iter().all(|e| e.item_id != "s2"));
}

#[tokio::test]
async fn mutations_on_different_targets_run_independently() {
    let (backend, session) = open_as(Some("me")).await;
    let session = Arc::new(session);

    backend.pause_writes();
    let like_s2 = {
        let session = session.clone();
        tokio::spawn(async move { session.toggle_like("s2").await })
    };
    let follow_jo = {
        let session = session.clone();
        tokio::spawn(async move { session.toggle_follow("Jo").await })
    };
    eventually(|| {
        let items = session.snapshot().items;
        items.iter().any(|i| i.id() == "s2" && i.liked_by_viewer)
            && items.iter().filter(|i| i.creator_name() == "Jo").all(|i| i.followed_by_viewer)
    })
    .await;

    backend.resume_writes();
    assert!(within(like_s2).await.unwrap().unwrap().now_active);
    assert!(within(follow_jo).await.unwrap().unwrap().now_active);
    assert_eq!(backend.writes(), 2);
}

#[tokio::test]
async fn rollback_leaves_concurrent_changes_to_other_items_alone() {
    let (backend, session) = open_as(Some("me")).await;
    let session = Arc::new(session);

    backend.pause_writes();
    backend.fail_writes(true);
    let toggle = {
        let session = session.clone();
        tokio::spawn(async move { session.toggle_like("s1").await })
    };
    eventually(|| session.store().item("s1").is_some_and(|i| i.liked_by_viewer)).await;

    // Another patch lands on an unrelated item while the write is pending.
    session
        .store()
        .apply_patch(|i| i.id() == "s3", |i| i.like_count = 9);

    backend.resume_writes();
    assert!(within(toggle).await.unwrap().is_err());
    assert_eq!(session.store().item("s1").unwrap().like_count, 2);
    assert_eq!(session.store().item("s3").unwrap().like_count, 9);
}

#[tokio::test]
async fn unauthenticated_toggles_are_refused() {
    let (backend, session) = open_as(None).await;
    let err = session.toggle_follow("Jo").await.unwrap_err();
    assert!(err.requires_sign_in());
    assert!(!err.is_retryable());
    assert_eq!(backend.writes(), 0);
}

#[tokio::test]
async fn foreign_likes_arrive_through_the_push_channel() {
    let (backend, session) = open_as(Some("me")).await;

    backend.external_like(like("u9", "s2"), true);
    eventually(|| session.store().item("s2").is_some_and(|i| i.like_count == 1)).await;

    backend.upsert_content(item("s4", Category::Stream, "Mo", 30));
    backend.external_like(like("u9", "s4"), true);
    eventually(|| session.store().item("s4").is_some_and(|i| i.like_count == 1)).await;
    assert!(session.store().item("s4").unwrap().followed_by_viewer);
}
