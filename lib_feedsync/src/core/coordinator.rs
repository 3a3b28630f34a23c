//! # Optimistic Mutation Coordinator
//!
//! Toggles like and follow state for the viewer. Each invocation walks
//! `Idle -> Applied -> {Confirmed | RolledBack}`:
//!
//! 1.  **Applied**: the inverted flag (and, for likes, the count moved by one,
//!     floored at zero) is written into the content store synchronously, before
//!     any network round trip. The pre-mutation items are kept as the rollback
//!     snapshot.
//! 2.  **Durable write**: the matching edge row is inserted or deleted.
//! 3.  **Confirmed**: the patch stands until the next fetch reconciles it.
//! 4.  **RolledBack**: the snapshot items are written back as they were; the
//!     rest of the collection is left as it is now.
//!
//! Mutations on different targets run independently. Two mutations on the same
//! target are not serialized: the last durable write wins and the next fetch
//! reconciles the view.

use std::fmt;
use std::sync::Arc;

use crate::backend::FeedBackend;
use crate::core::content_store::{AppliedPatch, ContentStore};
use crate::error::{BackendResult, MutationError, MutationTarget};
use crate::model::{FollowEdge, LikeEdge, ViewerId};

/// Lifecycle of one mutation invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationPhase {
    Idle,
    Applied,
    Confirmed,
    RolledBack,
}

impl fmt::Display for MutationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MutationPhase::Idle => "idle",
            MutationPhase::Applied => "applied",
            MutationPhase::Confirmed => "confirmed",
            MutationPhase::RolledBack => "rolled back",
        };
        f.write_str(name)
    }
}

/// A confirmed toggle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationOutcome {
    pub target: MutationTarget,
    /// The edge exists after the toggle (liked / following).
    pub now_active: bool,
    /// The item's like count after the toggle; `None` for follows.
    pub like_count: Option<u64>,
    /// Number of items the patch touched.
    pub items_patched: usize,
}

/// Applies like/follow toggles against one content store.
pub struct MutationCoordinator {
    store: Arc<ContentStore>,
    backend: Arc<dyn FeedBackend>,
}

impl MutationCoordinator {
    pub fn new(store: Arc<ContentStore>, backend: Arc<dyn FeedBackend>) -> Self {
        Self { store, backend }
    }

    pub fn store(&self) -> &Arc<ContentStore> {
        &self.store
    }

    /// Likes `item_id` for `viewer`, or removes the like if it is already there.
    pub async fn toggle_like(
        &self,
        viewer: Option<&ViewerId>,
        item_id: &str,
    ) -> Result<MutationOutcome, MutationError> {
        let viewer = viewer.ok_or(MutationError::Unauthenticated)?;
        let target = MutationTarget::Like {
            item_id: item_id.to_string(),
        };
        let mut phase = MutationPhase::Idle;

        let patch = self
            .store
            .apply_patch(
                |item| item.id() == item_id,
                |item| {
                    item.liked_by_viewer = !item.liked_by_viewer;
                    item.like_count = if item.liked_by_viewer {
                        item.like_count.saturating_add(1)
                    } else {
                        item.like_count.saturating_sub(1)
                    };
                },
            )
            .ok_or_else(|| MutationError::UnknownTarget(target.clone()))?;
        advance(&mut phase, MutationPhase::Applied, &target);

        let liked = patch.after[0].liked_by_viewer;
        let like_count = patch.after[0].like_count;
        let edge = LikeEdge::new(viewer.clone(), item_id);
        let write = if liked {
            self.backend.insert_like(&edge).await
        } else {
            self.backend.delete_like(&edge).await
        };

        self.settle(phase, target, patch, write, liked, Some(like_count))
    }

    /// Follows `creator_name` for `viewer`, or unfollows if already following.
    ///
    /// Every item of that creator in the store is patched together, so all of
    /// them agree on `followed_by_viewer`.
    pub async fn toggle_follow(
        &self,
        viewer: Option<&ViewerId>,
        creator_name: &str,
    ) -> Result<MutationOutcome, MutationError> {
        let viewer = viewer.ok_or(MutationError::Unauthenticated)?;
        let target = MutationTarget::Follow {
            creator_name: creator_name.to_string(),
        };
        let mut phase = MutationPhase::Idle;

        let following = self
            .store
            .items()
            .iter()
            .find(|item| item.creator_name() == creator_name)
            .map(|item| !item.followed_by_viewer)
            .ok_or_else(|| MutationError::UnknownTarget(target.clone()))?;

        let patch = self
            .store
            .apply_patch(
                |item| item.creator_name() == creator_name,
                |item| item.followed_by_viewer = following,
            )
            .ok_or_else(|| MutationError::UnknownTarget(target.clone()))?;
        advance(&mut phase, MutationPhase::Applied, &target);

        let edge = FollowEdge::new(viewer.clone(), creator_name);
        let write = if following {
            self.backend.insert_follow(&edge).await
        } else {
            self.backend.delete_follow(&edge).await
        };

        self.settle(phase, target, patch, write, following, None)
    }

    fn settle(
        &self,
        mut phase: MutationPhase,
        target: MutationTarget,
        patch: AppliedPatch,
        write: BackendResult<()>,
        active: bool,
        like_count: Option<u64>,
    ) -> Result<MutationOutcome, MutationError> {
        match write {
            Ok(()) => {
                advance(&mut phase, MutationPhase::Confirmed, &target);
                Ok(MutationOutcome {
                    target,
                    now_active: active,
                    like_count,
                    items_patched: patch.after.len(),
                })
            }
            Err(source) => {
                let restored = self.store.restore(&patch.before);
                advance(&mut phase, MutationPhase::RolledBack, &target);
                log::warn!(
                    "Durable write for {} failed, restored {} item(s): {}",
                    target,
                    restored,
                    source
                );
                Err(MutationError::Failed { target, source })
            }
        }
    }
}

fn advance(phase: &mut MutationPhase, next: MutationPhase, target: &MutationTarget) {
    log::debug!("Mutation {}: {} -> {}", target, phase, next);
    *phase = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::model::{Category, ContentItem};
    use chrono::{TimeZone, Utc};

    fn item(id: &str, creator: &str, hour: u32) -> ContentItem {
        let created = Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap();
        ContentItem::new(id, Category::Listen, id, creator, created)
    }

    async fn setup(backend: MemoryBackend) -> (Arc<MemoryBackend>, MutationCoordinator) {
        let backend = Arc::new(backend);
        let store = Arc::new(ContentStore::new(Category::Listen, backend.clone()));
        store.fetch(Some(&ViewerId::from("me"))).await.unwrap();
        (backend.clone(), MutationCoordinator::new(store, backend))
    }

    #[tokio::test]
    async fn anonymous_toggle_is_refused_without_side_effects() {
        let (backend, coordinator) = setup(MemoryBackend::new().with_content([item("a", "Jo", 1)])).await;
        let before = coordinator.store().snapshot();

        let err = coordinator.toggle_like(None, "a").await.unwrap_err();
        assert_eq!(err, MutationError::Unauthenticated);
        let err = coordinator.toggle_follow(None, "Jo").await.unwrap_err();
        assert_eq!(err, MutationError::Unauthenticated);

        assert_eq!(coordinator.store().snapshot(), before);
        assert_eq!(backend.writes(), 0);
    }

    #[tokio::test]
    async fn like_then_unlike_returns_to_start() {
        let backend = MemoryBackend::new()
            .with_content([item("a", "Jo", 1)])
            .with_likes([LikeEdge::new(ViewerId::from("u2"), "a")]);
        let (backend, coordinator) = setup(backend).await;
        let me = ViewerId::from("me");
        let original = coordinator.store().item("a").unwrap();

        let liked = coordinator.toggle_like(Some(&me), "a").await.unwrap();
        assert!(liked.now_active);
        assert_eq!(liked.like_count, Some(2));
        assert_eq!(backend.likes().len(), 2);

        let unliked = coordinator.toggle_like(Some(&me), "a").await.unwrap();
        assert!(!unliked.now_active);
        assert_eq!(coordinator.store().item("a").unwrap(), original);
        assert_eq!(backend.likes().len(), 1);
    }

    #[tokio::test]
    async fn unlike_never_goes_below_zero() {
        let (_backend, coordinator) = setup(MemoryBackend::new().with_content([item("a", "Jo", 1)])).await;
        coordinator
            .store()
            .apply_patch(|i| i.id() == "a", |i| i.liked_by_viewer = true);

        let outcome = coordinator
            .toggle_like(Some(&ViewerId::from("me")), "a")
            .await
            .unwrap();
        assert_eq!(outcome.like_count, Some(0));
    }

    #[tokio::test]
    async fn failed_like_restores_the_snapshot() {
        let backend = MemoryBackend::new()
            .with_content([item("a", "Jo", 1), item("b", "Al", 2)])
            .with_likes([LikeEdge::new(ViewerId::from("u2"), "a")]);
        let (backend, coordinator) = setup(backend).await;
        let before = coordinator.store().snapshot();

        backend.fail_writes(true);
        let err = coordinator
            .toggle_like(Some(&ViewerId::from("me")), "a")
            .await
            .unwrap_err();
        assert!(matches!(err, MutationError::Failed { .. }));
        assert!(err.is_retryable());
        assert_eq!(coordinator.store().snapshot(), before);
    }

    #[tokio::test]
    async fn optimistic_count_is_visible_before_the_write_lands() {
        let backend = MemoryBackend::new()
            .with_content([item("a", "Jo", 1)])
            .with_likes([
                LikeEdge::new(ViewerId::from("u2"), "a"),
                LikeEdge::new(ViewerId::from("u3"), "a"),
            ]);
        let (backend, coordinator) = setup(backend).await;
        let coordinator = Arc::new(coordinator);
        let mut state = coordinator.store().subscribe_state();
        assert_eq!(coordinator.store().item("a").unwrap().like_count, 2);

        backend.pause_writes();
        backend.fail_writes(true);
        let task = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .toggle_like(Some(&ViewerId::from("me")), "a")
                    .await
            })
        };

        state
            .wait_for(|s| s.items.iter().any(|i| i.id() == "a" && i.like_count == 3))
            .await
            .unwrap();
        assert!(coordinator.store().item("a").unwrap().liked_by_viewer);

        backend.resume_writes();
        assert!(task.await.unwrap().is_err());
        let reverted = coordinator.store().item("a").unwrap();
        assert_eq!(reverted.like_count, 2);
        assert!(!reverted.liked_by_viewer);
    }

    #[tokio::test]
    async fn follow_patches_every_item_of_the_creator() {
        let backend = MemoryBackend::new().with_content([
            item("a", "Jo", 1),
            item("b", "Al", 2),
            item("c", "Jo", 3),
        ]);
        let (backend, coordinator) = setup(backend).await;
        let me = ViewerId::from("me");

        let outcome = coordinator.toggle_follow(Some(&me), "Jo").await.unwrap();
        assert!(outcome.now_active);
        assert_eq!(outcome.items_patched, 2);
        let items = coordinator.store().items();
        assert!(items.iter().filter(|i| i.creator_name() == "Jo").all(|i| i.followed_by_viewer));
        assert!(!coordinator.store().item("b").unwrap().followed_by_viewer);
        assert_eq!(backend.follows(), vec![FollowEdge::new(me.clone(), "Jo")]);

        let outcome = coordinator.toggle_follow(Some(&me), "Jo").await.unwrap();
        assert!(!outcome.now_active);
        assert!(backend.follows().is_empty());
    }

    #[tokio::test]
    async fn failed_follow_rolls_back_all_creator_items() {
        let backend = MemoryBackend::new().with_content([item("a", "Jo", 1), item("c", "Jo", 3)]);
        let (backend, coordinator) = setup(backend).await;
        let before = coordinator.store().snapshot();

        backend.fail_writes(true);
        let err = coordinator
            .toggle_follow(Some(&ViewerId::from("me")), "Jo")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            MutationError::Failed {
                target: MutationTarget::Follow { creator_name: "Jo".into() },
                source: crate::error::BackendError::Network("simulated write failure".into()),
            }
        );
        assert_eq!(coordinator.store().snapshot(), before);
    }

    #[tokio::test]
    async fn unknown_targets_are_reported() {
        let (backend, coordinator) = setup(MemoryBackend::new().with_content([item("a", "Jo", 1)])).await;
        let me = ViewerId::from("me");
        assert!(matches!(
            coordinator.toggle_like(Some(&me), "nope").await,
            Err(MutationError::UnknownTarget(_))
        ));
        assert!(matches!(
            coordinator.toggle_follow(Some(&me), "Nobody").await,
            Err(MutationError::UnknownTarget(_))
        ));
        assert_eq!(backend.writes(), 0);
    }
}
