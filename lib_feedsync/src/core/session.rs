//! # Feed Session
//!
//! Keeps exactly one content store per active category, together with the push
//! subscription and mutation coordinator bound to it. Switching category or
//! viewer is a full replacement: the previous listener is torn down, the previous
//! store is dismounted (so a fetch still in flight for it is discarded), and a
//! fresh store and subscription are opened.

use std::sync::Arc;

use tokio::sync::watch;

use crate::backend::{ChannelTopic, FeedBackend, PushChannel};
use crate::core::content_store::{ContentStore, FetchOutcome, StoreSnapshot};
use crate::core::coordinator::{MutationCoordinator, MutationOutcome};
use crate::core::invalidation::InvalidationListener;
use crate::error::{BackendResult, FetchError, MutationError};
use crate::model::{Category, ViewerId};

/// Store, coordinator and listener of the active category.
struct ActiveView {
    store: Arc<ContentStore>,
    coordinator: MutationCoordinator,
    listener: InvalidationListener,
}

impl ActiveView {
    async fn mount(
        category: Category,
        viewer: Option<&ViewerId>,
        backend: &Arc<dyn FeedBackend>,
        channel: &Arc<dyn PushChannel>,
    ) -> BackendResult<Self> {
        let store = Arc::new(ContentStore::new(category, backend.clone()));
        let subscription = channel.subscribe(ChannelTopic::engagement(category)).await?;
        // Listen before the first read so changes landing during it are not lost.
        let listener = InvalidationListener::spawn(store.clone(), viewer.cloned(), subscription);
        let coordinator = MutationCoordinator::new(store.clone(), backend.clone());

        // A failed first fetch is recorded in the store's state.
        let _ = store.fetch(viewer).await;

        Ok(Self {
            store,
            coordinator,
            listener,
        })
    }

    async fn unmount(&mut self) {
        self.store.dismount();
        self.listener.stop().await;
    }
}

impl Drop for ActiveView {
    fn drop(&mut self) {
        self.store.dismount();
    }
}

/// The engagement-synchronized feed of one category for one viewer.
pub struct FeedSession {
    backend: Arc<dyn FeedBackend>,
    channel: Arc<dyn PushChannel>,
    viewer: Option<ViewerId>,
    view: ActiveView,
}

impl FeedSession {
    /// Opens `category` for `viewer` and runs the initial fetch.
    ///
    /// Only a failed subscription fails the call; a failed initial fetch shows up
    /// as the store's `error`.
    pub async fn open(
        category: Category,
        viewer: Option<ViewerId>,
        backend: Arc<dyn FeedBackend>,
        channel: Arc<dyn PushChannel>,
    ) -> BackendResult<Self> {
        let view = ActiveView::mount(category, viewer.as_ref(), &backend, &channel).await?;
        log::info!(
            "Opened {} feed for {}",
            category,
            viewer.as_ref().map_or("anonymous viewer", |v| v.as_str())
        );
        Ok(Self {
            backend,
            channel,
            viewer,
            view,
        })
    }

    pub fn category(&self) -> Category {
        self.view.store.category()
    }

    pub fn viewer(&self) -> Option<&ViewerId> {
        self.viewer.as_ref()
    }

    pub fn store(&self) -> &Arc<ContentStore> {
        &self.view.store
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.view.store.snapshot()
    }

    /// State channel of the current store. A category or viewer change replaces
    /// the store, so observers re-subscribe after calling either.
    pub fn subscribe_state(&self) -> watch::Receiver<StoreSnapshot> {
        self.view.store.subscribe_state()
    }

    /// Whether the session holds a mounted store. False only after a category or
    /// viewer change failed to open its subscription; the next change retries.
    pub fn is_mounted(&self) -> bool {
        self.view.store.is_alive()
    }

    /// Makes `category` the active one. A no-op when it already is.
    pub async fn switch_category(&mut self, category: Category) -> BackendResult<()> {
        if category == self.category() && self.is_mounted() {
            return Ok(());
        }
        log::info!("Switching feed {} -> {}", self.category(), category);
        let viewer = self.viewer.clone();
        self.remount(category, viewer).await
    }

    /// Changes the viewer, reopening the current category under the new identity.
    pub async fn set_viewer(&mut self, viewer: Option<ViewerId>) -> BackendResult<()> {
        if viewer == self.viewer && self.is_mounted() {
            return Ok(());
        }
        self.remount(self.category(), viewer).await
    }

    /// Replaces the active view. Category and viewer are committed only once the
    /// new view is mounted; on failure the old view stays dismounted.
    async fn remount(&mut self, category: Category, viewer: Option<ViewerId>) -> BackendResult<()> {
        self.view.unmount().await;
        let view = ActiveView::mount(category, viewer.as_ref(), &self.backend, &self.channel)
            .await
            .inspect_err(|e| log::warn!("Failed to reopen {} feed: {}", category, e))?;
        self.view = view;
        self.viewer = viewer;
        Ok(())
    }

    /// Re-fetches the active category on demand.
    pub async fn refresh(&self) -> Result<FetchOutcome, FetchError> {
        self.view.store.fetch(self.viewer.as_ref()).await
    }

    pub async fn toggle_like(&self, item_id: &str) -> Result<MutationOutcome, MutationError> {
        self.view
            .coordinator
            .toggle_like(self.viewer.as_ref(), item_id)
            .await
    }

    pub async fn toggle_follow(&self, creator_name: &str) -> Result<MutationOutcome, MutationError> {
        self.view
            .coordinator
            .toggle_follow(self.viewer.as_ref(), creator_name)
            .await
    }

    /// Tears the subscription down and dismounts the store, waiting for the
    /// listener to exit. Dropping the session does the same without waiting.
    pub async fn close(mut self) {
        self.view.unmount().await;
        log::info!("Closed {} feed", self.category());
    }
}
