//! # Content Store
//!
//! Owns the enriched item collection of one category. The collection changes in
//! exactly two ways:
//!
//! 1.  **Wholesale replace** by a completed fetch. There is no merge: whatever the
//!     Edge Enrichment Engine produced becomes the collection, discarding any
//!     unconfirmed optimistic patch it overlaps.
//! 2.  **Patch / restore** by the mutation coordinator (`apply_patch`, `restore`).
//!
//! State lives inside a `tokio::sync::watch` channel, so every change is visible
//! to observers (`subscribe_state`) and mutations are short critical sections
//! that are never held across an `.await`.
//!
//! ## Fetch cycle
//! - The Fetch Guard turns overlapping calls into `FetchOutcome::Skipped`.
//! - The content list is read first; the like-edge read (scoped to the listed
//!   ids) and the viewer's follow-edge read then run concurrently. Neither is
//!   issued when it cannot contribute (no items, no viewer).
//! - A failure keeps the previous items and records the error.
//! - A store dismounted while its fetch was in flight discards the result
//!   (`FetchOutcome::Discarded`); the network call itself is not cancelled.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

use crate::backend::FeedBackend;
use crate::core::enrichment::enrich;
use crate::core::fetch_guard::FetchGuard;
use crate::error::{BackendResult, FetchError};
use crate::model::{Category, EnrichedContentItem, ViewerId};

/// Observable state of a store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreSnapshot {
    pub category: Category,
    pub items: Vec<EnrichedContentItem>,
    pub loading: bool,
    pub error: Option<FetchError>,
}

/// How a `fetch` call ended, when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The collection was replaced with this many items.
    Replaced(usize),
    /// Another fetch was in flight; nothing was read.
    Skipped,
    /// The store was dismounted before the result landed; nothing was applied.
    Discarded,
}

/// Items affected by a patch, before and after it was applied.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedPatch {
    pub before: Vec<EnrichedContentItem>,
    pub after: Vec<EnrichedContentItem>,
}

/// The item collection of one category.
pub struct ContentStore {
    category: Category,
    backend: Arc<dyn FeedBackend>,
    guard: FetchGuard,
    alive: AtomicBool,
    state: watch::Sender<StoreSnapshot>,
}

impl ContentStore {
    pub fn new(category: Category, backend: Arc<dyn FeedBackend>) -> Self {
        let (state, _) = watch::channel(StoreSnapshot {
            category,
            items: Vec::new(),
            loading: false,
            error: None,
        });
        Self {
            category,
            backend,
            guard: FetchGuard::new(),
            alive: AtomicBool::new(true),
            state,
        }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    /// Runs one fetch cycle for `viewer` and replaces the collection on success.
    pub async fn fetch(&self, viewer: Option<&ViewerId>) -> Result<FetchOutcome, FetchError> {
        let Some(_permit) = self.guard.try_acquire() else {
            log::debug!("Fetch of {} skipped: another fetch is in flight", self.category);
            return Ok(FetchOutcome::Skipped);
        };
        if !self.is_alive() {
            return Ok(FetchOutcome::Discarded);
        }

        log::debug!("Fetching {} feed", self.category);
        self.state.send_if_modified(|s| !std::mem::replace(&mut s.loading, true));
        let _loading = LoadingReset(self);

        let result = self.read_cycle(viewer).await;

        if !self.is_alive() {
            log::debug!("Discarding {} fetch result: store was dismounted", self.category);
            return Ok(FetchOutcome::Discarded);
        }

        match result {
            Ok(items) => {
                let count = items.len();
                self.state.send_modify(|s| {
                    s.items = items;
                    s.loading = false;
                    s.error = None;
                });
                log::info!("Fetched {} feed: {} items", self.category, count);
                Ok(FetchOutcome::Replaced(count))
            }
            Err(source) => {
                let err = FetchError {
                    category: self.category,
                    source,
                };
                log::warn!("{}", err);
                self.state.send_modify(|s| {
                    s.loading = false;
                    s.error = Some(err.clone());
                });
                Err(err)
            }
        }
    }

    async fn read_cycle(&self, viewer: Option<&ViewerId>) -> BackendResult<Vec<EnrichedContentItem>> {
        let content = self.backend.list_content(self.category).await?;
        let ids: Vec<String> = content.iter().map(|c| c.id.clone()).collect();

        let likes = async {
            if ids.is_empty() {
                Ok(Vec::new())
            } else {
                self.backend.list_like_edges(&ids).await
            }
        };
        let follows = async {
            match viewer {
                Some(v) => self.backend.list_follow_edges(v).await,
                None => Ok(Vec::new()),
            }
        };
        let (likes, follows) = tokio::try_join!(likes, follows)?;

        Ok(enrich(content, &likes, &follows, viewer))
    }

    /// Current state.
    pub fn snapshot(&self) -> StoreSnapshot {
        self.state.borrow().clone()
    }

    pub fn items(&self) -> Vec<EnrichedContentItem> {
        self.state.borrow().items.clone()
    }

    pub fn item(&self, id: &str) -> Option<EnrichedContentItem> {
        self.state.borrow().items.iter().find(|i| i.id() == id).cloned()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().loading
    }

    pub fn error(&self) -> Option<FetchError> {
        self.state.borrow().error.clone()
    }

    /// A receiver notified after every state change.
    pub fn subscribe_state(&self) -> watch::Receiver<StoreSnapshot> {
        self.state.subscribe()
    }

    pub fn is_fetching(&self) -> bool {
        self.guard.is_in_flight()
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Marks the store as no longer observed. Results of in-flight fetches are
    /// discarded from now on.
    pub fn dismount(&self) {
        if self.alive.swap(false, Ordering::AcqRel) {
            log::debug!("Content store for {} dismounted", self.category);
        }
    }

    /// Applies `change` to every item matching `select`, in one critical section.
    ///
    /// Returns the matching items as they were before and after the change, or
    /// `None` (and changes nothing) when no item matches.
    pub fn apply_patch<S, C>(&self, select: S, mut change: C) -> Option<AppliedPatch>
    where
        S: Fn(&EnrichedContentItem) -> bool,
        C: FnMut(&mut EnrichedContentItem),
    {
        let mut applied = None;
        self.state.send_if_modified(|s| {
            let mut before = Vec::new();
            let mut after = Vec::new();
            for item in s.items.iter_mut().filter(|i| select(i)) {
                before.push(item.clone());
                change(item);
                after.push(item.clone());
            }
            if before.is_empty() {
                return false;
            }
            applied = Some(AppliedPatch { before, after });
            true
        });
        applied
    }

    /// Writes `snapshot` items back over the items currently holding their ids.
    ///
    /// Items not in `snapshot`, and snapshot items whose id is gone from the
    /// collection, are left as they are. Returns how many items were restored.
    pub fn restore(&self, snapshot: &[EnrichedContentItem]) -> usize {
        let mut restored = 0;
        self.state.send_if_modified(|s| {
            for saved in snapshot {
                if let Some(current) = s.items.iter_mut().find(|i| i.id() == saved.id()) {
                    *current = saved.clone();
                    restored += 1;
                }
            }
            restored > 0
        });
        restored
    }
}

/// Clears `loading` if a fetch exits without reaching its result handling,
/// e.g. when the fetch future is dropped mid-flight.
struct LoadingReset<'a>(&'a ContentStore);

impl Drop for LoadingReset<'_> {
    fn drop(&mut self) {
        self.0
            .state
            .send_if_modified(|s| std::mem::replace(&mut s.loading, false));
    }
}
