//! # Backend Boundary
//!
//! Everything the core needs from the outside world, expressed as two traits:
//!
//! - **`FeedBackend`**: reads of content rows and edge rows, and the durable
//!   insert/delete of like and follow edges.
//! - **`PushChannel`**: a subscribe interface per (tables, category) that yields a
//!   lifecycle-bound `Subscription` delivering `Invalidation` signals.
//!
//! ## Implementations
//! - **`memory`**: an in-process backend holding rows in memory, with failure
//!   injection and read/write gates. Used by tests and local tooling.
//! - **`rest`** (feature `rest`): PostgREST tables over HTTP.
//! - **`realtime`** (feature `realtime`): Phoenix-protocol websocket channel
//!   reporting row changes on the edge tables.

use async_trait::async_trait;
use std::fmt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::BackendResult;
use crate::model::{Category, ContentItem, FollowEdge, LikeEdge, ViewerId};

/// In-memory backend and push channel.
pub mod memory;
/// Websocket push channel speaking the Phoenix realtime protocol.
#[cfg(feature = "realtime")]
pub mod realtime;
/// PostgREST backend over HTTP.
#[cfg(feature = "rest")]
pub mod rest;

pub use memory::MemoryBackend;
#[cfg(feature = "realtime")]
pub use realtime::{RealtimeChannel, RealtimeConfig};
#[cfg(feature = "rest")]
pub use rest::{RestBackend, RestConfig};

/// Read and write access to content and engagement edges.
#[async_trait]
pub trait FeedBackend: Send + Sync {
    /// Content rows of one category, newest first.
    async fn list_content(&self, category: Category) -> BackendResult<Vec<ContentItem>>;

    /// Every like edge referencing one of `item_ids`, regardless of viewer.
    async fn list_like_edges(&self, item_ids: &[String]) -> BackendResult<Vec<LikeEdge>>;

    /// The follow edges of one viewer.
    async fn list_follow_edges(&self, viewer: &ViewerId) -> BackendResult<Vec<FollowEdge>>;

    async fn insert_like(&self, edge: &LikeEdge) -> BackendResult<()>;

    async fn delete_like(&self, edge: &LikeEdge) -> BackendResult<()>;

    async fn insert_follow(&self, edge: &FollowEdge) -> BackendResult<()>;

    async fn delete_follow(&self, edge: &FollowEdge) -> BackendResult<()>;
}

/// Subscribe side of the push-invalidation contract.
#[async_trait]
pub trait PushChannel: Send + Sync {
    /// Opens a subscription for row changes on `topic`'s tables.
    async fn subscribe(&self, topic: ChannelTopic) -> BackendResult<Subscription>;
}

/// Edge tables whose changes invalidate an enriched view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeTable {
    Likes,
    Follows,
}

impl EdgeTable {
    pub fn table_name(&self) -> &'static str {
        match self {
            EdgeTable::Likes => "likes",
            EdgeTable::Follows => "follows",
        }
    }

    pub fn from_table_name(name: &str) -> Option<Self> {
        match name {
            "likes" => Some(EdgeTable::Likes),
            "follows" => Some(EdgeTable::Follows),
            _ => None,
        }
    }
}

/// What a subscription listens to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelTopic {
    pub category: Category,
    pub tables: Vec<EdgeTable>,
}

impl ChannelTopic {
    /// Like and follow changes, scoped to `category`.
    pub fn engagement(category: Category) -> Self {
        Self {
            category,
            tables: vec![EdgeTable::Likes, EdgeTable::Follows],
        }
    }

    /// Channel name on the wire, e.g. `realtime:engagement-stream`.
    pub fn name(&self) -> String {
        format!("realtime:engagement-{}", self.category)
    }

    pub fn covers(&self, table: EdgeTable) -> bool {
        self.tables.contains(&table)
    }
}

impl fmt::Display for ChannelTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// "The previously fetched state may be stale." Carries no delta.
///
/// `table` names the table that changed when the channel knows it; `None` means
/// the channel lost events (e.g. after a reconnect) and asks for a resync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Invalidation {
    pub table: Option<EdgeTable>,
}

/// Capacity of a subscription's signal queue. Signals are idempotent, so a full
/// queue drops the newest one.
pub const SIGNAL_BUFFER: usize = 16;

/// A live subscription, bound to the lifetime of its owner.
///
/// Dropping the handle (or calling `close`) cancels its token, which stops the
/// producing side; teardown never depends on the producer noticing a closed queue.
#[derive(Debug)]
pub struct Subscription {
    topic: ChannelTopic,
    signals: mpsc::Receiver<Invalidation>,
    cancel: CancellationToken,
}

impl Subscription {
    /// Wires a handle to the producing side, which keeps the sender and a clone of `cancel`.
    pub fn new(
        topic: ChannelTopic,
        signals: mpsc::Receiver<Invalidation>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            topic,
            signals,
            cancel,
        }
    }

    /// Creates a handle together with the sender its producer feeds.
    pub fn channel(topic: ChannelTopic) -> (Self, mpsc::Sender<Invalidation>, CancellationToken) {
        let (tx, rx) = mpsc::channel(SIGNAL_BUFFER);
        let cancel = CancellationToken::new();
        (Self::new(topic, rx, cancel.clone()), tx, cancel)
    }

    pub fn topic(&self) -> &ChannelTopic {
        &self.topic
    }

    /// Next signal; `None` once the producer is gone.
    pub async fn recv(&mut self) -> Option<Invalidation> {
        self.signals.recv().await
    }

    /// Discards queued signals and returns how many there were.
    pub fn drain(&mut self) -> usize {
        let mut drained = 0;
        while self.signals.try_recv().is_ok() {
            drained += 1;
        }
        drained
    }

    /// The token that tears this subscription down.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn close(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if !self.cancel.is_cancelled() {
            log::debug!("Tearing down subscription {}", self.topic);
        }
        self.cancel.cancel();
    }
}
