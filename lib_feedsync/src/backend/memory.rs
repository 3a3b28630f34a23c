//! # In-Memory Backend
//!
//! Holds content and edge rows in process and implements both `FeedBackend` and
//! `PushChannel`. Successful writes fan an invalidation out to every live
//! subscription covering the written table, the way the realtime service reports
//! row changes.
//!
//! Test hooks:
//! - `fail_reads` / `fail_writes` make the next operations return errors;
//! - `pause_content_reads` / `pause_writes` hold operations until resumed, so a
//!   caller can observe state while a fetch or a durable write is in flight;
//! - read and write counters expose how many backend round trips happened.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;

use crate::backend::{ChannelTopic, EdgeTable, FeedBackend, Invalidation, PushChannel, Subscription};
use crate::error::{BackendError, BackendResult};
use crate::model::{Category, ContentItem, FollowEdge, LikeEdge, ViewerId};

#[derive(Default)]
struct Rows {
    content: Vec<ContentItem>,
    likes: Vec<LikeEdge>,
    follows: Vec<FollowEdge>,
}

struct Subscriber {
    topic: ChannelTopic,
    sender: mpsc::Sender<Invalidation>,
    cancel: CancellationToken,
}

/// Read/write counters.
#[derive(Debug, Default)]
struct Counters {
    content_reads: AtomicUsize,
    like_reads: AtomicUsize,
    follow_reads: AtomicUsize,
    writes: AtomicUsize,
}

/// An in-process `FeedBackend` + `PushChannel`.
#[derive(Default)]
pub struct MemoryBackend {
    rows: Mutex<Rows>,
    subscribers: Mutex<Vec<Subscriber>>,
    counters: Counters,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    read_gate: Mutex<Option<Arc<Notify>>>,
    write_gate: Mutex<Option<Arc<Notify>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds content rows.
    pub fn with_content(self, items: impl IntoIterator<Item = ContentItem>) -> Self {
        lock(&self.rows).content.extend(items);
        self
    }

    /// Seeds like edges without notifying subscribers.
    pub fn with_likes(self, edges: impl IntoIterator<Item = LikeEdge>) -> Self {
        let mut rows = lock(&self.rows);
        for edge in edges {
            if !rows.likes.contains(&edge) {
                rows.likes.push(edge);
            }
        }
        drop(rows);
        self
    }

    /// Seeds follow edges without notifying subscribers.
    pub fn with_follows(self, edges: impl IntoIterator<Item = FollowEdge>) -> Self {
        let mut rows = lock(&self.rows);
        for edge in edges {
            if !rows.follows.contains(&edge) {
                rows.follows.push(edge);
            }
        }
        drop(rows);
        self
    }

    /// Adds or replaces a content row (matched by id).
    pub fn upsert_content(&self, item: ContentItem) {
        let mut rows = lock(&self.rows);
        match rows.content.iter_mut().find(|c| c.id == item.id) {
            Some(existing) => *existing = item,
            None => rows.content.push(item),
        }
    }

    /// Simulates another client's like/unlike: writes the edge and notifies.
    pub fn external_like(&self, edge: LikeEdge, liked: bool) {
        {
            let mut rows = lock(&self.rows);
            if liked {
                if !rows.likes.contains(&edge) {
                    rows.likes.push(edge);
                }
            } else {
                rows.likes.retain(|e| e != &edge);
            }
        }
        self.notify_change(EdgeTable::Likes);
    }

    pub fn likes(&self) -> Vec<LikeEdge> {
        lock(&self.rows).likes.clone()
    }

    pub fn follows(&self) -> Vec<FollowEdge> {
        lock(&self.rows).follows.clone()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Holds every `list_content` call until `resume_content_reads`.
    pub fn pause_content_reads(&self) {
        lock(&self.read_gate).get_or_insert_with(|| Arc::new(Notify::new()));
    }

    pub fn resume_content_reads(&self) {
        if let Some(gate) = lock(&self.read_gate).take() {
            gate.notify_waiters();
            gate.notify_one();
        }
    }

    /// Holds every write until `resume_writes`.
    pub fn pause_writes(&self) {
        lock(&self.write_gate).get_or_insert_with(|| Arc::new(Notify::new()));
    }

    pub fn resume_writes(&self) {
        if let Some(gate) = lock(&self.write_gate).take() {
            gate.notify_waiters();
            gate.notify_one();
        }
    }

    pub fn content_reads(&self) -> usize {
        self.counters.content_reads.load(Ordering::SeqCst)
    }

    pub fn like_reads(&self) -> usize {
        self.counters.like_reads.load(Ordering::SeqCst)
    }

    pub fn follow_reads(&self) -> usize {
        self.counters.follow_reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.counters.writes.load(Ordering::SeqCst)
    }

    /// Number of subscriptions that have not been torn down.
    pub fn live_subscriptions(&self) -> usize {
        let mut subs = lock(&self.subscribers);
        subs.retain(|s| !s.cancel.is_cancelled() && !s.sender.is_closed());
        subs.len()
    }

    /// Sends an invalidation to every live subscription covering `table`.
    ///
    /// Torn-down subscriptions are removed on the way. A full queue already holds
    /// a pending signal, so the new one is dropped.
    pub fn notify_change(&self, table: EdgeTable) {
        let mut subs = lock(&self.subscribers);
        subs.retain(|sub| {
            if sub.cancel.is_cancelled() {
                return false;
            }
            if !sub.topic.covers(table) {
                return true;
            }
            match sub.sender.try_send(Invalidation { table: Some(table) }) {
                Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => true,
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });
    }

    async fn wait_gate(gate: &Mutex<Option<Arc<Notify>>>) {
        let pending = lock(gate).clone();
        if let Some(notify) = pending {
            notify.notified().await;
        }
    }

    fn check_reads(&self) -> BackendResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(BackendError::Network("simulated read failure".to_string()));
        }
        Ok(())
    }

    async fn begin_write(&self) -> BackendResult<()> {
        Self::wait_gate(&self.write_gate).await;
        self.counters.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(BackendError::Network("simulated write failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl FeedBackend for MemoryBackend {
    async fn list_content(&self, category: Category) -> BackendResult<Vec<ContentItem>> {
        self.counters.content_reads.fetch_add(1, Ordering::SeqCst);
        Self::wait_gate(&self.read_gate).await;
        self.check_reads()?;

        let mut items: Vec<ContentItem> = lock(&self.rows)
            .content
            .iter()
            .filter(|c| c.category == category)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(items)
    }

    async fn list_like_edges(&self, item_ids: &[String]) -> BackendResult<Vec<LikeEdge>> {
        self.counters.like_reads.fetch_add(1, Ordering::SeqCst);
        self.check_reads()?;

        let wanted: HashSet<&str> = item_ids.iter().map(String::as_str).collect();
        Ok(lock(&self.rows)
            .likes
            .iter()
            .filter(|e| wanted.contains(e.item_id.as_str()))
            .cloned()
            .collect())
    }

    async fn list_follow_edges(&self, viewer: &ViewerId) -> BackendResult<Vec<FollowEdge>> {
        self.counters.follow_reads.fetch_add(1, Ordering::SeqCst);
        self.check_reads()?;

        Ok(lock(&self.rows)
            .follows
            .iter()
            .filter(|e| &e.follower_id == viewer)
            .cloned()
            .collect())
    }

    async fn insert_like(&self, edge: &LikeEdge) -> BackendResult<()> {
        self.begin_write().await?;
        {
            let mut rows = lock(&self.rows);
            if !rows.likes.contains(edge) {
                rows.likes.push(edge.clone());
            }
        }
        self.notify_change(EdgeTable::Likes);
        Ok(())
    }

    async fn delete_like(&self, edge: &LikeEdge) -> BackendResult<()> {
        self.begin_write().await?;
        lock(&self.rows).likes.retain(|e| e != edge);
        self.notify_change(EdgeTable::Likes);
        Ok(())
    }

    async fn insert_follow(&self, edge: &FollowEdge) -> BackendResult<()> {
        self.begin_write().await?;
        {
            let mut rows = lock(&self.rows);
            if !rows.follows.contains(edge) {
                rows.follows.push(edge.clone());
            }
        }
        self.notify_change(EdgeTable::Follows);
        Ok(())
    }

    async fn delete_follow(&self, edge: &FollowEdge) -> BackendResult<()> {
        self.begin_write().await?;
        lock(&self.rows).follows.retain(|e| e != edge);
        self.notify_change(EdgeTable::Follows);
        Ok(())
    }
}

#[async_trait]
impl PushChannel for MemoryBackend {
    async fn subscribe(&self, topic: ChannelTopic) -> BackendResult<Subscription> {
        let (subscription, sender, cancel) = Subscription::channel(topic.clone());
        log::debug!("Memory channel subscribed to {}", topic);
        lock(&self.subscribers).push(Subscriber {
            topic,
            sender,
            cancel,
        });
        Ok(subscription)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn item(id: &str, category: Category, hour: u32) -> ContentItem {
        let created = Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap();
        ContentItem::new(id, category, id, "Jo", created)
    }

    #[tokio::test]
    async fn lists_category_newest_first() {
        let backend = MemoryBackend::new().with_content([
            item("old", Category::Stream, 1),
            item("new", Category::Stream, 9),
            item("other", Category::Blog, 5),
        ]);
        let ids: Vec<String> = backend
            .list_content(Category::Stream)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec!["new", "old"]);
    }

    #[tokio::test]
    async fn like_edges_are_a_set() {
        let backend = MemoryBackend::new();
        let edge = LikeEdge::new(ViewerId::from("u1"), "a");
        backend.insert_like(&edge).await.unwrap();
        backend.insert_like(&edge).await.unwrap();
        assert_eq!(backend.likes().len(), 1);
        backend.delete_like(&edge).await.unwrap();
        assert!(backend.likes().is_empty());
        assert_eq!(backend.writes(), 3);
    }

    #[tokio::test]
    async fn writes_notify_covering_subscriptions_only() {
        let backend = MemoryBackend::new();
        let mut engagement = backend
            .subscribe(ChannelTopic::engagement(Category::Stream))
            .await
            .unwrap();
        let mut likes_only = backend
            .subscribe(ChannelTopic {
                category: Category::Stream,
                tables: vec![EdgeTable::Likes],
            })
            .await
            .unwrap();

        backend
            .insert_follow(&FollowEdge::new(ViewerId::from("u1"), "Jo"))
            .await
            .unwrap();

        assert_eq!(
            engagement.recv().await,
            Some(Invalidation { table: Some(EdgeTable::Follows) })
        );
        assert_eq!(likes_only.drain(), 0);
    }

    #[tokio::test]
    async fn dropped_subscriptions_are_pruned() {
        let backend = MemoryBackend::new();
        let sub = backend
            .subscribe(ChannelTopic::engagement(Category::Listen))
            .await
            .unwrap();
        assert_eq!(backend.live_subscriptions(), 1);
        drop(sub);
        assert_eq!(backend.live_subscriptions(), 0);
    }

    #[tokio::test]
    async fn failed_writes_leave_rows_alone() {
        let backend = MemoryBackend::new();
        backend.fail_writes(true);
        let result = backend
            .insert_like(&LikeEdge::new(ViewerId::from("u1"), "a"))
            .await;
        assert!(matches!(result, Err(BackendError::Network(_))));
        assert!(backend.likes().is_empty());
    }
}
