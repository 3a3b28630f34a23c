//! # Invalidation Listener
//!
//! Binds one push subscription to one content store. Every signal triggers a
//! full re-fetch of the store; the payload is never read. Signals that queue up
//! while a fetch runs are collapsed into the next fetch, and the Fetch Guard
//! inside the store turns any remaining overlap into a no-op.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::backend::Subscription;
use crate::core::content_store::{ContentStore, FetchOutcome};
use crate::model::ViewerId;

/// A running listener task. Dropping it tears the subscription down.
pub struct InvalidationListener {
    cancel: CancellationToken,
    handle: Option<JoinHandle<usize>>,
}

impl InvalidationListener {
    /// Spawns the listener on the current runtime.
    ///
    /// The subscription moves into the task; its cancellation token becomes the
    /// listener's stop signal.
    pub fn spawn(
        store: Arc<ContentStore>,
        viewer: Option<ViewerId>,
        mut subscription: Subscription,
    ) -> Self {
        let cancel = subscription.cancellation_token();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let topic = subscription.topic().clone();
            log::info!("Listening for invalidations on {}", topic);
            let mut refetches = 0usize;

            loop {
                let signal = tokio::select! {
                    _ = token.cancelled() => break,
                    signal = subscription.recv() => signal,
                };
                let Some(signal) = signal else {
                    log::warn!("Push channel for {} closed by producer", topic);
                    break;
                };

                let coalesced = subscription.drain();
                log::debug!(
                    "Invalidation on {} ({:?}), {} more coalesced",
                    topic,
                    signal.table,
                    coalesced
                );

                match store.fetch(viewer.as_ref()).await {
                    Ok(FetchOutcome::Replaced(n)) => {
                        refetches += 1;
                        log::debug!("Refetched {} item(s) for {}", n, topic);
                    }
                    Ok(FetchOutcome::Skipped) => {
                        log::debug!("Refetch for {} skipped, one is already running", topic)
                    }
                    Ok(FetchOutcome::Discarded) => break,
                    // The store keeps the error in its state; keep listening.
                    Err(e) => log::warn!("Refetch for {} failed: {}", topic, e),
                }
            }

            subscription.close();
            log::info!("Stopped listening on {}", topic);
            refetches
        });

        Self {
            cancel,
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stops the listener and waits for it. Returns how many refetches replaced
    /// the store's collection.
    pub async fn shutdown(mut self) -> usize {
        self.stop().await
    }

    /// Same as `shutdown`, for owners that keep the handle around.
    pub async fn stop(&mut self) -> usize {
        self.cancel.cancel();
        match self.handle.take() {
            Some(handle) => handle.await.unwrap_or_else(|e| {
                log::error!("Invalidation listener task failed: {}", e);
                0
            }),
            None => 0,
        }
    }
}

impl Drop for InvalidationListener {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
