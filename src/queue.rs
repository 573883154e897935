//! In-memory work queue of candidate submissions.
//!
//! Items are keyed by id and kept in insertion order. The queue is shared
//! between the ingestion task and the processing tick through
//! [`SharedQueue`], whose lock is never held across an `.await`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::collab::SubmissionSource;

/// One candidate submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueItem {
    /// Short id, unique within the queue
    pub id: String,
    /// Type-prefixed id (`t3_...`) used to act on the submission
    pub fullname: String,
    /// Seconds since the epoch
    pub created_utc: i64,
    pub view_count: u64,
    pub url: String,
    pub permalink: String,
}

impl QueueItem {
    /// Age in seconds at `now` (seconds since the epoch).
    #[must_use]
    pub fn age_at(&self, now: i64) -> i64 {
        now - self.created_utc
    }
}

/// Insertion-ordered, id-keyed queue.
#[derive(Debug, Default)]
pub struct WorkQueue {
    order: Vec<String>,
    items: HashMap<String, QueueItem>,
}

impl WorkQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an item. Returns `false` (and keeps the queued copy) if an item
    /// with the same id is already present.
    pub fn add(&mut self, item: QueueItem) -> bool {
        if self.items.contains_key(&item.id) {
            return false;
        }
        self.order.push(item.id.clone());
        self.items.insert(item.id.clone(), item);
        true
    }

    /// Remove by id. No-op if absent.
    pub fn remove(&mut self, id: &str) -> Option<QueueItem> {
        let item = self.items.remove(id)?;
        self.order.retain(|queued| queued != id);
        Some(item)
    }

    /// Drop every item with `now - created_utc > age_limit` and return them
    /// in queue order.
    pub fn clear_expired(&mut self, now: i64, age_limit: i64) -> Vec<QueueItem> {
        let mut expired = Vec::new();
        let items = &mut self.items;
        self.order.retain(|id| {
            let is_expired = items.get(id).is_some_and(|item| item.age_at(now) > age_limit);
            if is_expired {
                if let Some(item) = items.remove(id) {
                    expired.push(item);
                }
            }
            !is_expired
        });
        expired
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&QueueItem> {
        self.items.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut QueueItem> {
        self.items.get_mut(id)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.items.contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Ids in insertion order.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Items in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &QueueItem> {
        self.order.iter().filter_map(|id| self.items.get(id))
    }
}

/// Result of a [`SharedQueue::refresh_all`] batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    /// Ids that were queued when the batch started, in queue order
    pub ids: Vec<String>,
    pub refreshed: usize,
    pub failed: usize,
}

/// Cloneable handle to the process-wide queue.
#[derive(Debug, Clone, Default)]
pub struct SharedQueue {
    inner: Arc<Mutex<WorkQueue>>,
}

impl SharedQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, WorkQueue> {
        // Every mutation is a single call that cannot panic halfway.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add(&self, item: QueueItem) -> bool {
        self.lock().add(item)
    }

    pub fn remove(&self, id: &str) -> Option<QueueItem> {
        self.lock().remove(id)
    }

    pub fn clear_expired(&self, now: i64, age_limit: i64) -> Vec<QueueItem> {
        self.lock().clear_expired(now, age_limit)
    }

    /// Clone of the queued item, if still present.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<QueueItem> {
        self.lock().get(id).cloned()
    }

    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.lock().ids()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Re-read live metadata of every item queued right now.
    ///
    /// All refreshes run concurrently; one failing or timing out leaves that
    /// item's metadata stale and does not affect the others. Items added while
    /// the batch runs are not part of it.
    pub async fn refresh_all(
        &self,
        source: &dyn SubmissionSource,
        timeout: Duration,
    ) -> RefreshSummary {
        let snapshot: Vec<QueueItem> = {
            let queue = self.lock();
            queue.iter().cloned().collect()
        };

        let results = join_all(snapshot.iter().map(|item| async move {
            tokio::time::timeout(timeout, source.refresh(item)).await
        }))
        .await;

        let mut summary = RefreshSummary {
            ids: Vec::with_capacity(snapshot.len()),
            ..RefreshSummary::default()
        };

        let mut queue = self.lock();
        for (item, result) in snapshot.into_iter().zip(results) {
            match result {
                Ok(Ok(meta)) => {
                    // Removed while refreshing: nothing to update.
                    if let Some(queued) = queue.get_mut(&item.id) {
                        queued.view_count = meta.view_count;
                    }
                    summary.refreshed += 1;
                }
                Ok(Err(e)) => {
                    warn!(item = %item.id, "Refresh failed: {e}");
                    summary.failed += 1;
                }
                Err(_) => {
                    warn!(item = %item.id, "Refresh timed out after {timeout:?}");
                    summary.failed += 1;
                }
            }
            summary.ids.push(item.id);
        }

        debug!(
            refreshed = summary.refreshed,
            failed = summary.failed,
            "Queue refresh settled"
        );
        summary
    }
}
