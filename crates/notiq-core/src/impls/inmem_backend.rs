//! InMemoryBackend - default, volatile backend.
//!
//! Composes [`EntryStore`] and [`PriorityIndex`]. Everything is lost when
//! the process exits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::entry_store::EntryStore;
use super::priority_index::PriorityIndex;
use crate::domain::{ItemId, Priority, QueueItem, StatusCounts};
use crate::error::BackendError;
use crate::ports::Backend;

#[derive(Default)]
pub struct InMemoryBackend {
    store: EntryStore,
    index: PriorityIndex,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of ids waiting in the index (ready or not).
    pub async fn indexed_len(&self) -> usize {
        self.index.len().await
    }
}

#[async_trait]
impl Backend for InMemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn create(&self, item: QueueItem) -> Result<ItemId, BackendError> {
        self.store.create(item).await
    }

    async fn get(&self, id: ItemId) -> Result<Option<QueueItem>, BackendError> {
        Ok(self.store.get(id).await)
    }

    async fn save(&self, item: &QueueItem) -> Result<(), BackendError> {
        self.store.save(item).await;
        Ok(())
    }

    async fn delete(&self, id: ItemId) -> Result<bool, BackendError> {
        Ok(self.store.delete(id).await)
    }

    async fn list_terminal_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<QueueItem>, BackendError> {
        Ok(self.store.list_terminal_older_than(cutoff).await)
    }

    async fn counts_by_status(&self) -> Result<StatusCounts, BackendError> {
        Ok(self.store.counts_by_status().await)
    }

    async fn enqueue(&self, id: ItemId, priority: Priority) -> Result<(), BackendError> {
        self.index.enqueue(&self.store, id, priority).await;
        Ok(())
    }

    async fn drain_ready(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ItemId>, BackendError> {
        Ok(self.index.drain_ready(&self.store, now, limit).await)
    }

    async fn release(&self, id: ItemId) -> Result<(), BackendError> {
        self.index.release(&self.store, id).await;
        Ok(())
    }

    async fn in_flight(&self) -> Result<Vec<ItemId>, BackendError> {
        Ok(self.index.in_flight().await)
    }

    async fn expire_pending_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<ItemId>, BackendError> {
        Ok(self.index.expire_before(&self.store, cutoff).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ItemStatus;
    use chrono::TimeZone;
    use ulid::Ulid;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap()
    }

    fn new_item(priority: Priority) -> QueueItem {
        QueueItem::new(
            ItemId::from_ulid(Ulid::new()),
            serde_json::json!({"msg": "hi"}),
            priority,
            2,
            t0(),
        )
    }

    #[tokio::test]
    async fn create_enqueue_drain_roundtrip_through_trait_object() {
        let backend: Box<dyn Backend> = Box::new(InMemoryBackend::new());
        let low = backend.create(new_item(Priority::Low)).await.unwrap();
        let urgent = backend.create(new_item(Priority::Urgent)).await.unwrap();
        backend.enqueue(low, Priority::Low).await.unwrap();
        backend.enqueue(urgent, Priority::Urgent).await.unwrap();

        let drained = backend.drain_ready(t0(), 10).await.unwrap();
        assert_eq!(drained, vec![urgent, low]);

        let mut in_flight = backend.in_flight().await.unwrap();
        in_flight.sort();
        let mut expected = vec![urgent, low];
        expected.sort();
        assert_eq!(in_flight, expected);
    }

    #[tokio::test]
    async fn counts_follow_saved_status() {
        let backend = InMemoryBackend::new();
        let mut a = new_item(Priority::Normal);
        let b = new_item(Priority::Normal);
        backend.create(a.clone()).await.unwrap();
        backend.create(b).await.unwrap();

        a.start_attempt();
        backend.save(&a).await.unwrap();

        let counts = backend.counts_by_status().await.unwrap();
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.processing, 1);
        assert_eq!(counts.unsettled(), 2);
    }

    #[tokio::test]
    async fn released_items_are_not_reindexed() {
        let backend = InMemoryBackend::new();
        let mut item = new_item(Priority::High);
        let id = backend.create(item.clone()).await.unwrap();
        backend.enqueue(id, Priority::High).await.unwrap();
        assert_eq!(backend.drain_ready(t0(), 1).await.unwrap(), vec![id]);

        item.start_attempt();
        item.mark_completed(t0());
        backend.save(&item).await.unwrap();
        backend.release(id).await.unwrap();

        assert!(backend.in_flight().await.unwrap().is_empty());
        assert_eq!(backend.indexed_len().await, 0);
        assert_eq!(
            backend.get(id).await.unwrap().unwrap().status,
            ItemStatus::Completed
        );
    }
}
