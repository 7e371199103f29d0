//! EntryStore - in-memory canonical records.
//!
//! Each record sits in its own slot with its own lock, so writes to one item
//! never wait on writes to another. The map lock is only held long enough to
//! find or insert a slot.

use std::collections::HashMap;
use std::collections::hash_map::Entry as MapEntry;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};

use crate::domain::{ItemId, QueueItem, StatusCounts};
use crate::error::BackendError;

/// One slot of the store.
///
/// `claimed` is the per-item dispatch guard: it flips false -> true exactly
/// once per drain, and back only when the attempt hands the item back or
/// finishes.
pub(crate) struct Slot {
    claimed: AtomicBool,
    pub(crate) record: Mutex<QueueItem>,
}

impl Slot {
    fn new(item: QueueItem) -> Self {
        Self {
            claimed: AtomicBool::new(false),
            record: Mutex::new(item),
        }
    }

    /// CAS false -> true. Returns false if someone else holds the claim.
    pub(crate) fn try_claim(&self) -> bool {
        self.claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn unclaim(&self) {
        self.claimed.store(false, Ordering::Release);
    }

    pub(crate) fn is_claimed(&self) -> bool {
        self.claimed.load(Ordering::Acquire)
    }
}

#[derive(Default)]
pub struct EntryStore {
    slots: RwLock<HashMap<ItemId, Arc<Slot>>>,
}

impl EntryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new record. Fails if the id already exists.
    pub async fn create(&self, item: QueueItem) -> Result<ItemId, BackendError> {
        let id = item.id;
        let mut slots = self.slots.write().await;
        match slots.entry(id) {
            MapEntry::Occupied(_) => Err(BackendError::Duplicate(id)),
            MapEntry::Vacant(vacant) => {
                vacant.insert(Arc::new(Slot::new(item)));
                Ok(id)
            }
        }
    }

    pub async fn get(&self, id: ItemId) -> Option<QueueItem> {
        let slot = self.slot(id).await?;
        let record = slot.record.lock().await;
        Some(record.clone())
    }

    /// Last-write-wins upsert of the full record.
    pub async fn save(&self, item: &QueueItem) {
        let slot = {
            let mut slots = self.slots.write().await;
            match slots.entry(item.id) {
                MapEntry::Occupied(occupied) => Arc::clone(occupied.get()),
                MapEntry::Vacant(vacant) => {
                    vacant.insert(Arc::new(Slot::new(item.clone())));
                    return;
                }
            }
        };
        *slot.record.lock().await = item.clone();
    }

    pub async fn delete(&self, id: ItemId) -> bool {
        self.slots.write().await.remove(&id).is_some()
    }

    /// Terminal records created strictly before `cutoff`.
    pub async fn list_terminal_older_than(&self, cutoff: DateTime<Utc>) -> Vec<QueueItem> {
        let mut out = Vec::new();
        for slot in self.snapshot().await {
            let record = slot.record.lock().await;
            if record.status.is_terminal() && record.created_at < cutoff {
                out.push(record.clone());
            }
        }
        out
    }

    pub async fn counts_by_status(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for slot in self.snapshot().await {
            counts.add(slot.record.lock().await.status);
        }
        counts
    }

    pub async fn len(&self) -> usize {
        self.slots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub(crate) async fn slot(&self, id: ItemId) -> Option<Arc<Slot>> {
        self.slots.read().await.get(&id).cloned()
    }

    async fn snapshot(&self) -> Vec<Arc<Slot>> {
        self.slots.read().await.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ItemStatus, Priority};
    use chrono::{TimeDelta, TimeZone};
    use ulid::Ulid;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap()
    }

    fn item_at(created_at: DateTime<Utc>) -> QueueItem {
        QueueItem::new(
            ItemId::from_ulid(Ulid::new()),
            serde_json::json!({}),
            Priority::Normal,
            3,
            created_at,
        )
    }

    #[tokio::test]
    async fn create_rejects_duplicate_ids() {
        let store = EntryStore::new();
        let item = item_at(t0());
        store.create(item.clone()).await.unwrap();
        let err = store.create(item.clone()).await.unwrap_err();
        assert!(matches!(err, BackendError::Duplicate(id) if id == item.id));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn save_replaces_the_whole_record() {
        let store = EntryStore::new();
        let mut item = item_at(t0());
        store.create(item.clone()).await.unwrap();

        item.start_attempt();
        item.mark_failed("nope".into());
        store.save(&item).await;

        let stored = store.get(item.id).await.unwrap();
        assert_eq!(stored, item);
    }

    #[tokio::test]
    async fn save_inserts_unknown_ids() {
        let store = EntryStore::new();
        let item = item_at(t0());
        store.save(&item).await;
        assert_eq!(store.get(item.id).await, Some(item));
    }

    #[tokio::test]
    async fn delete_reports_whether_anything_was_removed() {
        let store = EntryStore::new();
        let item = item_at(t0());
        store.create(item.clone()).await.unwrap();
        assert!(store.delete(item.id).await);
        assert!(!store.delete(item.id).await);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn terminal_listing_uses_strict_cutoff() {
        let store = EntryStore::new();
        let cutoff = t0();

        let mut at_cutoff = item_at(cutoff);
        at_cutoff.mark_completed(cutoff);
        let mut older = item_at(cutoff - TimeDelta::days(1));
        older.mark_failed("x".into());
        let pending_old = item_at(cutoff - TimeDelta::days(3));

        for it in [&at_cutoff, &older, &pending_old] {
            store.create(it.clone()).await.unwrap();
        }

        let listed = store.list_terminal_older_than(cutoff).await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, older.id);
        assert_eq!(listed[0].status, ItemStatus::Failed);
    }

    #[test]
    fn claim_is_exclusive() {
        let slot = Slot::new(item_at(t0()));
        assert!(slot.try_claim());
        assert!(!slot.try_claim());
        slot.unclaim();
        assert!(slot.try_claim());
    }
}
