//! PriorityIndex - per-class FIFO lists of pending ids, plus the in-flight set.
//!
//! The index lock is held for the whole scan of `drain_ready`, so an
//! `enqueue` racing with a drain lands either before the scan (and may be
//! drained) or after it (and waits for the next tick). Lock order is always
//! index -> store map -> record; nothing takes them the other way round.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use super::entry_store::{EntryStore, Slot};
use crate::domain::{ItemId, ItemStatus, Priority};

#[derive(Default)]
struct IndexState {
    /// Indexed by `Priority::rank`.
    classes: [VecDeque<ItemId>; 4],
    in_flight: HashSet<ItemId>,
}

enum Verdict {
    Ready(Arc<Slot>),
    NotYet,
    Stale(&'static str),
}

#[derive(Default)]
pub struct PriorityIndex {
    state: Mutex<IndexState>,
}

impl PriorityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `id` to its class. An id currently in flight is handed back:
    /// its in-flight mark and claim are cleared in the same step.
    pub async fn enqueue(&self, store: &EntryStore, id: ItemId, priority: Priority) {
        let mut state = self.state.lock().await;
        if state.in_flight.remove(&id)
            && let Some(slot) = store.slot(id).await
        {
            slot.unclaim();
        }
        state.classes[priority.rank()].push_back(id);
    }

    /// Remove and claim up to `limit` ready ids, highest priority first,
    /// oldest first within a class.
    pub async fn drain_ready(
        &self,
        store: &EntryStore,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Vec<ItemId> {
        let mut guard = self.state.lock().await;
        let IndexState { classes, in_flight } = &mut *guard;
        let mut drained = Vec::new();

        for priority in Priority::ALL {
            if drained.len() >= limit {
                break;
            }
            let queue = &mut classes[priority.rank()];
            let mut kept = VecDeque::with_capacity(queue.len());

            while let Some(id) = queue.pop_front() {
                if drained.len() >= limit {
                    kept.push_back(id);
                    kept.extend(queue.drain(..));
                    break;
                }
                match verdict(store, in_flight, id, now).await {
                    Verdict::Ready(slot) => {
                        if slot.try_claim() {
                            in_flight.insert(id);
                            drained.push(id);
                        } else {
                            debug!(item_id = %id, "dropping index entry claimed elsewhere");
                        }
                    }
                    Verdict::NotYet => kept.push_back(id),
                    Verdict::Stale(reason) => {
                        debug!(item_id = %id, reason, "dropping stale index entry");
                    }
                }
            }
            *queue = kept;
        }

        drained
    }

    /// Clear the in-flight mark and claim of `id` without re-indexing it.
    pub async fn release(&self, store: &EntryStore, id: ItemId) {
        let mut state = self.state.lock().await;
        state.in_flight.remove(&id);
        if let Some(slot) = store.slot(id).await {
            slot.unclaim();
        }
    }

    pub async fn in_flight(&self) -> Vec<ItemId> {
        self.state.lock().await.in_flight.iter().copied().collect()
    }

    /// Expire indexed, unclaimed pending items created before `cutoff`.
    pub async fn expire_before(&self, store: &EntryStore, cutoff: DateTime<Utc>) -> Vec<ItemId> {
        let mut guard = self.state.lock().await;
        let IndexState { classes, in_flight } = &mut *guard;
        let mut expired = Vec::new();

        for queue in classes.iter_mut() {
            let mut kept = VecDeque::with_capacity(queue.len());
            while let Some(id) = queue.pop_front() {
                let Some(slot) = store.slot(id).await else {
                    continue;
                };
                if in_flight.contains(&id) || slot.is_claimed() {
                    kept.push_back(id);
                    continue;
                }
                let mut record = slot.record.lock().await;
                if record.status != ItemStatus::Pending {
                    continue;
                }
                if record.created_at < cutoff {
                    record.mark_expired();
                    expired.push(id);
                } else {
                    kept.push_back(id);
                }
            }
            *queue = kept;
        }

        expired
    }

    /// Number of indexed ids (including not-yet-ready ones).
    pub async fn len(&self) -> usize {
        self.state.lock().await.classes.iter().map(VecDeque::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

async fn verdict(
    store: &EntryStore,
    in_flight: &HashSet<ItemId>,
    id: ItemId,
    now: DateTime<Utc>,
) -> Verdict {
    if in_flight.contains(&id) {
        return Verdict::Stale("already in flight");
    }
    let Some(slot) = store.slot(id).await else {
        return Verdict::Stale("record missing");
    };
    if slot.is_claimed() {
        return Verdict::Stale("already claimed");
    }
    let ready = {
        let record = slot.record.lock().await;
        if record.status != ItemStatus::Pending {
            return Verdict::Stale("not pending");
        }
        record.is_ready(now)
    };
    if ready {
        Verdict::Ready(slot)
    } else {
        Verdict::NotYet
    }
}
