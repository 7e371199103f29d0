//! Queue item: the canonical record of one notification.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use super::{ItemId, ItemStatus, Priority};

/// Metadata + payload for an item in the queue.
///
/// Design:
/// - This is the single source of truth for item state.
/// - The priority index holds `ItemId`s only.
/// - All state transitions go through the methods below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: ItemId,

    /// Opaque notification data. The queue never looks inside.
    pub payload: serde_json::Value,

    pub priority: Priority,
    pub status: ItemStatus,

    /// Delivery attempts made so far (including the current one while Processing).
    pub attempts: u32,

    /// Ceiling for `attempts`.
    pub max_attempts: u32,

    /// Not eligible for dequeue before this instant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_ready_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,

    /// Set once, on successful delivery.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl QueueItem {
    pub fn new(
        id: ItemId,
        payload: serde_json::Value,
        priority: Priority,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            payload,
            priority,
            status: ItemStatus::Pending,
            attempts: 0,
            max_attempts: max_attempts.max(1),
            next_ready_at: None,
            created_at: now,
            processed_at: None,
            last_error: None,
        }
    }

    /// Defer the first attempt until `at`.
    pub fn with_ready_at(mut self, at: DateTime<Utc>) -> Self {
        self.next_ready_at = Some(at);
        self
    }

    /// Pending and past its `next_ready_at`.
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        self.status == ItemStatus::Pending && self.next_ready_at.is_none_or(|at| at <= now)
    }

    pub fn has_attempts_left(&self) -> bool {
        self.attempts < self.max_attempts
    }

    /// Mark as processing (increment attempts).
    pub fn start_attempt(&mut self) {
        debug_assert_eq!(self.status, ItemStatus::Pending);
        self.status = ItemStatus::Processing;
        self.attempts = (self.attempts + 1).min(self.max_attempts);
    }

    pub fn mark_completed(&mut self, now: DateTime<Utc>) {
        self.status = ItemStatus::Completed;
        self.processed_at = Some(now);
        self.next_ready_at = None;
    }

    /// Back to pending with a backoff deadline.
    pub fn schedule_retry(&mut self, next_ready_at: DateTime<Utc>, error: String) {
        self.status = ItemStatus::Pending;
        self.next_ready_at = Some(next_ready_at);
        self.last_error = Some(error);
    }

    /// Mark as failed (attempts exhausted).
    pub fn mark_failed(&mut self, error: String) {
        self.status = ItemStatus::Failed;
        self.next_ready_at = None;
        self.last_error = Some(error);
    }

    pub fn mark_expired(&mut self) {
        self.status = ItemStatus::Expired;
        self.next_ready_at = None;
    }

    /// Processing for longer than `threshold`, measured from `created_at`.
    ///
    /// Note: an item that failed earlier and was retried much later still
    /// counts its age from creation.
    pub fn is_stuck(&self, now: DateTime<Utc>, threshold: TimeDelta) -> bool {
        self.status == ItemStatus::Processing && now.signed_duration_since(self.created_at) > threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ulid::Ulid;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()
    }

    fn item(max_attempts: u32) -> QueueItem {
        QueueItem::new(
            ItemId::from_ulid(Ulid::new()),
            serde_json::json!({"to": "user-1"}),
            Priority::Normal,
            max_attempts,
            t0(),
        )
    }

    #[test]
    fn new_item_is_pending_and_ready() {
        let it = item(3);
        assert_eq!(it.status, ItemStatus::Pending);
        assert_eq!(it.attempts, 0);
        assert!(it.is_ready(t0()));
        assert!(it.processed_at.is_none());
    }

    #[test]
    fn zero_max_attempts_is_clamped() {
        assert_eq!(item(0).max_attempts, 1);
    }

    #[test]
    fn deferred_item_is_not_ready_until_deadline() {
        let it = item(3).with_ready_at(t0() + TimeDelta::seconds(30));
        assert!(!it.is_ready(t0()));
        assert!(it.is_ready(t0() + TimeDelta::seconds(30)));
    }

    #[test]
    fn success_sets_processed_at() {
        let mut it = item(3);
        it.start_attempt();
        assert_eq!(it.status, ItemStatus::Processing);
        assert_eq!(it.attempts, 1);

        it.mark_completed(t0());
        assert_eq!(it.status, ItemStatus::Completed);
        assert_eq!(it.processed_at, Some(t0()));
    }

    #[test]
    fn retry_then_exhaustion() {
        let mut it = item(2);
        it.start_attempt();
        assert!(it.has_attempts_left());
        it.schedule_retry(t0() + TimeDelta::seconds(10), "boom".into());
        assert_eq!(it.status, ItemStatus::Pending);
        assert!(!it.is_ready(t0()));

        it.start_attempt();
        assert!(!it.has_attempts_left());
        it.mark_failed("boom again".into());
        assert_eq!(it.status, ItemStatus::Failed);
        assert_eq!(it.attempts, 2);
        assert_eq!(it.last_error.as_deref(), Some("boom again"));
        assert!(it.processed_at.is_none());
    }

    #[test]
    fn stuck_is_measured_from_creation() {
        let mut it = item(3);
        it.start_attempt();
        let threshold = TimeDelta::minutes(5);
        assert!(!it.is_stuck(t0() + TimeDelta::minutes(5), threshold));
        assert!(it.is_stuck(t0() + TimeDelta::minutes(6), threshold));

        it.mark_completed(t0() + TimeDelta::minutes(6));
        assert!(!it.is_stuck(t0() + TimeDelta::hours(1), threshold));
    }

    #[test]
    fn retry_attempt_inherits_age_of_item() {
        let mut it = item(3);
        it.start_attempt();
        it.schedule_retry(t0() + TimeDelta::minutes(10), "rejected".into());
        it.start_attempt();

        // one second into the second attempt, but ten minutes after creation
        let now = t0() + TimeDelta::minutes(10) + TimeDelta::seconds(1);
        assert!(it.is_stuck(now, TimeDelta::minutes(5)));
    }
}
