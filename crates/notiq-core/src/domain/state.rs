//! Item status state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a queued item.
///
/// State transitions:
/// - Pending -> Processing -> Completed
/// - Pending -> Processing -> Pending (retry with backoff, while attempts remain)
/// - Pending -> Processing -> Failed (last attempt failed)
/// - Pending -> Expired (opt-in expiry sweep, see `QueueConfig::pending_ttl`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Waiting in the priority index (possibly until `next_ready_at`).
    Pending,

    /// A delivery attempt is in flight.
    Processing,

    /// Delivered.
    Completed,

    /// Attempts exhausted.
    Failed,

    /// Swept out while still pending.
    Expired,
}

impl ItemStatus {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ItemStatus::Completed | ItemStatus::Failed | ItemStatus::Expired
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Processing => "processing",
            ItemStatus::Completed => "completed",
            ItemStatus::Failed => "failed",
            ItemStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Item counts per status, recomputed from the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub expired: usize,
}

impl StatusCounts {
    pub fn add(&mut self, status: ItemStatus) {
        match status {
            ItemStatus::Pending => self.pending += 1,
            ItemStatus::Processing => self.processing += 1,
            ItemStatus::Completed => self.completed += 1,
            ItemStatus::Failed => self.failed += 1,
            ItemStatus::Expired => self.expired += 1,
        }
    }

    /// Items that have not reached a terminal state.
    pub fn unsettled(&self) -> usize {
        self.pending + self.processing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::pending(ItemStatus::Pending, false)]
    #[case::processing(ItemStatus::Processing, false)]
    #[case::completed(ItemStatus::Completed, true)]
    #[case::failed(ItemStatus::Failed, true)]
    #[case::expired(ItemStatus::Expired, true)]
    fn terminal_states(#[case] status: ItemStatus, #[case] terminal: bool) {
        assert_eq!(status.is_terminal(), terminal);
    }

    #[test]
    fn counts_track_unsettled() {
        let mut counts = StatusCounts::default();
        counts.add(ItemStatus::Pending);
        counts.add(ItemStatus::Processing);
        counts.add(ItemStatus::Completed);
        assert_eq!(counts.unsettled(), 2);
        assert_eq!(counts.completed, 1);
    }
}
