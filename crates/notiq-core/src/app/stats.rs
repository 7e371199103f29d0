//! Stats tracker: incremental counters and running average.

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// Snapshot of queue throughput counters.
///
/// Counters are adjusted incrementally as items move through the state
/// machine; they are not recomputed from the backend (see
/// `NotificationQueue::counts_by_status` for that).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    pub expired: u64,

    /// Successful deliveries.
    pub total_processed: u64,

    /// Mean send duration of successful deliveries.
    pub average_processing_time_ms: f64,
}

/// Named counter for [`StatsTracker::record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatCounter {
    Pending,
    Processing,
    Completed,
    Failed,
    Expired,
    TotalProcessed,
}

#[derive(Debug, Default)]
pub struct StatsTracker {
    stats: Mutex<QueueStats>,
}

impl StatsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adjust one counter by `delta`, saturating at zero.
    pub async fn record(&self, counter: StatCounter, delta: i64) {
        let mut stats = self.stats.lock().await;
        bump(&mut stats, counter, delta);
    }

    /// Apply several adjustments under one lock so snapshots never see a
    /// half-applied transition.
    pub async fn record_all(&self, changes: &[(StatCounter, i64)]) {
        let mut stats = self.stats.lock().await;
        for &(counter, delta) in changes {
            bump(&mut stats, counter, delta);
        }
    }

    /// Fold one duration into the running average.
    ///
    /// Expects `total_processed` to already include this sample:
    /// `avg' = avg + (ms - avg) / total_processed`, in f64.
    pub async fn record_processing_time(&self, ms: f64) {
        let mut stats = self.stats.lock().await;
        fold_average(&mut stats, ms);
    }

    /// Successful delivery: completed+1, processing-1, total_processed+1,
    /// then the average.
    pub async fn record_success(&self, ms: f64) {
        let mut stats = self.stats.lock().await;
        bump(&mut stats, StatCounter::Completed, 1);
        bump(&mut stats, StatCounter::Processing, -1);
        bump(&mut stats, StatCounter::TotalProcessed, 1);
        fold_average(&mut stats, ms);
    }

    pub async fn snapshot(&self) -> QueueStats {
        self.stats.lock().await.clone()
    }
}

fn bump(stats: &mut QueueStats, counter: StatCounter, delta: i64) {
    let slot = match counter {
        StatCounter::Pending => &mut stats.pending,
        StatCounter::Processing => &mut stats.processing,
        StatCounter::Completed => &mut stats.completed,
        StatCounter::Failed => &mut stats.failed,
        StatCounter::Expired => &mut stats.expired,
        StatCounter::TotalProcessed => &mut stats.total_processed,
    };
    *slot = slot.saturating_add_signed(delta);
}

fn fold_average(stats: &mut QueueStats, ms: f64) {
    // no sample counted yet: treat this one as the first
    let n = stats.total_processed.max(1) as f64;
    stats.average_processing_time_ms += (ms - stats.average_processing_time_ms) / n;
}
