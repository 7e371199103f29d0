//! Health monitor - detects stuck in-flight items.

use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::ItemId;
use crate::ports::{Backend, Clock};

/// Point-in-time health of the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub running: bool,

    /// In-flight items processing for longer than the stuck threshold.
    pub stuck: Vec<ItemId>,

    /// The backend could not be inspected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_error: Option<String>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.running && self.stuck.is_empty() && self.backend_error.is_none()
    }
}

pub struct HealthMonitor {
    backend: Arc<dyn Backend>,
    clock: Arc<dyn Clock>,
    stuck_threshold: TimeDelta,
}

impl HealthMonitor {
    pub fn new(backend: Arc<dyn Backend>, clock: Arc<dyn Clock>, stuck_threshold: Duration) -> Self {
        Self {
            backend,
            clock,
            stuck_threshold: TimeDelta::from_std(stuck_threshold).unwrap_or(TimeDelta::MAX),
        }
    }

    /// Inspect the in-flight set.
    ///
    /// Staleness is measured from each item's `created_at`, not from the
    /// start of its current attempt.
    pub async fn check(&self, running: bool) -> HealthReport {
        let mut report = HealthReport {
            running,
            stuck: Vec::new(),
            backend_error: None,
        };

        let in_flight = match self.backend.in_flight().await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "health check could not list in-flight items");
                report.backend_error = Some(e.to_string());
                return report;
            }
        };

        let now = self.clock.now();
        for id in in_flight {
            match self.backend.get(id).await {
                Ok(Some(item)) if item.is_stuck(now, self.stuck_threshold) => {
                    report.stuck.push(id);
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(item_id = %id, error = %e, "health check could not load item");
                    report.backend_error = Some(e.to_string());
                }
            }
        }

        if !report.stuck.is_empty() {
            warn!(stuck = report.stuck.len(), "stuck deliveries detected");
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Priority, QueueItem};
    use crate::impls::InMemoryBackend;
    use crate::ports::ManualClock;
    use chrono::{TimeZone, Utc};
    use ulid::Ulid;

    #[tokio::test]
    async fn stuck_processing_item_is_reported_until_it_finishes() {
        let t0 = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();
        let clock = ManualClock::new(t0);
        let backend = Arc::new(InMemoryBackend::new());
        let monitor = HealthMonitor::new(
            backend.clone(),
            Arc::new(clock.clone()),
            Duration::from_secs(300),
        );

        let mut item = QueueItem::new(
            ItemId::from_ulid(Ulid::new()),
            serde_json::json!({}),
            Priority::Normal,
            3,
            t0,
        );
        let id = backend.create(item.clone()).await.unwrap();
        backend.enqueue(id, Priority::Normal).await.unwrap();
        backend.drain_ready(t0, 1).await.unwrap();
        item.start_attempt();
        backend.save(&item).await.unwrap();

        assert!(monitor.check(true).await.is_healthy());

        clock.advance(TimeDelta::minutes(6));
        let report = monitor.check(true).await;
        assert_eq!(report.stuck, vec![id]);
        assert!(!report.is_healthy());

        item.mark_completed(clock.now());
        backend.save(&item).await.unwrap();
        backend.release(id).await.unwrap();
        assert!(monitor.check(true).await.is_healthy());
    }

    #[tokio::test]
    async fn stopped_loop_is_unhealthy() {
        let backend = Arc::new(InMemoryBackend::new());
        let monitor = HealthMonitor::new(
            backend,
            Arc::new(crate::ports::SystemClock),
            Duration::from_secs(300),
        );
        assert!(!monitor.check(false).await.is_healthy());
        assert!(monitor.check(true).await.is_healthy());
    }
}
