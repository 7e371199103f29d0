//! NotificationQueue - the public surface.
//!
//! Accepts notifications, owns the scheduler loop, and answers status,
//! stats and health queries. Built with [`super::QueueBuilder`].

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::health::{HealthMonitor, HealthReport};
use super::scheduler_loop::{Dispatcher, SchedulerLoop};
use super::stats::{QueueStats, StatCounter, StatsTracker};
use crate::config::QueueConfig;
use crate::domain::{
    ItemId, Priority, QueueItem, RetryPolicy, StatusCounts, instant_after, instant_before,
};
use crate::error::{QueueError, QueueResult};
use crate::ports::{Backend, Clock, IdGenerator, Sender};

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Per-item options for [`NotificationQueue::enqueue_with`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnqueueOptions {
    pub priority: Priority,

    /// Attempt ceiling for this item. Defaults to `QueueConfig::max_retries`.
    pub max_attempts: Option<u32>,

    /// Hold the first attempt back by this long.
    pub delay: Option<Duration>,
}

impl EnqueueOptions {
    pub fn new(priority: Priority) -> Self {
        Self {
            priority,
            ..Self::default()
        }
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

pub struct NotificationQueue {
    config: QueueConfig,
    backend: Arc<dyn Backend>,
    clock: Arc<dyn Clock>,
    id_generator: Arc<dyn IdGenerator>,
    stats: Arc<StatsTracker>,
    dispatcher: Arc<Dispatcher>,
    scheduler: SchedulerLoop,
    health: HealthMonitor,
}

impl NotificationQueue {
    pub(crate) fn assemble(
        config: QueueConfig,
        backend: Arc<dyn Backend>,
        sender: Arc<dyn Sender>,
        clock: Arc<dyn Clock>,
        id_generator: Arc<dyn IdGenerator>,
    ) -> Self {
        let stats = Arc::new(StatsTracker::new());
        let retry = RetryPolicy::new(config.base_retry_delay(), config.max_retry_delay());
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&backend),
            sender,
            Arc::clone(&stats),
            Arc::clone(&clock),
            retry,
            config.batch_size,
        ));
        let health = HealthMonitor::new(
            Arc::clone(&backend),
            Arc::clone(&clock),
            config.stuck_threshold(),
        );

        Self {
            scheduler: SchedulerLoop::new(config.tick_interval()),
            config,
            backend,
            clock,
            id_generator,
            stats,
            dispatcher,
            health,
        }
    }

    /// Queue a notification with default options.
    pub async fn enqueue(
        &self,
        payload: serde_json::Value,
        priority: Priority,
    ) -> QueueResult<ItemId> {
        self.enqueue_with(payload, EnqueueOptions::new(priority)).await
    }

    /// Queue a notification.
    ///
    /// Fails with [`QueueError::Unavailable`] if the backend rejects the
    /// write; nothing is left behind in that case.
    pub async fn enqueue_with(
        &self,
        payload: serde_json::Value,
        options: EnqueueOptions,
    ) -> QueueResult<ItemId> {
        let now = self.clock.now();
        let id = self.id_generator.generate_item_id();
        let max_attempts = options.max_attempts.unwrap_or(self.config.max_retries);
        let mut item = QueueItem::new(id, payload, options.priority, max_attempts, now);
        if let Some(delay) = options.delay {
            item = item.with_ready_at(instant_after(now, delay));
        }

        self.backend
            .create(item)
            .await
            .map_err(QueueError::Unavailable)?;

        // count before indexing so a racing drain never decrements first
        self.stats.record(StatCounter::Pending, 1).await;
        if let Err(e) = self.backend.enqueue(id, options.priority).await {
            self.stats.record(StatCounter::Pending, -1).await;
            if let Err(cleanup) = self.backend.delete(id).await {
                warn!(item_id = %id, error = %cleanup, "could not remove unindexed item");
            }
            return Err(QueueError::Unavailable(e));
        }

        debug!(item_id = %id, priority = %options.priority, max_attempts, "notification enqueued");
        Ok(id)
    }

    /// Current record of `id`.
    pub async fn get_status(&self, id: ItemId) -> QueueResult<QueueItem> {
        self.backend
            .get(id)
            .await?
            .ok_or(QueueError::NotFound(id))
    }

    pub async fn get_stats(&self) -> QueueStats {
        self.stats.snapshot().await
    }

    /// Per-status counts recomputed from the backend.
    pub async fn counts_by_status(&self) -> QueueResult<StatusCounts> {
        Ok(self.backend.counts_by_status().await?)
    }

    /// Remove terminal items created more than `retention_days` ago.
    ///
    /// With `pending_ttl` configured, stale pending items are expired first.
    /// Returns the number of removed items. Stats are left unchanged by the
    /// removal itself.
    pub async fn cleanup(&self, retention_days: u32) -> QueueResult<usize> {
        let now = self.clock.now();

        if let Some(ttl) = self.config.pending_ttl() {
            let expired = self
                .backend
                .expire_pending_before(instant_before(now, ttl))
                .await?;
            if !expired.is_empty() {
                let n = expired.len() as i64;
                self.stats
                    .record_all(&[(StatCounter::Expired, n), (StatCounter::Pending, -n)])
                    .await;
                info!(expired = expired.len(), "expired stale pending notifications");
            }
        }

        let retention = Duration::from_secs(u64::from(retention_days) * SECS_PER_DAY);
        let cutoff = instant_before(now, retention);
        let mut removed = 0;
        for item in self.backend.list_terminal_older_than(cutoff).await? {
            if self.backend.delete(item.id).await? {
                removed += 1;
            }
        }

        info!(removed, retention_days, "cleanup finished");
        Ok(removed)
    }

    /// `cleanup` with `QueueConfig::default_retention_days`.
    pub async fn cleanup_default(&self) -> QueueResult<usize> {
        self.cleanup(self.config.default_retention_days).await
    }

    /// Start the scheduler loop. No-op if already running.
    pub async fn start(&self) {
        if self.scheduler.start(Arc::clone(&self.dispatcher)).await {
            info!(tick_ms = self.config.tick_interval_ms, "notification queue started");
        }
    }

    /// Stop draining new batches. Attempts already dispatched keep running;
    /// follow with [`NotificationQueue::wait_idle`] to let them settle.
    pub async fn stop(&self) {
        if self.scheduler.stop().await {
            info!(
                in_flight_attempts = self.dispatcher.attempts().active(),
                "notification queue stopped"
            );
        }
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// One scheduling pass, independent of the loop.
    pub async fn tick(&self) -> usize {
        self.dispatcher.tick().await
    }

    /// Wait until every dispatched attempt has finished.
    pub async fn wait_idle(&self) {
        self.dispatcher.attempts().wait_idle().await;
    }

    pub async fn is_healthy(&self) -> bool {
        self.health_report().await.is_healthy()
    }

    pub async fn health_report(&self) -> HealthReport {
        self.health.check(self.is_running()).await
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }
}
