//! SchedulerLoop - periodic driver: drain a ready batch, deliver each item.
//!
//! The loop is one tokio task. Each tick drains up to `batch_size` ready ids
//! and spawns one delivery attempt per id; attempts run independently of
//! each other and of the next tick. Stopping the loop stops draining only.

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, Notify, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::stats::{StatCounter, StatsTracker};
use crate::domain::{ItemId, ItemStatus, QueueItem, RetryPolicy, instant_after};
use crate::ports::{Backend, Clock, Sender};

/// Counts spawned attempts that have not finished yet.
#[derive(Default)]
pub(crate) struct AttemptTracker {
    active: AtomicUsize,
    idle: Notify,
}

impl AttemptTracker {
    fn enter(self: &Arc<Self>) -> AttemptGuard {
        self.active.fetch_add(1, Ordering::AcqRel);
        AttemptGuard {
            tracker: Arc::clone(self),
        }
    }

    pub(crate) fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) async fn wait_idle(&self) {
        loop {
            // register before checking so a wakeup in between is not missed
            let notified = self.idle.notified();
            if self.active() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Decrements on drop, including when the attempt's task is torn down.
struct AttemptGuard {
    tracker: Arc<AttemptTracker>,
}

impl Drop for AttemptGuard {
    fn drop(&mut self) {
        if self.tracker.active.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.tracker.idle.notify_waiters();
        }
    }
}

/// Outcome of one call into the sender.
enum Delivery {
    Sent,
    Failed(String),
}

/// Drains ready items and runs their delivery attempts.
pub(crate) struct Dispatcher {
    backend: Arc<dyn Backend>,
    sender: Arc<dyn Sender>,
    stats: Arc<StatsTracker>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    batch_size: usize,
    drain_lock: Mutex<()>,
    attempts: Arc<AttemptTracker>,
}

impl Dispatcher {
    pub(crate) fn new(
        backend: Arc<dyn Backend>,
        sender: Arc<dyn Sender>,
        stats: Arc<StatsTracker>,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
        batch_size: usize,
    ) -> Self {
        Self {
            backend,
            sender,
            stats,
            clock,
            retry,
            batch_size,
            drain_lock: Mutex::new(()),
            attempts: Arc::new(AttemptTracker::default()),
        }
    }

    pub(crate) fn attempts(&self) -> &AttemptTracker {
        &self.attempts
    }

    /// One scheduling pass. Returns how many attempts were dispatched.
    ///
    /// Passes never overlap each other's drain; the attempts they spawn may.
    pub(crate) async fn tick(self: &Arc<Self>) -> usize {
        let _drain = self.drain_lock.lock().await;

        let now = self.clock.now();
        let ids = match self.backend.drain_ready(now, self.batch_size).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(backend = self.backend.name(), error = %e, "drain failed, skipping tick");
                return 0;
            }
        };

        for &id in &ids {
            let guard = self.attempts.enter();
            let this = Arc::clone(self);
            tokio::spawn(async move {
                let _guard = guard;
                this.deliver(id).await;
            });
        }

        if !ids.is_empty() {
            debug!(dispatched = ids.len(), "tick dispatched batch");
        }
        ids.len()
    }

    /// Runs one attempt for a drained (claimed, in-flight) id.
    async fn deliver(&self, id: ItemId) {
        let mut item = match self.backend.get(id).await {
            Ok(Some(item)) if item.status == ItemStatus::Pending => item,
            Ok(Some(item)) => {
                debug!(item_id = %id, status = %item.status, "drained item is no longer pending");
                self.release(id).await;
                return;
            }
            Ok(None) => {
                debug!(item_id = %id, "drained item vanished");
                self.release(id).await;
                return;
            }
            Err(e) => {
                // priority unknown, so it cannot be handed back to its class
                error!(item_id = %id, error = %e, "could not load drained item");
                self.release(id).await;
                return;
            }
        };

        item.start_attempt();
        self.stats
            .record_all(&[(StatCounter::Pending, -1), (StatCounter::Processing, 1)])
            .await;
        if let Err(e) = self.backend.save(&item).await {
            warn!(item_id = %id, error = %e, "could not mark item processing, handing it back");
            self.stats
                .record_all(&[(StatCounter::Pending, 1), (StatCounter::Processing, -1)])
                .await;
            if let Err(e) = self.backend.enqueue(id, item.priority).await {
                error!(item_id = %id, error = %e, "hand back failed");
                self.release(id).await;
            }
            return;
        }

        debug!(item_id = %id, attempt = item.attempts, sender = self.sender.name(), "delivering");
        let started = Instant::now();
        let delivery = self.invoke_sender(&item).await;
        let elapsed_ms = started.elapsed().as_millis() as f64;

        match delivery {
            Delivery::Sent => self.complete(item, elapsed_ms).await,
            Delivery::Failed(reason) if item.has_attempts_left() => self.retry(item, reason).await,
            Delivery::Failed(reason) => self.fail(item, reason).await,
        }
    }

    /// Calls the sender in its own task so a panic stays inside this attempt.
    async fn invoke_sender(&self, item: &QueueItem) -> Delivery {
        let sender = Arc::clone(&self.sender);
        let payload = item.payload.clone();
        let outcome = tokio::spawn(async move { sender.send(&payload).await }).await;

        match outcome {
            Ok(Ok(report)) if report.success => Delivery::Sent,
            Ok(Ok(report)) => Delivery::Failed(
                report
                    .error
                    .unwrap_or_else(|| "sender reported failure".to_string()),
            ),
            Ok(Err(e)) => Delivery::Failed(e.to_string()),
            Err(e) => Delivery::Failed(join_failure(e)),
        }
    }

    async fn complete(&self, mut item: QueueItem, elapsed_ms: f64) {
        let id = item.id;
        item.mark_completed(self.clock.now());
        if !self.save_outcome(&item).await {
            return;
        }
        self.stats.record_success(elapsed_ms).await;
        self.release(id).await;
        info!(item_id = %id, attempts = item.attempts, elapsed_ms, "notification delivered");
    }

    async fn retry(&self, mut item: QueueItem, reason: String) {
        let id = item.id;
        let delay = self.retry.next_delay(item.attempts);
        let next_ready_at = instant_after(self.clock.now(), delay);
        item.schedule_retry(next_ready_at, reason);
        if !self.save_outcome(&item).await {
            return;
        }
        self.stats
            .record_all(&[(StatCounter::Pending, 1), (StatCounter::Processing, -1)])
            .await;
        if let Err(e) = self.backend.enqueue(id, item.priority).await {
            error!(item_id = %id, error = %e, "could not re-enqueue item for retry");
            self.release(id).await;
        }
        warn!(
            item_id = %id,
            attempt = item.attempts,
            max_attempts = item.max_attempts,
            retry_in_ms = delay.as_millis() as u64,
            error = item.last_error.as_deref().unwrap_or_default(),
            "delivery failed, retry scheduled"
        );
    }

    async fn fail(&self, mut item: QueueItem, reason: String) {
        let id = item.id;
        item.mark_failed(reason);
        if !self.save_outcome(&item).await {
            return;
        }
        self.stats
            .record_all(&[(StatCounter::Failed, 1), (StatCounter::Processing, -1)])
            .await;
        self.release(id).await;
        warn!(
            item_id = %id,
            attempts = item.attempts,
            error = item.last_error.as_deref().unwrap_or_default(),
            "delivery failed permanently"
        );
    }

    /// Persist the outcome of an attempt.
    ///
    /// On failure the id stays claimed and in flight with its stored record
    /// still `Processing`, and no counters move: the health check reports
    /// it once it crosses the stuck threshold.
    async fn save_outcome(&self, item: &QueueItem) -> bool {
        match self.backend.save(item).await {
            Ok(()) => true,
            Err(e) => {
                error!(
                    item_id = %item.id,
                    outcome = %item.status,
                    error = %e,
                    "could not save attempt outcome, leaving item in flight"
                );
                false
            }
        }
    }

    async fn release(&self, id: ItemId) {
        if let Err(e) = self.backend.release(id).await {
            error!(item_id = %id, error = %e, "could not release in-flight item");
        }
    }
}

fn join_failure(e: JoinError) -> String {
    if !e.is_panic() {
        return format!("sender task aborted: {e}");
    }
    let panic = e.into_panic();
    format!("sender panicked: {}", panic_message(panic.as_ref()))
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

struct LoopHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

/// Start/stop handle around the periodic task.
/// - `shutdown_tx` を drop してもループは止まる
/// - 配送中の attempt は stop の対象外
pub(crate) struct SchedulerLoop {
    tick_interval: Duration,
    running: AtomicBool,
    handle: Mutex<Option<LoopHandle>>,
}

impl SchedulerLoop {
    pub(crate) fn new(tick_interval: Duration) -> Self {
        Self {
            tick_interval,
            running: AtomicBool::new(false),
            handle: Mutex::new(None),
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Spawn the loop. Returns false if it was already running.
    pub(crate) async fn start(&self, dispatcher: Arc<Dispatcher>) -> bool {
        let mut handle = self.handle.lock().await;
        if handle.is_some() {
            return false;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(run_loop(dispatcher, self.tick_interval, shutdown_rx));
        *handle = Some(LoopHandle { shutdown_tx, join });
        self.running.store(true, Ordering::Release);
        true
    }

    /// Stop draining and wait for the loop task to exit.
    /// Returns false if it was not running.
    pub(crate) async fn stop(&self) -> bool {
        let mut handle = self.handle.lock().await;
        let Some(LoopHandle { shutdown_tx, join }) = handle.take() else {
            return false;
        };
        self.running.store(false, Ordering::Release);

        // ignore send error: the loop may already be gone
        let _ = shutdown_tx.send(true);
        if let Err(e) = join.await {
            warn!(error = %e, "scheduler loop ended abnormally");
        }
        true
    }
}

async fn run_loop(
    dispatcher: Arc<Dispatcher>,
    tick_interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let start = tokio::time::Instant::now() + tick_interval;
    let mut ticker = tokio::time::interval_at(start, tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    debug!(tick_ms = tick_interval.as_millis() as u64, "scheduler loop started");

    loop {
        tokio::select! {
            // shutdown を優先
            biased;
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                dispatcher.tick().await;
            }
        }
    }

    debug!(in_flight_attempts = dispatcher.attempts().active(), "scheduler loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Priority, QueueItem};
    use crate::impls::InMemoryBackend;
    use crate::ports::{SendError, SendReport, SystemClock};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;
    use ulid::Ulid;

    struct CountingSender {
        calls: AtomicU32,
    }

    #[async_trait]
    impl Sender for CountingSender {
        async fn send(&self, _payload: &serde_json::Value) -> Result<SendReport, SendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(SendReport::delivered())
        }
    }

    struct PanickingSender;

    #[async_trait]
    impl Sender for PanickingSender {
        async fn send(&self, _payload: &serde_json::Value) -> Result<SendReport, SendError> {
            panic!("sender exploded");
        }
    }

    async fn dispatcher_with(
        sender: Arc<dyn Sender>,
        ids: usize,
    ) -> (Arc<Dispatcher>, Arc<InMemoryBackend>, Vec<ItemId>) {
        let backend = Arc::new(InMemoryBackend::new());
        let clock = Arc::new(SystemClock);
        let mut created = Vec::new();
        for _ in 0..ids {
            let item = QueueItem::new(
                ItemId::from_ulid(Ulid::new()),
                serde_json::json!({"n": created.len()}),
                Priority::Normal,
                1,
                clock.now(),
            );
            let id = backend.create(item).await.unwrap();
            backend.enqueue(id, Priority::Normal).await.unwrap();
            created.push(id);
        }
        let stats = Arc::new(StatsTracker::new());
        stats.record(StatCounter::Pending, ids as i64).await;
        let dispatcher = Arc::new(Dispatcher::new(
            backend.clone(),
            sender,
            stats,
            clock,
            RetryPolicy::new(Duration::from_millis(10), Duration::from_millis(100)),
            10,
        ));
        (dispatcher, backend, created)
    }

    #[tokio::test]
    async fn back_to_back_ticks_deliver_each_item_once() {
        let sender = Arc::new(CountingSender {
            calls: AtomicU32::new(0),
        });
        let (dispatcher, backend, _) = dispatcher_with(sender.clone(), 5).await;

        let (a, b) = tokio::join!(dispatcher.tick(), dispatcher.tick());
        assert_eq!(a + b, 5);
        dispatcher.attempts().wait_idle().await;

        assert_eq!(sender.calls.load(Ordering::SeqCst), 5);
        assert_eq!(backend.counts_by_status().await.unwrap().completed, 5);
        assert!(backend.in_flight().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn panicking_sender_counts_as_failure() {
        let (dispatcher, backend, ids) = dispatcher_with(Arc::new(PanickingSender), 2).await;

        assert_eq!(dispatcher.tick().await, 2);
        dispatcher.attempts().wait_idle().await;

        for id in ids {
            let item = backend.get(id).await.unwrap().unwrap();
            assert_eq!(item.status, ItemStatus::Failed);
            assert_eq!(item.last_error.as_deref(), Some("sender panicked: sender exploded"));
        }
        let stats = dispatcher.stats.snapshot().await;
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.processing, 0);
    }

    #[tokio::test]
    async fn loop_start_and_stop_are_idempotent() {
        let (dispatcher, _, _) = dispatcher_with(Arc::new(PanickingSender), 0).await;
        let scheduler = SchedulerLoop::new(Duration::from_millis(5));

        assert!(scheduler.start(dispatcher.clone()).await);
        assert!(!scheduler.start(dispatcher.clone()).await);
        assert!(scheduler.is_running());

        assert!(scheduler.stop().await);
        assert!(!scheduler.stop().await);
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn running_loop_drains_without_manual_ticks() {
        let sender = Arc::new(CountingSender {
            calls: AtomicU32::new(0),
        });
        let (dispatcher, backend, _) = dispatcher_with(sender.clone(), 3).await;
        let scheduler = SchedulerLoop::new(Duration::from_millis(5));
        scheduler.start(dispatcher.clone()).await;

        let settled = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if backend.counts_by_status().await.unwrap().completed == 3 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        scheduler.stop().await;
        dispatcher.attempts().wait_idle().await;

        assert!(settled.is_ok());
        assert_eq!(sender.calls.load(Ordering::SeqCst), 3);
    }
}
