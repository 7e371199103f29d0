//! notiq-cli - drives a queue against a simulated sender and reports the outcome.
//!
//! Enqueues `--count` notifications spread over all priorities, runs the
//! scheduler until every item settles (or `--timeout-secs` passes, or Ctrl-C),
//! then prints stats, per-status counts and health as JSON.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use rand::Rng;
use serde::Serialize;
use tracing::{info, warn};

use notiq_core::{
    EnqueueOptions, HealthReport, Priority, QueueBuilder, QueueConfig, QueueStats, SendError,
    SendReport, Sender, StatusCounts,
};

// ── CLI ─────────────────────────────────────────────────────────────

/// Simulated notification run.
#[derive(Parser, Debug)]
#[command(name = "notiq-cli", version, about)]
struct Cli {
    /// Number of notifications to enqueue.
    #[arg(long, env = "NOTIQ_CLI_COUNT", default_value_t = 50)]
    count: usize,

    /// Probability in [0, 1] that one send attempt fails.
    #[arg(long, env = "NOTIQ_CLI_FAILURE_RATE", default_value_t = 0.2)]
    failure_rate: f64,

    /// Simulated send latency upper bound, in milliseconds.
    #[arg(long, env = "NOTIQ_CLI_LATENCY_MS", default_value_t = 25)]
    latency_ms: u64,

    /// Scheduler tick interval, in milliseconds.
    #[arg(long, env = "NOTIQ_TICK_INTERVAL_MS", default_value_t = 100)]
    tick_ms: u64,

    /// Overrides NOTIQ_BATCH_SIZE.
    #[arg(long)]
    batch_size: Option<usize>,

    /// Overrides NOTIQ_MAX_RETRIES.
    #[arg(long)]
    max_retries: Option<u32>,

    /// First retry delay, in milliseconds. Kept short for a demo run.
    #[arg(long, env = "NOTIQ_BASE_RETRY_DELAY_MS", default_value_t = 250)]
    base_delay_ms: u64,

    /// Give up waiting after this many seconds.
    #[arg(long, env = "NOTIQ_CLI_TIMEOUT_SECS", default_value_t = 30)]
    timeout_secs: u64,
}

impl Cli {
    fn queue_config(&self) -> anyhow::Result<QueueConfig> {
        let mut config = QueueConfig::from_env().context("reading NOTIQ_* environment")?;
        config.tick_interval_ms = self.tick_ms;
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(max_retries) = self.max_retries {
            config.max_retries = max_retries;
        }
        config.base_retry_delay_ms = self.base_delay_ms;
        config.max_retry_delay_ms = config.max_retry_delay_ms.max(self.base_delay_ms);
        Ok(config)
    }
}

// ── SimulatedSender ─────────────────────────────────────────────────

/// Sleeps for a random latency, then fails with probability `failure_rate`.
struct SimulatedSender {
    failure_rate: f64,
    max_latency: Duration,
}

#[async_trait]
impl Sender for SimulatedSender {
    async fn send(&self, payload: &serde_json::Value) -> Result<SendReport, SendError> {
        let (latency, roll) = {
            let mut rng = rand::thread_rng();
            let latency_ms = rng.gen_range(0..=self.max_latency.as_millis() as u64);
            (Duration::from_millis(latency_ms), rng.gen_range(0.0..1.0))
        };
        tokio::time::sleep(latency).await;

        if payload.get("to").is_none() {
            return Err(SendError::InvalidPayload("missing recipient".into()));
        }
        if roll < self.failure_rate {
            return Ok(SendReport::rejected("simulated delivery failure"));
        }
        Ok(SendReport::delivered())
    }

    fn name(&self) -> &str {
        "simulated"
    }
}

// ── report ──────────────────────────────────────────────────────────

#[derive(Serialize)]
struct RunReport {
    settled: bool,
    elapsed_ms: u64,
    stats: QueueStats,
    counts: StatusCounts,
    health: HealthReport,
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    anyhow::ensure!(
        (0.0..=1.0).contains(&cli.failure_rate),
        "--failure-rate must be within [0, 1], got {}",
        cli.failure_rate
    );

    let sender = Arc::new(SimulatedSender {
        failure_rate: cli.failure_rate,
        max_latency: Duration::from_millis(cli.latency_ms),
    });
    let queue = QueueBuilder::new(sender)
        .config(cli.queue_config()?)
        .build()
        .await?;

    for n in 0..cli.count {
        let priority = Priority::ALL[n % Priority::ALL.len()];
        let payload = serde_json::json!({
            "to": format!("user-{n}"),
            "title": format!("notification #{n}"),
        });
        queue
            .enqueue_with(payload, EnqueueOptions::new(priority))
            .await
            .with_context(|| format!("enqueue #{n}"))?;
    }
    info!(count = cli.count, backend = queue.backend_name(), "enqueued");

    let started = std::time::Instant::now();
    queue.start().await;

    let wait_settled = async {
        let mut poll = tokio::time::interval(Duration::from_millis(50));
        loop {
            poll.tick().await;
            match queue.counts_by_status().await {
                Ok(counts) if counts.unsettled() == 0 => break,
                Ok(_) => {}
                Err(e) => warn!(error = %e, "could not read counts"),
            }
        }
    };
    let settled = tokio::select! {
        _ = wait_settled => true,
        _ = tokio::time::sleep(Duration::from_secs(cli.timeout_secs)) => {
            warn!(timeout_secs = cli.timeout_secs, "timed out before all items settled");
            false
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted");
            false
        }
    };

    let health = queue.health_report().await;
    queue.stop().await;
    queue.wait_idle().await;

    let report = RunReport {
        settled,
        elapsed_ms: started.elapsed().as_millis() as u64,
        stats: queue.get_stats().await,
        counts: queue.counts_by_status().await?,
        health,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
