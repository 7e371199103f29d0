//! QueueBuilder - wiring and start-up checks.
//!
//! Fail-fast on configuration, lenient on the backend: an invalid config is
//! a `BuildError`, but a backend that cannot initialize is replaced by the
//! in-memory backend so callers always get a working queue.

use std::sync::Arc;

use tracing::{info, warn};

use super::queue::NotificationQueue;
use crate::config::QueueConfig;
use crate::error::ConfigError;
use crate::impls::InMemoryBackend;
use crate::ports::{Backend, Clock, IdGenerator, Sender, SystemClock, UlidGenerator};

/// Builds a [`NotificationQueue`].
///
/// ```ignore
/// let queue = QueueBuilder::new(Arc::new(PushSender::new(client)))
///     .config(QueueConfig::from_env()?)
///     .build()
///     .await?;
/// queue.start().await;
/// ```
pub struct QueueBuilder {
    sender: Arc<dyn Sender>,
    config: QueueConfig,
    backend: Option<Arc<dyn Backend>>,
    clock: Option<Arc<dyn Clock>>,
    id_generator: Option<Arc<dyn IdGenerator>>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("cannot build queue: {0}")]
    InvalidConfig(#[from] ConfigError),
}

impl QueueBuilder {
    pub fn new(sender: Arc<dyn Sender>) -> Self {
        Self {
            sender,
            config: QueueConfig::default(),
            backend: None,
            clock: None,
            id_generator: None,
        }
    }

    pub fn config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }

    /// Use `backend` instead of the in-memory default.
    pub fn backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Defaults to ULIDs stamped by the queue's clock.
    pub fn id_generator(mut self, id_generator: Arc<dyn IdGenerator>) -> Self {
        self.id_generator = Some(id_generator);
        self
    }

    /// Validate the config, initialize the backend and assemble the queue.
    ///
    /// The queue is returned stopped; call `start` to begin dispatching.
    pub async fn build(self) -> Result<NotificationQueue, BuildError> {
        self.config.validate()?;

        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let id_generator: Arc<dyn IdGenerator> = self
            .id_generator
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(Arc::clone(&clock))));
        let backend = init_backend(self.backend).await;

        info!(
            backend = backend.name(),
            sender = self.sender.name(),
            batch_size = self.config.batch_size,
            tick_ms = self.config.tick_interval_ms,
            "notification queue built"
        );
        Ok(NotificationQueue::assemble(
            self.config,
            backend,
            self.sender,
            clock,
            id_generator,
        ))
    }
}

async fn init_backend(requested: Option<Arc<dyn Backend>>) -> Arc<dyn Backend> {
    let Some(backend) = requested else {
        return Arc::new(InMemoryBackend::new());
    };
    match backend.init().await {
        Ok(()) => backend,
        Err(e) => {
            warn!(
                backend = backend.name(),
                error = %e,
                "backend initialization failed, falling back to in-memory backend"
            );
            Arc::new(InMemoryBackend::new())
        }
    }
}
