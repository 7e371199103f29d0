use thiserror::Error;

use crate::domain::ItemId;

/// Errors surfaced to callers of the queue.
///
/// Only enqueue-time and lookup failures are reported this way. Delivery
/// failures after an item was accepted are recorded on the item and in the
/// stats, never returned.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue unavailable: {0}")]
    Unavailable(#[source] BackendError),

    #[error("item not found: {0}")]
    NotFound(ItemId),

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
}

/// Errors raised by a [`crate::ports::Backend`] implementation.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("backend initialization failed: {0}")]
    Init(String),

    #[error("duplicate item id: {0}")]
    Duplicate(ItemId),

    #[error("{0}")]
    Other(String),
}

/// Invalid or unparsable queue configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} has an invalid value: {value:?}")]
    InvalidVar { var: &'static str, value: String },

    #[error("invalid queue config: {0}")]
    Invalid(String),
}

pub type QueueResult<T> = Result<T, QueueError>;
