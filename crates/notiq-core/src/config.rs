//! Queue configuration.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Static queue configuration, supplied at construction.
///
/// Durations are stored as integer milliseconds/seconds so the struct reads
/// naturally from env vars and config files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Default attempt ceiling for items enqueued without an explicit one.
    pub max_retries: u32,

    /// Delay before the first retry, in milliseconds.
    pub base_retry_delay_ms: u64,

    /// Backoff cap (before jitter), in milliseconds.
    pub max_retry_delay_ms: u64,

    /// Maximum items drained per scheduler tick.
    pub batch_size: usize,

    /// Scheduler tick interval, in milliseconds.
    pub tick_interval_ms: u64,

    /// An in-flight item older than this (from creation) marks the queue unhealthy.
    pub stuck_threshold_secs: u64,

    /// Pending items older than this are expired by `cleanup`. Disabled when unset.
    pub pending_ttl_secs: Option<u64>,

    /// Retention used by `cleanup_default`.
    pub default_retention_days: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_retry_delay_ms: 30_000,
            max_retry_delay_ms: 3_600_000,
            batch_size: 10,
            tick_interval_ms: 1_000,
            stuck_threshold_secs: 300,
            pending_ttl_secs: None,
            default_retention_days: 7,
        }
    }
}

impl QueueConfig {
    /// Load from `NOTIQ_*` environment variables (and a `.env` file if present).
    ///
    /// Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`QueueConfig::from_env`] but reading from an arbitrary source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            max_retries: parse_var(&lookup, "NOTIQ_MAX_RETRIES", defaults.max_retries)?,
            base_retry_delay_ms: parse_var(
                &lookup,
                "NOTIQ_BASE_RETRY_DELAY_MS",
                defaults.base_retry_delay_ms,
            )?,
            max_retry_delay_ms: parse_var(
                &lookup,
                "NOTIQ_MAX_RETRY_DELAY_MS",
                defaults.max_retry_delay_ms,
            )?,
            batch_size: parse_var(&lookup, "NOTIQ_BATCH_SIZE", defaults.batch_size)?,
            tick_interval_ms: parse_var(&lookup, "NOTIQ_TICK_INTERVAL_MS", defaults.tick_interval_ms)?,
            stuck_threshold_secs: parse_var(
                &lookup,
                "NOTIQ_STUCK_THRESHOLD_SECS",
                defaults.stuck_threshold_secs,
            )?,
            pending_ttl_secs: match lookup("NOTIQ_PENDING_TTL_SECS") {
                Some(raw) => Some(parse_raw("NOTIQ_PENDING_TTL_SECS", raw)?),
                None => defaults.pending_ttl_secs,
            },
            default_retention_days: parse_var(
                &lookup,
                "NOTIQ_RETENTION_DAYS",
                defaults.default_retention_days,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the scheduler cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_retries == 0 {
            return Err(ConfigError::Invalid("max_retries must be at least 1".into()));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be at least 1".into()));
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid("tick_interval_ms must be at least 1".into()));
        }
        if self.base_retry_delay_ms > self.max_retry_delay_ms {
            return Err(ConfigError::Invalid(format!(
                "base_retry_delay_ms ({}) exceeds max_retry_delay_ms ({})",
                self.base_retry_delay_ms, self.max_retry_delay_ms
            )));
        }
        Ok(())
    }

    pub fn base_retry_delay(&self) -> Duration {
        Duration::from_millis(self.base_retry_delay_ms)
    }

    pub fn max_retry_delay(&self) -> Duration {
        Duration::from_millis(self.max_retry_delay_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn stuck_threshold(&self) -> Duration {
        Duration::from_secs(self.stuck_threshold_secs)
    }

    pub fn pending_ttl(&self) -> Option<Duration> {
        self.pending_ttl_secs.map(Duration::from_secs)
    }
}

fn parse_var<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(var) {
        Some(raw) => parse_raw(var, raw),
        None => Ok(default),
    }
}

fn parse_raw<T: FromStr>(var: &'static str, raw: String) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::InvalidVar { var, value: raw })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let config = QueueConfig::default();
        config.validate().unwrap();
        assert_eq!(config.stuck_threshold(), Duration::from_secs(300));
        assert_eq!(config.default_retention_days, 7);
        assert!(config.pending_ttl().is_none());
    }

    #[test]
    fn empty_lookup_yields_defaults() {
        let config = QueueConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, QueueConfig::default());
    }

    #[test]
    fn overrides_are_parsed() {
        let config = QueueConfig::from_lookup(lookup_from(&[
            ("NOTIQ_MAX_RETRIES", "5"),
            ("NOTIQ_BATCH_SIZE", " 25 "),
            ("NOTIQ_PENDING_TTL_SECS", "86400"),
        ]))
        .unwrap();
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.pending_ttl(), Some(Duration::from_secs(86_400)));
    }

    #[test]
    fn bad_value_names_the_variable() {
        let err = QueueConfig::from_lookup(lookup_from(&[("NOTIQ_TICK_INTERVAL_MS", "soon")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidVar { var: "NOTIQ_TICK_INTERVAL_MS", .. }
        ));
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let err = QueueConfig::from_lookup(lookup_from(&[("NOTIQ_BATCH_SIZE", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn inverted_delays_are_rejected() {
        let config = QueueConfig {
            base_retry_delay_ms: 10_000,
            max_retry_delay_ms: 1_000,
            ..QueueConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn deserializes_with_partial_fields() {
        let config: QueueConfig = serde_json::from_str(r#"{"batch_size": 50}"#).unwrap();
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.max_retries, 3);
    }
}
