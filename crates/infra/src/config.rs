//! Runtime configuration.
//!
//! Every knob has a default; `RuntimeConfig::from_env` overrides the defaults from
//! `EVENTIDE_*` environment variables.

use std::time::Duration;

use thiserror::Error;

pub const ENV_IDLE_TIMEOUT_MS: &str = "EVENTIDE_IDLE_TIMEOUT_MS";
pub const ENV_DELIVERY_MAX_ATTEMPTS: &str = "EVENTIDE_DELIVERY_MAX_ATTEMPTS";
pub const ENV_DELIVERY_BACKOFF_MS: &str = "EVENTIDE_DELIVERY_BACKOFF_MS";
pub const ENV_DELIVERY_MAX_BACKOFF_MS: &str = "EVENTIDE_DELIVERY_MAX_BACKOFF_MS";
pub const ENV_WORKER_TICK_MS: &str = "EVENTIDE_WORKER_TICK_MS";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key}: expected a non-negative integer, got '{value}'")]
    InvalidNumber { key: &'static str, value: String },

    #[error("{key}: must be at least {min}")]
    TooSmall { key: &'static str, min: u64 },
}

/// Retry policy for failed deliveries to projections and actions.
///
/// Backoff doubles from `initial_backoff` after every failed attempt, capped at
/// `max_backoff`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// No retries: one attempt, no sleeping.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Evict an entity instance after this long without commands. `None` keeps
    /// instances alive until shutdown.
    pub idle_timeout: Option<Duration>,
    pub delivery: RetryPolicy,
    /// How often consumer workers wake up to check for shutdown.
    pub worker_tick: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Some(Duration::from_secs(5 * 60)),
            delivery: RetryPolicy::default(),
            worker_tick: Duration::from_millis(250),
        }
    }
}

impl RuntimeConfig {
    pub fn with_idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn with_delivery(mut self, delivery: RetryPolicy) -> Self {
        self.delivery = delivery;
        self
    }

    pub fn with_worker_tick(mut self, worker_tick: Duration) -> Self {
        self.worker_tick = worker_tick;
        self
    }

    /// Defaults overridden by `EVENTIDE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading values through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(ms) = read_u64(&lookup, ENV_IDLE_TIMEOUT_MS)? {
            config.idle_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }
        if let Some(n) = read_u64(&lookup, ENV_DELIVERY_MAX_ATTEMPTS)? {
            if n == 0 {
                return Err(ConfigError::TooSmall {
                    key: ENV_DELIVERY_MAX_ATTEMPTS,
                    min: 1,
                });
            }
            config.delivery.max_attempts = u32::try_from(n).unwrap_or(u32::MAX);
        }
        if let Some(ms) = read_u64(&lookup, ENV_DELIVERY_BACKOFF_MS)? {
            config.delivery.initial_backoff = Duration::from_millis(ms);
        }
        if let Some(ms) = read_u64(&lookup, ENV_DELIVERY_MAX_BACKOFF_MS)? {
            config.delivery.max_backoff = Duration::from_millis(ms);
        }
        if let Some(ms) = read_u64(&lookup, ENV_WORKER_TICK_MS)? {
            if ms == 0 {
                return Err(ConfigError::TooSmall {
                    key: ENV_WORKER_TICK_MS,
                    min: 1,
                });
            }
            config.worker_tick = Duration::from_millis(ms);
        }

        Ok(config)
    }
}

fn read_u64(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<u64>, ConfigError> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { key, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = RuntimeConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert_eq!(config.idle_timeout, Some(Duration::from_secs(300)));
    }

    #[test]
    fn overrides_are_read() {
        let config = RuntimeConfig::from_lookup(lookup(&[
            (ENV_IDLE_TIMEOUT_MS, "0"),
            (ENV_DELIVERY_MAX_ATTEMPTS, "3"),
            (ENV_DELIVERY_BACKOFF_MS, "10"),
            (ENV_WORKER_TICK_MS, "20"),
        ]))
        .unwrap();
        assert_eq!(config.idle_timeout, None);
        assert_eq!(config.delivery.max_attempts, 3);
        assert_eq!(config.delivery.initial_backoff, Duration::from_millis(10));
        assert_eq!(config.worker_tick, Duration::from_millis(20));
    }

    #[test]
    fn malformed_values_are_errors() {
        let err = RuntimeConfig::from_lookup(lookup(&[(ENV_DELIVERY_BACKOFF_MS, "soon")]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidNumber {
                key: ENV_DELIVERY_BACKOFF_MS,
                value: "soon".to_string()
            }
        );
        assert!(RuntimeConfig::from_lookup(lookup(&[(ENV_DELIVERY_MAX_ATTEMPTS, "0")])).is_err());
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_for(1), Duration::from_millis(50));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(10), Duration::from_secs(2));
        assert_eq!(policy.backoff_for(40), Duration::from_secs(2));
    }
}
