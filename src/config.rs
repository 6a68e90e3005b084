// src/config.rs

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, ThrottleError};

/// Configuration for the token bucket algorithm
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenBucketConfig {
    /// Capacity of the token bucket
    pub capacity: u64,

    /// Rate at which tokens are refilled (tokens per second)
    pub refill_rate: f64,
}

impl TokenBucketConfig {
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(ThrottleError::Config(
                "token bucket capacity must be positive".to_string(),
            ));
        }
        if !(self.refill_rate > 0.0) {
            return Err(ThrottleError::Config(
                "token bucket refill_rate must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration for the leaky bucket algorithm
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeakyBucketConfig {
    /// Maximum queue size
    pub capacity: u64,

    /// Rate at which queued items drain (items per second)
    pub leak_rate: f64,
}

impl LeakyBucketConfig {
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(ThrottleError::Config(
                "leaky bucket capacity must be positive".to_string(),
            ));
        }
        if !(self.leak_rate > 0.0) {
            return Err(ThrottleError::Config(
                "leaky bucket leak_rate must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration for the fixed window algorithm
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixedWindowConfig {
    /// Maximum admitted cost per window
    pub limit: u64,

    /// Window duration
    #[serde(with = "duration_serde")]
    pub window: Duration,
}

impl FixedWindowConfig {
    pub fn validate(&self) -> Result<()> {
        validate_window("fixed window", self.limit, self.window)
    }
}

/// Configuration shared by the sliding window log and sliding window
/// counter algorithms
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlidingWindowConfig {
    /// Maximum admitted cost within the trailing window
    pub limit: u64,

    /// Window duration
    #[serde(with = "duration_serde")]
    pub window: Duration,
}

impl SlidingWindowConfig {
    pub fn validate(&self) -> Result<()> {
        validate_window("sliding window", self.limit, self.window)
    }
}

fn validate_window(kind: &str, limit: u64, window: Duration) -> Result<()> {
    if limit == 0 {
        return Err(ThrottleError::Config(format!(
            "{} limit must be positive",
            kind
        )));
    }
    if window.as_secs() == 0 {
        return Err(ThrottleError::Config(format!(
            "{} size must be at least one second",
            kind
        )));
    }
    Ok(())
}

/// Configuration for the concurrent-requests limiter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    /// Maximum simultaneously in-flight cost
    pub max_concurrent: u64,
}

impl ConcurrencyConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent == 0 {
            return Err(ThrottleError::Config(
                "max_concurrent must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration for the Redis store backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL
    pub url: String,

    /// Connection timeout
    #[serde(default = "default_conn_timeout", with = "duration_serde")]
    pub connection_timeout: Duration,
}

fn default_conn_timeout() -> Duration {
    Duration::from_secs(2)
}

/// What a distributed limiter does when the shared store is unreachable
/// or the atomic procedure errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Surface the store error to the caller (reject). The default.
    #[default]
    FailClosed,

    /// Log a warning and admit the request as if capacity were available
    FailOpen,
}

/// Key under which a distributed limiter keeps its state:
/// `{prefix}:{identifier}`, with per-window suffixes appended by the
/// windowed variants. `identifier` namespaces independent subjects
/// (per-user, per-API-key, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterKey {
    #[serde(default = "default_key_prefix")]
    pub prefix: String,
    pub identifier: String,
}

fn default_key_prefix() -> String {
    "rate_limit".to_string()
}

impl LimiterKey {
    /// Key with the default `rate_limit` prefix
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            prefix: default_key_prefix(),
            identifier: identifier.into(),
        }
    }

    pub fn with_prefix(prefix: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            identifier: identifier.into(),
        }
    }

    /// Base key, without any window suffix
    pub fn base(&self) -> String {
        format!("{}:{}", self.prefix, self.identifier)
    }

    /// Key for one aligned window
    pub fn for_window(&self, window_start: u64) -> String {
        format!("{}:{}:{}", self.prefix, self.identifier, window_start)
    }
}

// Helper module to serialize/deserialize Duration with serde
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
