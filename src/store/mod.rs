// src/store/mod.rs

pub mod memory;
pub mod redis;


pub use memory::MemoryStore;
pub use redis::RedisStore;

use crate::error::{Result, StoreError, ThrottleError};
use async_trait::async_trait;
use std::fmt::Debug;
use std::time::Duration;

/// The fixed read-modify-write programs a store must be able to run as a
/// single atomic unit. Two concurrent executions against the same key
/// behave as if serialized, regardless of which process issued them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AtomicProcedure {
    /// keys: `[bucket]`; args: `[capacity, refill_rate, cost, now]`
    /// reply: `[allowed, tokens_floor, retry_after_secs]`
    TokenBucketTake,

    /// keys: `[bucket]`; args: `[capacity, amount, now]`
    /// reply: `[tokens_floor]`
    TokenBucketRefund,

    /// keys: `[window_counter]`; args: `[limit, cost, ttl_secs]`
    /// reply: `[allowed, count_after]`
    FixedWindowTake,

    /// keys: `[window_counter]`; args: `[amount]`
    /// reply: `[count_after]`. Decrements only an existing counter,
    /// flooring at zero and leaving its TTL untouched; a refund for an
    /// expired or rolled-over window is a no-op, never a fresh key.
    WindowRefund,

    /// keys: `[current_counter, previous_counter]`;
    /// args: `[window_secs, limit, cost, now, window_start]`
    /// reply: `[allowed, remaining, estimate]`
    SlidingCounterTake,

    /// keys: `[log]`; args: `[window_secs, limit, cost, now]`
    /// reply: `[allowed, count_after, oldest_score_or_minus_one]`
    SlidingLogTake,
}

/// Scalar value passed to and returned from atomic procedures
#[derive(Debug, Clone, PartialEq)]
pub enum StoreValue {
    Int(i64),
    Float(f64),
    Text(String),
    Nil,
}

impl StoreValue {
    pub fn as_i64(&self) -> Result<i64> {
        match self {
            StoreValue::Int(v) => Ok(*v),
            StoreValue::Float(v) => Ok(*v as i64),
            StoreValue::Text(s) => s.parse::<i64>().map_err(|_| {
                ThrottleError::Store(StoreError::UnexpectedReply(format!(
                    "expected integer, got {:?}",
                    s
                )))
            }),
            StoreValue::Nil => Ok(0),
        }
    }

    pub fn as_f64(&self) -> Result<f64> {
        match self {
            StoreValue::Int(v) => Ok(*v as f64),
            StoreValue::Float(v) => Ok(*v),
            StoreValue::Text(s) => s.parse::<f64>().map_err(|_| {
                ThrottleError::Store(StoreError::UnexpectedReply(format!(
                    "expected number, got {:?}",
                    s
                )))
            }),
            StoreValue::Nil => Ok(0.0),
        }
    }
}

/// Contract consumed by the distributed limiter variants.
///
/// `execute` runs one of the fixed procedures atomically against the
/// store; the ancillary primitives cover reset, rollback and the ordered
/// set the sliding-window-log variant keeps per identifier. Any store
/// offering server-side scripting or compare-and-swap can implement this.
#[async_trait]
pub trait AtomicStore: Send + Sync + Debug {
    /// Run `procedure` as one atomic read-decide-update unit
    async fn execute(
        &self,
        procedure: AtomicProcedure,
        keys: &[String],
        args: &[StoreValue],
    ) -> Result<Vec<StoreValue>>;

    /// Read an integer counter; `None` when the key is absent
    async fn get(&self, key: &str) -> Result<Option<i64>>;

    /// Atomically add `amount` (may be negative) to a counter
    async fn increment_by(&self, key: &str, amount: i64) -> Result<i64>;

    /// Set a time-to-live on a key; `false` when the key is absent
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// Remove a key; `false` when it was absent
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Drop ordered-set members with scores in `[min, max]`
    async fn sorted_remove_range_by_score(&self, key: &str, min: f64, max: f64) -> Result<u64>;

    /// Number of members in an ordered set
    async fn sorted_cardinality(&self, key: &str) -> Result<u64>;

    /// Add a member with the given score to an ordered set
    async fn sorted_add(&self, key: &str, member: &str, score: f64) -> Result<()>;

    /// Members with scores in rank range `[start, stop]`, ascending
    async fn sorted_range(&self, key: &str, start: i64, stop: i64) -> Result<Vec<(String, f64)>>;
}

/// Decode a procedure reply, checking the element count first
pub(crate) fn expect_reply(
    procedure: AtomicProcedure,
    reply: Vec<StoreValue>,
    len: usize,
) -> Result<Vec<StoreValue>> {
    if reply.len() != len {
        return Err(ThrottleError::Store(StoreError::UnexpectedReply(format!(
            "{:?} returned {} values, expected {}",
            procedure,
            reply.len(),
            len
        ))));
    }
    Ok(reply)
}
