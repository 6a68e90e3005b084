// src/test_utils.rs

use crate::clock::epoch_secs;
use crate::error::{Result, StoreError, ThrottleError};
use crate::limiters::{RateLimitDecision, RateLimiter};
use crate::store::{AtomicProcedure, AtomicStore, StoreValue};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Sleep until shortly after the next aligned window boundary, so a
/// burst of test requests lands inside a single window
pub async fn align_to_window(window_secs: u64) {
    let now = epoch_secs();
    let next_boundary = (now as u64 / window_secs + 1) * window_secs;
    let pause = next_boundary as f64 - now + 0.05;
    tokio::time::sleep(Duration::from_secs_f64(pause)).await;
}

/// Store that fails every operation, for failure-policy tests
#[derive(Debug, Clone, Default)]
pub struct FailingStore;

fn offline() -> ThrottleError {
    ThrottleError::Store(StoreError::RedisConnection("store offline".to_string()))
}

#[async_trait]
impl AtomicStore for FailingStore {
    async fn execute(
        &self,
        _procedure: AtomicProcedure,
        _keys: &[String],
        _args: &[StoreValue],
    ) -> Result<Vec<StoreValue>> {
        Err(offline())
    }

    async fn get(&self, _key: &str) -> Result<Option<i64>> {
        Err(offline())
    }

    async fn increment_by(&self, _key: &str, _amount: i64) -> Result<i64> {
        Err(offline())
    }

    async fn expire(&self, _key: &str, _ttl: Duration) -> Result<bool> {
        Err(offline())
    }

    async fn delete(&self, _key: &str) -> Result<bool> {
        Err(offline())
    }

    async fn sorted_remove_range_by_score(&self, _key: &str, _min: f64, _max: f64) -> Result<u64> {
        Err(offline())
    }

    async fn sorted_cardinality(&self, _key: &str) -> Result<u64> {
        Err(offline())
    }

    async fn sorted_add(&self, _key: &str, _member: &str, _score: f64) -> Result<()> {
        Err(offline())
    }

    async fn sorted_range(&self, _key: &str, _start: i64, _stop: i64) -> Result<Vec<(String, f64)>> {
        Err(offline())
    }
}

/// Scripted tier for composition tests: always admits or always rejects,
/// counting decisions and rollbacks
#[derive(Debug)]
pub struct StubTier {
    allow: bool,
    remaining: u64,
    supports_rollback: bool,
    pub decides: AtomicU64,
    pub rollbacks: AtomicU64,
}

impl StubTier {
    pub fn admitting(remaining: u64) -> Self {
        Self {
            allow: true,
            remaining,
            supports_rollback: true,
            decides: AtomicU64::new(0),
            rollbacks: AtomicU64::new(0),
        }
    }

    pub fn rejecting() -> Self {
        Self {
            allow: false,
            remaining: 0,
            supports_rollback: true,
            decides: AtomicU64::new(0),
            rollbacks: AtomicU64::new(0),
        }
    }

    pub fn without_rollback(mut self) -> Self {
        self.supports_rollback = false;
        self
    }
}

#[async_trait]
impl RateLimiter for StubTier {
    async fn decide(&self, _cost: u64) -> Result<RateLimitDecision> {
        self.decides.fetch_add(1, Ordering::SeqCst);
        Ok(RateLimitDecision {
            allowed: self.allow,
            limit: 100,
            remaining: if self.allow { self.remaining } else { 0 },
            reset_at: RateLimitDecision::NO_RESET,
            retry_after: None,
        })
    }

    async fn reset(&self) -> Result<()> {
        Ok(())
    }

    async fn rollback(&self, _cost: u64) -> Result<()> {
        if !self.supports_rollback {
            return Err(ThrottleError::RollbackUnsupported);
        }
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
