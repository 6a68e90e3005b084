// src/limiters/concurrency.rs

use crate::config::ConcurrencyConfig;
use crate::error::{Result, ThrottleError};
use crate::limiters::{validate_cost, RateLimitDecision, RateLimiter};
use async_trait::async_trait;
use std::sync::Mutex;
use tokio::sync::Notify;

/// Concurrent-requests limiter: bounds simultaneously in-flight work
/// rather than a rate. There is no time dimension, so `reset_at` is the
/// [`RateLimitDecision::NO_RESET`] sentinel and `retry_after` is `None`
/// on rejection; availability returns only when a caller releases.
#[derive(Debug)]
pub struct ConcurrencyLimiter {
    config: ConcurrencyConfig,
    active: Mutex<u64>,
    released: Notify,
}

impl ConcurrencyLimiter {
    pub fn new(config: ConcurrencyConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            active: Mutex::new(0),
            released: Notify::new(),
        })
    }

    /// Return `cost` units when the work they covered completes. Floors at
    /// zero, so calling more times than matching admissions is harmless.
    /// Wakes any callers blocked in [`acquire`](Self::acquire).
    pub fn release(&self, cost: u64) {
        let mut active = self.active.lock().unwrap();
        *active = active.saturating_sub(cost);
        self.released.notify_waiters();
    }

    /// Blocking form of `decide`: waits for capacity instead of rejecting.
    /// Layered over the non-blocking decision, with a wakeup on every
    /// release. A cost above `max_concurrent` can never be admitted and is
    /// an invalid call; waiting for it would hang forever.
    pub async fn acquire(&self, cost: u64) -> Result<RateLimitDecision> {
        validate_cost(cost)?;
        if cost > self.config.max_concurrent {
            return Err(ThrottleError::InvalidCost(cost));
        }
        loop {
            // Register before checking so a release between the check and
            // the await is not missed
            let released = self.released.notified();
            let decision = self.decide(cost).await?;
            if decision.allowed {
                return Ok(decision);
            }
            released.await;
        }
    }
}

#[async_trait]
impl RateLimiter for ConcurrencyLimiter {
    async fn decide(&self, cost: u64) -> Result<RateLimitDecision> {
        validate_cost(cost)?;

        let mut active = self.active.lock().unwrap();
        // checked_add keeps an absurdly large cost a plain rejection
        let admit = active
            .checked_add(cost)
            .is_some_and(|total| total <= self.config.max_concurrent);
        let decision = if admit {
            *active += cost;
            RateLimitDecision {
                allowed: true,
                limit: self.config.max_concurrent,
                remaining: self.config.max_concurrent - *active,
                reset_at: RateLimitDecision::NO_RESET,
                retry_after: None,
            }
        } else {
            RateLimitDecision {
                allowed: false,
                limit: self.config.max_concurrent,
                remaining: 0,
                reset_at: RateLimitDecision::NO_RESET,
                retry_after: None,
            }
        };

        crate::decision_event!("concurrency", cost, decision.allowed, decision.remaining);
        Ok(decision)
    }

    async fn reset(&self) -> Result<()> {
        *self.active.lock().unwrap() = 0;
        self.released.notify_waiters();
        Ok(())
    }

    async fn rollback(&self, cost: u64) -> Result<()> {
        self.release(cost);
        Ok(())
    }
}
