// src/limiters/token_bucket.rs

use crate::clock::{duration_from_secs, epoch_secs, system_time_from_secs};
use crate::config::TokenBucketConfig;
use crate::error::Result;
use crate::limiters::{validate_cost, RateLimitDecision, RateLimiter};
use async_trait::async_trait;
use std::sync::Mutex;

/// Token bucket: a reservoir refilled continuously at `refill_rate`
/// tokens/second up to `capacity`. Each admission consumes its cost in
/// tokens, so bursts up to the full capacity are allowed.
#[derive(Debug)]
pub struct TokenBucketLimiter {
    config: TokenBucketConfig,
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    /// Real-valued so fractional refill accumulates between decisions
    tokens: f64,
    last_refill: f64,
}

impl BucketState {
    fn refill(&mut self, now: f64, config: &TokenBucketConfig) {
        let elapsed = (now - self.last_refill).max(0.0);
        self.tokens = (self.tokens + elapsed * config.refill_rate).min(config.capacity as f64);
        self.last_refill = now;
    }
}

impl TokenBucketLimiter {
    pub fn new(config: TokenBucketConfig) -> Result<Self> {
        config.validate()?;
        let state = Mutex::new(BucketState {
            tokens: config.capacity as f64,
            last_refill: epoch_secs(),
        });
        Ok(Self { config, state })
    }
}

#[async_trait]
impl RateLimiter for TokenBucketLimiter {
    async fn decide(&self, cost: u64) -> Result<RateLimitDecision> {
        validate_cost(cost)?;

        let mut state = self.state.lock().unwrap();
        let now = epoch_secs();
        state.refill(now, &self.config);

        let decision = if state.tokens >= cost as f64 {
            state.tokens -= cost as f64;
            RateLimitDecision {
                allowed: true,
                limit: self.config.capacity,
                remaining: state.tokens as u64,
                reset_at: system_time_from_secs(
                    now + (self.config.capacity as f64 - state.tokens) / self.config.refill_rate,
                ),
                retry_after: None,
            }
        } else {
            // Rejection leaves the bucket untouched beyond the refill
            let retry_after = (cost as f64 - state.tokens) / self.config.refill_rate;
            RateLimitDecision {
                allowed: false,
                limit: self.config.capacity,
                remaining: 0,
                reset_at: system_time_from_secs(now + retry_after),
                retry_after: Some(duration_from_secs(retry_after)),
            }
        };

        crate::decision_event!("token_bucket", cost, decision.allowed, decision.remaining);
        Ok(decision)
    }

    async fn reset(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.tokens = self.config.capacity as f64;
        state.last_refill = epoch_secs();
        Ok(())
    }

    async fn rollback(&self, cost: u64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.tokens = (state.tokens + cost as f64).min(self.config.capacity as f64);
        Ok(())
    }
}
