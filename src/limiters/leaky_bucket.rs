// src/limiters/leaky_bucket.rs

use crate::clock::{duration_from_secs, epoch_secs, system_time_from_secs};
use crate::config::LeakyBucketConfig;
use crate::error::Result;
use crate::limiters::{validate_cost, RateLimitDecision, RateLimiter};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Leaky bucket: a FIFO queue of outstanding work draining at `leak_rate`
/// items/second. Enqueuing past `capacity` is rejected, so output is
/// strictly smoothed with no bursting.
#[derive(Debug)]
pub struct LeakyBucketLimiter {
    config: LeakyBucketConfig,
    state: Mutex<QueueState>,
}

#[derive(Debug)]
struct QueueState {
    queue: VecDeque<f64>,
    last_leak: f64,
}

impl QueueState {
    fn leak(&mut self, now: f64, config: &LeakyBucketConfig) {
        let elapsed = (now - self.last_leak).max(0.0);
        // Whole items only; the fractional remainder is discarded with
        // last_leak advancing to now
        let leaked = ((elapsed * config.leak_rate) as u64).min(self.queue.len() as u64);
        for _ in 0..leaked {
            self.queue.pop_front();
        }
        self.last_leak = now;
    }
}

impl LeakyBucketLimiter {
    pub fn new(config: LeakyBucketConfig) -> Result<Self> {
        config.validate()?;
        let state = Mutex::new(QueueState {
            queue: VecDeque::new(),
            last_leak: epoch_secs(),
        });
        Ok(Self { config, state })
    }
}

#[async_trait]
impl RateLimiter for LeakyBucketLimiter {
    async fn decide(&self, cost: u64) -> Result<RateLimitDecision> {
        validate_cost(cost)?;

        let mut state = self.state.lock().unwrap();
        let now = epoch_secs();
        state.leak(now, &self.config);

        let queued = state.queue.len() as u64;
        // checked_add keeps an absurdly large cost a plain rejection
        let admit = queued
            .checked_add(cost)
            .is_some_and(|total| total <= self.config.capacity);
        let decision = if admit {
            for _ in 0..cost {
                state.queue.push_back(now);
            }
            let queued = state.queue.len() as u64;
            RateLimitDecision {
                allowed: true,
                limit: self.config.capacity,
                remaining: self.config.capacity - queued,
                reset_at: system_time_from_secs(now + queued as f64 / self.config.leak_rate),
                retry_after: None,
            }
        } else {
            // Float arithmetic so the excess cannot wrap for huge costs
            let excess = queued as f64 + cost as f64 - self.config.capacity as f64;
            let retry_after = excess / self.config.leak_rate;
            RateLimitDecision {
                allowed: false,
                limit: self.config.capacity,
                remaining: 0,
                reset_at: system_time_from_secs(now + retry_after),
                retry_after: Some(duration_from_secs(retry_after)),
            }
        };

        crate::decision_event!("leaky_bucket", cost, decision.allowed, decision.remaining);
        Ok(decision)
    }

    async fn reset(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.queue.clear();
        state.last_leak = epoch_secs();
        Ok(())
    }

    async fn rollback(&self, cost: u64) -> Result<()> {
        // Undo the most recent enqueues
        let mut state = self.state.lock().unwrap();
        for _ in 0..cost {
            if state.queue.pop_back().is_none() {
                break;
            }
        }
        Ok(())
    }
}
