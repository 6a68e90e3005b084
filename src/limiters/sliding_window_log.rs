// src/limiters/sliding_window_log.rs

use crate::clock::{duration_from_secs, epoch_secs, system_time_from_secs};
use crate::config::SlidingWindowConfig;
use crate::error::Result;
use crate::limiters::{validate_cost, RateLimitDecision, RateLimiter};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Sliding window log: an exact ordered log of admitted-request
/// timestamps within the trailing window. Exact, but memory grows with
/// traffic volume.
#[derive(Debug)]
pub struct SlidingWindowLogLimiter {
    config: SlidingWindowConfig,
    log: Mutex<VecDeque<f64>>,
}

impl SlidingWindowLogLimiter {
    pub fn new(config: SlidingWindowConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            log: Mutex::new(VecDeque::new()),
        })
    }

    fn window_secs(&self) -> f64 {
        self.config.window.as_secs_f64()
    }
}

#[async_trait]
impl RateLimiter for SlidingWindowLogLimiter {
    async fn decide(&self, cost: u64) -> Result<RateLimitDecision> {
        validate_cost(cost)?;

        let mut log = self.log.lock().unwrap();
        let now = epoch_secs();

        // Eviction is monotonic: entries leave at the front, never return
        let cutoff = now - self.window_secs();
        while log.front().is_some_and(|&t| t <= cutoff) {
            log.pop_front();
        }

        let retained = log.len() as u64;
        // checked_add keeps an absurdly large cost a plain rejection
        let admit = retained
            .checked_add(cost)
            .is_some_and(|total| total <= self.config.limit);
        let decision = if admit {
            for _ in 0..cost {
                log.push_back(now);
            }
            let oldest_expiry = log.front().map(|&t| t + self.window_secs());
            RateLimitDecision {
                allowed: true,
                limit: self.config.limit,
                remaining: self.config.limit - log.len() as u64,
                reset_at: system_time_from_secs(
                    oldest_expiry.unwrap_or(now + self.window_secs()),
                ),
                retry_after: None,
            }
        } else {
            let oldest_expiry = log.front().map(|&t| t + self.window_secs());
            let retry_after = oldest_expiry.map_or(0.0, |e| (e - now).max(0.0));
            RateLimitDecision {
                allowed: false,
                limit: self.config.limit,
                remaining: 0,
                reset_at: system_time_from_secs(oldest_expiry.unwrap_or(now)),
                retry_after: Some(duration_from_secs(retry_after)),
            }
        };

        crate::decision_event!(
            "sliding_window_log",
            cost,
            decision.allowed,
            decision.remaining
        );
        Ok(decision)
    }

    async fn reset(&self) -> Result<()> {
        self.log.lock().unwrap().clear();
        Ok(())
    }

    async fn rollback(&self, cost: u64) -> Result<()> {
        let mut log = self.log.lock().unwrap();
        for _ in 0..cost {
            if log.pop_back().is_none() {
                break;
            }
        }
        Ok(())
    }
}
