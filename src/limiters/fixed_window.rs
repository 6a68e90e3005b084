// src/limiters/fixed_window.rs

use crate::clock::{duration_from_secs, epoch_secs, system_time_from_secs, window_start};
use crate::config::FixedWindowConfig;
use crate::error::Result;
use crate::limiters::{validate_cost, RateLimitDecision, RateLimiter};
use async_trait::async_trait;
use std::sync::Mutex;

/// Fixed window counter: admissions are counted in non-overlapping windows
/// aligned to multiples of the window size since the epoch, and the count
/// resets on rollover.
///
/// Known boundary weakness, kept by design: up to twice the limit can be
/// admitted across a window edge if requests are timed at both sides of
/// it. Callers needing strict trailing-window bounds should use
/// [`SlidingWindowCounterLimiter`](crate::limiters::SlidingWindowCounterLimiter).
#[derive(Debug)]
pub struct FixedWindowLimiter {
    config: FixedWindowConfig,
    state: Mutex<WindowState>,
}

#[derive(Debug)]
struct WindowState {
    window_start: u64,
    count: u64,
}

impl FixedWindowLimiter {
    pub fn new(config: FixedWindowConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            state: Mutex::new(WindowState {
                window_start: 0,
                count: 0,
            }),
        })
    }

    fn window_secs(&self) -> u64 {
        self.config.window.as_secs()
    }
}

#[async_trait]
impl RateLimiter for FixedWindowLimiter {
    async fn decide(&self, cost: u64) -> Result<RateLimitDecision> {
        validate_cost(cost)?;

        let mut state = self.state.lock().unwrap();
        let now = epoch_secs();
        let current = window_start(now, self.window_secs());

        if current != state.window_start {
            state.window_start = current;
            state.count = 0;
        }

        let window_end = (state.window_start + self.window_secs()) as f64;
        // checked_add keeps an absurdly large cost a plain rejection
        let admit = state
            .count
            .checked_add(cost)
            .is_some_and(|total| total <= self.config.limit);
        let decision = if admit {
            state.count += cost;
            RateLimitDecision {
                allowed: true,
                limit: self.config.limit,
                remaining: self.config.limit - state.count,
                reset_at: system_time_from_secs(window_end),
                retry_after: None,
            }
        } else {
            RateLimitDecision {
                allowed: false,
                limit: self.config.limit,
                remaining: 0,
                reset_at: system_time_from_secs(window_end),
                retry_after: Some(duration_from_secs(window_end - now)),
            }
        };

        crate::decision_event!("fixed_window", cost, decision.allowed, decision.remaining);
        Ok(decision)
    }

    async fn reset(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.window_start = window_start(epoch_secs(), self.window_secs());
        state.count = 0;
        Ok(())
    }

    async fn rollback(&self, cost: u64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.count = state.count.saturating_sub(cost);
        Ok(())
    }
}
