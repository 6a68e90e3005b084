// src/limiters/sliding_window_counter.rs

use crate::clock::{duration_from_secs, epoch_secs, system_time_from_secs, window_start};
use crate::config::SlidingWindowConfig;
use crate::error::Result;
use crate::limiters::{validate_cost, RateLimitDecision, RateLimiter};
use async_trait::async_trait;
use std::sync::Mutex;

/// Sliding window counter: approximates the sliding log with O(1) state by
/// tracking the current aligned window and the one before it. Occupancy is
/// estimated as `previous.count * overlap + current.count`, where the
/// overlap fraction is how much of the previous window still falls inside
/// the trailing view.
#[derive(Debug)]
pub struct SlidingWindowCounterLimiter {
    config: SlidingWindowConfig,
    state: Mutex<CounterState>,
}

#[derive(Debug, Clone, Copy)]
struct WindowCount {
    start: u64,
    count: u64,
}

#[derive(Debug)]
struct CounterState {
    current: WindowCount,
    previous: WindowCount,
}

impl SlidingWindowCounterLimiter {
    pub fn new(config: SlidingWindowConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            state: Mutex::new(CounterState {
                current: WindowCount { start: 0, count: 0 },
                previous: WindowCount { start: 0, count: 0 },
            }),
        })
    }

    fn window_secs(&self) -> u64 {
        self.config.window.as_secs()
    }

    fn estimate(&self, state: &CounterState, now: f64) -> f64 {
        let elapsed = now - state.current.start as f64;
        let overlap = ((self.window_secs() as f64 - elapsed) / self.window_secs() as f64).max(0.0);
        state.previous.count as f64 * overlap + state.current.count as f64
    }
}

#[async_trait]
impl RateLimiter for SlidingWindowCounterLimiter {
    async fn decide(&self, cost: u64) -> Result<RateLimitDecision> {
        validate_cost(cost)?;

        let mut state = self.state.lock().unwrap();
        let now = epoch_secs();
        let current = window_start(now, self.window_secs());

        if current != state.current.start {
            // Rollover: the old current becomes previous, previous is
            // discarded rather than summed
            state.previous = state.current;
            state.current = WindowCount {
                start: current,
                count: 0,
            };
        }

        let estimate = self.estimate(&state, now);
        let window_end = (state.current.start + self.window_secs()) as f64;

        let decision = if estimate + cost as f64 <= self.config.limit as f64 {
            state.current.count += cost;
            let remaining = (self.config.limit as f64 - estimate - cost as f64).max(0.0);
            RateLimitDecision {
                allowed: true,
                limit: self.config.limit,
                remaining: remaining as u64,
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

        crate::decision_event!(
            "sliding_window_counter",
            cost,
            decision.allowed,
            decision.remaining
        );
        Ok(decision)
    }

    async fn reset(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.current = WindowCount {
            start: window_start(epoch_secs(), self.window_secs()),
            count: 0,
        };
        state.previous = WindowCount { start: 0, count: 0 };
        Ok(())
    }

    async fn rollback(&self, cost: u64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.current.count = state.current.count.saturating_sub(cost);
        Ok(())
    }
}
