// src/distributed/mod.rs

// Store-backed limiter variants. Same decision semantics as their local
// counterparts, but state lives in a shared store keyed by
// `{prefix}:{identifier}[:{window_start}]`, so independent processes
// coordinate on one limit. The read-decide-update sequence runs inside a
// single atomic procedure: decisions against the same key are
// linearizable no matter which process issued them.

pub mod fixed_window;
pub mod sliding_window_counter;
pub mod sliding_window_log;
pub mod token_bucket;

#[cfg(test)]
mod tests;

pub use fixed_window::DistributedFixedWindowLimiter;
pub use sliding_window_counter::DistributedSlidingWindowCounterLimiter;
pub use sliding_window_log::DistributedSlidingWindowLogLimiter;
pub use token_bucket::DistributedTokenBucketLimiter;

use crate::limiters::RateLimitDecision;
use std::time::SystemTime;

/// Decision handed out when the store is down and the limiter is
/// configured to fail open
pub(crate) fn fail_open_decision(limit: u64, cost: u64, reset_at: SystemTime) -> RateLimitDecision {
    RateLimitDecision {
        allowed: true,
        limit,
        remaining: limit.saturating_sub(cost),
        reset_at,
        retry_after: None,
    }
}
