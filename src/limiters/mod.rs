// src/limiters/mod.rs

pub mod concurrency;
pub mod fixed_window;
pub mod leaky_bucket;
pub mod multi_tier;
pub mod sliding_window_counter;
pub mod sliding_window_log;
pub mod token_bucket;

#[cfg(test)]
mod tests;

pub use concurrency::ConcurrencyLimiter;
pub use fixed_window::FixedWindowLimiter;
pub use leaky_bucket::LeakyBucketLimiter;
pub use multi_tier::MultiTierLimiter;
pub use sliding_window_counter::SlidingWindowCounterLimiter;
pub use sliding_window_log::SlidingWindowLogLimiter;
pub use token_bucket::TokenBucketLimiter;

use crate::error::{Result, ThrottleError};
use async_trait::async_trait;
use std::fmt::Debug;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Outcome of a single admission decision
#[derive(Debug, Clone)]
pub struct RateLimitDecision {
    /// Whether the request was admitted
    pub allowed: bool,

    /// The configured ceiling, in the same units as the cost argument
    pub limit: u64,

    /// Units still available after this decision; zero on rejection
    pub remaining: u64,

    /// Absolute time at which the limiter next becomes less restrictive.
    /// The concurrency limiter has no time dimension and reports
    /// [`RateLimitDecision::NO_RESET`] here.
    pub reset_at: SystemTime,

    /// Time until at least the requested cost would be admittable.
    /// Present only on rejection; `None` when indeterminate.
    pub retry_after: Option<Duration>,
}

impl RateLimitDecision {
    /// Sentinel `reset_at` for limiters without a time dimension
    pub const NO_RESET: SystemTime = UNIX_EPOCH;
}

/// Core contract that every limiter variant implements, local and
/// distributed alike.
///
/// A decision call reads the limiter's state, decides, and updates the
/// state as one indivisible step: local variants hold one exclusive lock
/// across the whole body, distributed variants delegate the same guarantee
/// to the store's atomic-execution primitive. Normal rejection is a
/// well-formed decision, never an error.
#[async_trait]
pub trait RateLimiter: Send + Sync + Debug {
    /// Decide whether `cost` units are admitted. `cost` must be positive;
    /// a cost above the configured ceiling always rejects.
    async fn decide(&self, cost: u64) -> Result<RateLimitDecision>;

    /// Reinitialize state to the construction-time baseline. Safe to call
    /// concurrently with `decide`.
    async fn reset(&self) -> Result<()>;

    /// Give back `cost` units previously consumed by an admitting
    /// `decide`, restoring state as if that call never ran. Used by
    /// multi-tier composition; variants that cannot undo a decision keep
    /// the default and composition surfaces it as an error.
    async fn rollback(&self, _cost: u64) -> Result<()> {
        Err(ThrottleError::RollbackUnsupported)
    }
}

/// Reject a zero cost before touching any state
pub(crate) fn validate_cost(cost: u64) -> Result<()> {
    if cost == 0 {
        return Err(ThrottleError::InvalidCost(cost));
    }
    Ok(())
}
