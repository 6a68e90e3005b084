// library entry
pub mod clock;
pub mod config;
pub mod distributed;
pub mod enforce;
pub mod error;
pub mod limiters;
pub mod logging;
pub mod store;

#[cfg(test)]
pub(crate) mod test_utils;

// Re-export key components for convenience
pub use config::{FailurePolicy, LimiterKey};
pub use distributed::{
    DistributedFixedWindowLimiter, DistributedSlidingWindowCounterLimiter,
    DistributedSlidingWindowLogLimiter, DistributedTokenBucketLimiter,
};
pub use enforce::{EnforceError, RateLimitExceeded};
pub use error::{Result, StoreError, ThrottleError};
pub use limiters::{
    ConcurrencyLimiter, FixedWindowLimiter, LeakyBucketLimiter, MultiTierLimiter,
    RateLimitDecision, RateLimiter, SlidingWindowCounterLimiter, SlidingWindowLogLimiter,
    TokenBucketLimiter,
};
pub use logging::init as init_logging;
pub use store::{AtomicStore, MemoryStore, RedisStore};
