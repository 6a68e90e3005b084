// src/enforce.rs

// Caller-facing enforcement wrapper. The core only ever returns a
// decision and never raises on rejection; callers that want a rejection
// to surface as an error (to bubble through `?` into a handler, map to
// an HTTP 429, ...) go through `require` instead.

use crate::limiters::{RateLimitDecision, RateLimiter};
use thiserror::Error;

/// Raised by [`require`] when the limiter rejects; carries the full
/// decision so the caller can report `retry_after` and `reset_at`
#[derive(Debug, Error)]
#[error("rate limit exceeded: retry after {:?}", .decision.retry_after)]
pub struct RateLimitExceeded {
    pub decision: RateLimitDecision,
}

/// Failure modes of an enforced decision
#[derive(Debug, Error)]
pub enum EnforceError {
    /// The limiter itself failed (configuration, invalid cost, store)
    #[error(transparent)]
    Limiter(#[from] crate::error::ThrottleError),

    /// A well-formed rejection, promoted to an error
    #[error(transparent)]
    Exceeded(#[from] RateLimitExceeded),
}

/// Decide `cost` units against `limiter`, turning a rejection into
/// [`RateLimitExceeded`]
pub async fn require<L>(limiter: &L, cost: u64) -> Result<RateLimitDecision, EnforceError>
where
    L: RateLimiter + ?Sized,
{
    let decision = limiter.decide(cost).await?;
    if decision.allowed {
        Ok(decision)
    } else {
        Err(RateLimitExceeded { decision }.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FixedWindowConfig;
    use crate::limiters::FixedWindowLimiter;
    use std::time::Duration;

    #[tokio::test]
    async fn admits_then_raises_on_rejection() {
        let limiter = FixedWindowLimiter::new(FixedWindowConfig {
            limit: 2,
            window: Duration::from_secs(60),
        })
        .unwrap();

        assert!(require(&limiter, 1).await.is_ok());
        assert!(require(&limiter, 1).await.is_ok());

        match require(&limiter, 1).await {
            Err(EnforceError::Exceeded(e)) => {
                assert!(!e.decision.allowed);
                assert_eq!(e.decision.remaining, 0);
                assert!(e.decision.retry_after.is_some());
            }
            other => panic!("expected rejection, got {:?}", other.map(|d| d.allowed)),
        }
    }

    #[tokio::test]
    async fn invalid_cost_is_a_limiter_error_not_a_rejection() {
        let limiter = FixedWindowLimiter::new(FixedWindowConfig {
            limit: 2,
            window: Duration::from_secs(60),
        })
        .unwrap();

        match require(&limiter, 0).await {
            Err(EnforceError::Limiter(_)) => {}
            other => panic!("expected limiter error, got {:?}", other.map(|d| d.allowed)),
        }
    }
}
