// src/distributed/sliding_window_log.rs

use crate::clock::{duration_from_secs, epoch_secs, system_time_from_secs};
use crate::config::{FailurePolicy, LimiterKey, SlidingWindowConfig};
use crate::distributed::fail_open_decision;
use crate::error::Result;
use crate::limiters::{validate_cost, RateLimitDecision, RateLimiter};
use crate::store::{expect_reply, AtomicProcedure, AtomicStore, StoreValue};
use async_trait::async_trait;
use std::time::Duration;

/// Sliding window log in the shared store, kept as one ordered set per
/// identifier: members are admitted-request markers scored by timestamp.
/// Eviction, count and append run inside one atomic procedure. The set
/// expires after one window of inactivity.
///
/// This variant cannot undo an admission, so it keeps the default
/// `rollback` (unsupported) and is not usable as a composed tier.
#[derive(Debug)]
pub struct DistributedSlidingWindowLogLimiter<S>
where
    S: AtomicStore,
{
    store: S,
    key: LimiterKey,
    config: SlidingWindowConfig,
    policy: FailurePolicy,
}

impl<S> DistributedSlidingWindowLogLimiter<S>
where
    S: AtomicStore,
{
    pub fn new(store: S, key: LimiterKey, config: SlidingWindowConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            key,
            config,
            policy: FailurePolicy::FailClosed,
        })
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    fn window_secs(&self) -> f64 {
        self.config.window.as_secs_f64()
    }
}

#[async_trait]
impl<S> RateLimiter for DistributedSlidingWindowLogLimiter<S>
where
    S: AtomicStore,
{
    async fn decide(&self, cost: u64) -> Result<RateLimitDecision> {
        validate_cost(cost)?;

        let now = epoch_secs();

        // A cost beyond the limit can never be admitted. Reject before the
        // store round trip; the wire encoding is i64 and must never see an
        // out-of-range cost. Zero retry mirrors the empty-log rejection:
        // no retained entry is what stands in the way.
        if cost > self.config.limit {
            let decision = RateLimitDecision {
                allowed: false,
                limit: self.config.limit,
                remaining: 0,
                reset_at: system_time_from_secs(now),
                retry_after: Some(Duration::ZERO),
            };
            crate::decision_event!(
                "distributed_sliding_window_log",
                cost,
                decision.allowed,
                decision.remaining
            );
            return Ok(decision);
        }

        let keys = [self.key.base()];
        let args = [
            StoreValue::Float(self.window_secs()),
            StoreValue::Int(self.config.limit as i64),
            StoreValue::Int(cost as i64),
            StoreValue::Float(now),
        ];

        let reply = match self
            .store
            .execute(AtomicProcedure::SlidingLogTake, &keys, &args)
            .await
        {
            Ok(reply) => expect_reply(AtomicProcedure::SlidingLogTake, reply, 3)?,
            Err(e) => match self.policy {
                FailurePolicy::FailClosed => return Err(e),
                FailurePolicy::FailOpen => {
                    tracing::warn!(
                        key = %keys[0],
                        error = %e,
                        "store unavailable, admitting fail-open"
                    );
                    return Ok(fail_open_decision(
                        self.config.limit,
                        cost,
                        system_time_from_secs(now + self.window_secs()),
                    ));
                }
            },
        };

        let allowed = reply[0].as_i64()? == 1;
        let count = reply[1].as_i64()?.max(0) as u64;
        let oldest = reply[2].as_f64()?;
        let oldest_expiry = (oldest >= 0.0).then(|| oldest + self.window_secs());

        let decision = if allowed {
            RateLimitDecision {
                allowed: true,
                limit: self.config.limit,
                remaining: self.config.limit.saturating_sub(count),
                reset_at: system_time_from_secs(
                    oldest_expiry.unwrap_or(now + self.window_secs()),
                ),
                retry_after: None,
            }
        } else {
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
            "distributed_sliding_window_log",
            cost,
            decision.allowed,
            decision.remaining
        );
        Ok(decision)
    }

    async fn reset(&self) -> Result<()> {
        self.store.delete(&self.key.base()).await?;
        Ok(())
    }
}
