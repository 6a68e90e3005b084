// src/distributed/token_bucket.rs

use crate::clock::{duration_from_secs, epoch_secs, system_time_from_secs};
use crate::config::{FailurePolicy, LimiterKey, TokenBucketConfig};
use crate::distributed::fail_open_decision;
use crate::error::Result;
use crate::limiters::{validate_cost, RateLimitDecision, RateLimiter};
use crate::store::{expect_reply, AtomicProcedure, AtomicStore, StoreValue};
use async_trait::async_trait;

/// Token bucket whose reservoir lives in the shared store under one
/// persistent key per identifier. Refill and consumption happen inside a
/// single atomic procedure, so concurrent callers in different processes
/// never both spend the same tokens.
#[derive(Debug)]
pub struct DistributedTokenBucketLimiter<S>
where
    S: AtomicStore,
{
    store: S,
    key: LimiterKey,
    config: TokenBucketConfig,
    policy: FailurePolicy,
}

impl<S> DistributedTokenBucketLimiter<S>
where
    S: AtomicStore,
{
    pub fn new(store: S, key: LimiterKey, config: TokenBucketConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            key,
            config,
            policy: FailurePolicy::FailClosed,
        })
    }

    /// Choose what happens when the store is unreachable (default:
    /// fail closed, surfacing the store error)
    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }
}

#[async_trait]
impl<S> RateLimiter for DistributedTokenBucketLimiter<S>
where
    S: AtomicStore,
{
    async fn decide(&self, cost: u64) -> Result<RateLimitDecision> {
        validate_cost(cost)?;

        let now = epoch_secs();

        // A cost beyond capacity can never be admitted. Reject before the
        // store round trip; the wire encoding is i64 and must never see an
        // out-of-range cost.
        if cost > self.config.capacity {
            let retry_after = (cost - self.config.capacity) as f64 / self.config.refill_rate;
            let decision = RateLimitDecision {
                allowed: false,
                limit: self.config.capacity,
                remaining: 0,
                reset_at: system_time_from_secs(now + retry_after),
                retry_after: Some(duration_from_secs(retry_after)),
            };
            crate::decision_event!(
                "distributed_token_bucket",
                cost,
                decision.allowed,
                decision.remaining
            );
            return Ok(decision);
        }

        let keys = [self.key.base()];
        let args = [
            StoreValue::Int(self.config.capacity as i64),
            StoreValue::Float(self.config.refill_rate),
            StoreValue::Int(cost as i64),
            StoreValue::Float(now),
        ];

        let reply = match self
            .store
            .execute(AtomicProcedure::TokenBucketTake, &keys, &args)
            .await
        {
            Ok(reply) => expect_reply(AtomicProcedure::TokenBucketTake, reply, 3)?,
            Err(e) => match self.policy {
                FailurePolicy::FailClosed => return Err(e),
                FailurePolicy::FailOpen => {
                    tracing::warn!(
                        key = %self.key.base(),
                        error = %e,
                        "store unavailable, admitting fail-open"
                    );
                    return Ok(fail_open_decision(
                        self.config.capacity,
                        cost,
                        system_time_from_secs(now),
                    ));
                }
            },
        };

        let allowed = reply[0].as_i64()? == 1;
        let remaining = reply[1].as_i64()?.max(0) as u64;
        let retry_after = reply[2].as_f64()?;

        let decision = if allowed {
            RateLimitDecision {
                allowed: true,
                limit: self.config.capacity,
                remaining,
                reset_at: system_time_from_secs(
                    now + (self.config.capacity - remaining) as f64 / self.config.refill_rate,
                ),
                retry_after: None,
            }
        } else {
            RateLimitDecision {
                allowed: false,
                limit: self.config.capacity,
                remaining: 0,
                reset_at: system_time_from_secs(now + retry_after),
                retry_after: Some(duration_from_secs(retry_after)),
            }
        };

        crate::decision_event!(
            "distributed_token_bucket",
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

    async fn rollback(&self, cost: u64) -> Result<()> {
        let args = [
            StoreValue::Int(self.config.capacity as i64),
            StoreValue::Int(cost as i64),
            StoreValue::Float(epoch_secs()),
        ];
        self.store
            .execute(AtomicProcedure::TokenBucketRefund, &[self.key.base()], &args)
            .await?;
        Ok(())
    }
}
