// src/distributed/sliding_window_counter.rs

use crate::clock::{duration_from_secs, epoch_secs, system_time_from_secs, window_start};
use crate::config::{FailurePolicy, LimiterKey, SlidingWindowConfig};
use crate::distributed::fail_open_decision;
use crate::error::Result;
use crate::limiters::{validate_cost, RateLimitDecision, RateLimiter};
use crate::store::{expect_reply, AtomicProcedure, AtomicStore, StoreValue};
use async_trait::async_trait;

/// Sliding window counter in the shared store: one counter key per
/// aligned window, with the estimate computed server-side over the
/// current and previous window keys. Counter keys expire after twice the
/// window so the previous window's count is still readable for the whole
/// overlap period.
#[derive(Debug)]
pub struct DistributedSlidingWindowCounterLimiter<S>
where
    S: AtomicStore,
{
    store: S,
    key: LimiterKey,
    config: SlidingWindowConfig,
    policy: FailurePolicy,
}

impl<S> DistributedSlidingWindowCounterLimiter<S>
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

    fn window_secs(&self) -> u64 {
        self.config.window.as_secs()
    }
}

#[async_trait]
impl<S> RateLimiter for DistributedSlidingWindowCounterLimiter<S>
where
    S: AtomicStore,
{
    async fn decide(&self, cost: u64) -> Result<RateLimitDecision> {
        validate_cost(cost)?;

        let now = epoch_secs();
        let current = window_start(now, self.window_secs());
        let previous = current.saturating_sub(self.window_secs());
        let window_end = (current + self.window_secs()) as f64;

        // A cost beyond the limit can never be admitted. Reject before the
        // store round trip; the wire encoding is i64 and must never see an
        // out-of-range cost.
        if cost > self.config.limit {
            let decision = RateLimitDecision {
                allowed: false,
                limit: self.config.limit,
                remaining: 0,
                reset_at: system_time_from_secs(window_end),
                retry_after: Some(duration_from_secs(window_end - now)),
            };
            crate::decision_event!(
                "distributed_sliding_window_counter",
                cost,
                decision.allowed,
                decision.remaining
            );
            return Ok(decision);
        }

        let keys = [self.key.for_window(current), self.key.for_window(previous)];
        let args = [
            StoreValue::Int(self.window_secs() as i64),
            StoreValue::Int(self.config.limit as i64),
            StoreValue::Int(cost as i64),
            StoreValue::Float(now),
            StoreValue::Int(current as i64),
        ];

        let reply = match self
            .store
            .execute(AtomicProcedure::SlidingCounterTake, &keys, &args)
            .await
        {
            Ok(reply) => expect_reply(AtomicProcedure::SlidingCounterTake, reply, 3)?,
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
                        system_time_from_secs(window_end),
                    ));
                }
            },
        };

        let allowed = reply[0].as_i64()? == 1;
        let remaining = reply[1].as_i64()?.max(0) as u64;

        let decision = if allowed {
            RateLimitDecision {
                allowed: true,
                limit: self.config.limit,
                remaining,
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
            "distributed_sliding_window_counter",
            cost,
            decision.allowed,
            decision.remaining
        );
        Ok(decision)
    }

    async fn reset(&self) -> Result<()> {
        let current = window_start(epoch_secs(), self.window_secs());
        let previous = current.saturating_sub(self.window_secs());
        self.store.delete(&self.key.for_window(current)).await?;
        self.store.delete(&self.key.for_window(previous)).await?;
        Ok(())
    }

    async fn rollback(&self, cost: u64) -> Result<()> {
        let current = window_start(epoch_secs(), self.window_secs());
        let amount = i64::try_from(cost).unwrap_or(i64::MAX);
        self.store
            .execute(
                AtomicProcedure::WindowRefund,
                &[self.key.for_window(current)],
                &[StoreValue::Int(amount)],
            )
            .await?;
        Ok(())
    }
}
