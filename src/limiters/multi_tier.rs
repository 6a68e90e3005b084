// src/limiters/multi_tier.rs

use crate::error::{Result, ThrottleError};
use crate::limiters::{validate_cost, RateLimitDecision, RateLimiter};
use async_trait::async_trait;
use std::sync::Arc;

/// Multi-tier composition: an ordered stack of independent constraints
/// that must all admit (for example a per-second burst limit AND an
/// hourly limit).
///
/// Tiers are evaluated in order. The first rejection aborts evaluation,
/// every previously-admitted tier is rolled back, and that rejection is
/// the composed result, so a rejected composite call has zero side
/// effects. When all tiers admit, the composed result is the admitted
/// decision with the smallest `remaining` (the binding constraint).
#[derive(Debug)]
pub struct MultiTierLimiter {
    tiers: Vec<Arc<dyn RateLimiter>>,
}

impl MultiTierLimiter {
    pub fn new(tiers: Vec<Arc<dyn RateLimiter>>) -> Result<Self> {
        if tiers.is_empty() {
            return Err(ThrottleError::Config(
                "multi-tier limiter requires at least one tier".to_string(),
            ));
        }
        Ok(Self { tiers })
    }

    /// Give back `cost` on every tier in `tiers[..admitted]`. A tier that
    /// cannot roll back is a configuration error surfaced as
    /// `RollbackFailed`, never a silent no-op.
    async fn unwind(&self, admitted: usize, cost: u64) -> Result<()> {
        for (index, tier) in self.tiers[..admitted].iter().enumerate() {
            tier.rollback(cost).await.map_err(|e| {
                ThrottleError::RollbackFailed(format!("tier {} rollback: {}", index, e))
            })?;
        }
        Ok(())
    }
}

#[async_trait]
impl RateLimiter for MultiTierLimiter {
    async fn decide(&self, cost: u64) -> Result<RateLimitDecision> {
        validate_cost(cost)?;

        let mut admitted: Vec<RateLimitDecision> = Vec::with_capacity(self.tiers.len());

        for tier in &self.tiers {
            match tier.decide(cost).await {
                Ok(decision) if decision.allowed => admitted.push(decision),
                Ok(rejection) => {
                    // The rejecting tier consumed nothing itself; undo the
                    // tiers before it exactly once
                    self.unwind(admitted.len(), cost).await?;
                    return Ok(rejection);
                }
                Err(e) => {
                    self.unwind(admitted.len(), cost).await?;
                    return Err(e);
                }
            }
        }

        let binding = admitted
            .into_iter()
            .min_by_key(|d| d.remaining)
            .expect("at least one tier");
        Ok(binding)
    }

    async fn reset(&self) -> Result<()> {
        for tier in &self.tiers {
            tier.reset().await?;
        }
        Ok(())
    }

    /// Composite rollback gives back on every tier, allowing nested
    /// stacks to participate in an outer composition.
    async fn rollback(&self, cost: u64) -> Result<()> {
        self.unwind(self.tiers.len(), cost).await
    }
}
