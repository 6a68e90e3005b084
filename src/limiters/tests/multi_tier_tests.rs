#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::config::{FixedWindowConfig, LimiterKey, TokenBucketConfig};
    use crate::distributed::DistributedTokenBucketLimiter;
    use crate::error::ThrottleError;
    use crate::limiters::{
        FixedWindowLimiter, MultiTierLimiter, RateLimiter, TokenBucketLimiter,
    };
    use crate::test_utils::{FailingStore, StubTier};

    fn burst_tier(capacity: u64, refill_rate: f64) -> Arc<TokenBucketLimiter> {
        Arc::new(
            TokenBucketLimiter::new(TokenBucketConfig {
                capacity,
                refill_rate,
            })
            .unwrap(),
        )
    }

    fn hourly_tier(limit: u64) -> Arc<FixedWindowLimiter> {
        Arc::new(
            FixedWindowLimiter::new(FixedWindowConfig {
                limit,
                window: Duration::from_secs(3600),
            })
            .unwrap(),
        )
    }

    /// A burst tier stacked over an hourly tier: the burst tier rejects
    /// first, and the hourly tier only ever pays for composite calls
    /// that were admitted end to end
    #[tokio::test]
    async fn rejected_composite_call_charges_no_tier() {
        let hourly = hourly_tier(100);
        let burst = burst_tier(2, 1.0);
        let stack =
            MultiTierLimiter::new(vec![hourly.clone() as Arc<dyn RateLimiter>, burst.clone()])
                .unwrap();

        assert!(stack.decide(1).await.unwrap().allowed);
        assert!(stack.decide(1).await.unwrap().allowed);

        // Third call: the hourly tier admits, the burst tier rejects, and
        // the hourly admission is rolled back
        let decision = stack.decide(1).await.unwrap();
        assert!(!decision.allowed);

        // Only the two fully-admitted calls count against the hour
        let hourly_view = hourly.decide(1).await.unwrap();
        assert!(hourly_view.allowed);
        assert_eq!(hourly_view.remaining, 97);
    }

    #[tokio::test]
    async fn result_is_the_binding_constraint() {
        let stack = MultiTierLimiter::new(vec![
            Arc::new(StubTier::admitting(50)) as Arc<dyn RateLimiter>,
            Arc::new(StubTier::admitting(3)),
            Arc::new(StubTier::admitting(12)),
        ])
        .unwrap();

        let decision = stack.decide(1).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 3, "smallest remaining wins");
    }

    #[tokio::test]
    async fn rejection_stops_evaluation_and_unwinds_earlier_tiers() {
        let first = Arc::new(StubTier::admitting(10));
        let second = Arc::new(StubTier::rejecting());
        let third = Arc::new(StubTier::admitting(10));
        let stack = MultiTierLimiter::new(vec![
            first.clone() as Arc<dyn RateLimiter>,
            second.clone(),
            third.clone(),
        ])
        .unwrap();

        let decision = stack.decide(1).await.unwrap();
        assert!(!decision.allowed);

        assert_eq!(first.rollbacks.load(Ordering::SeqCst), 1);
        assert_eq!(second.rollbacks.load(Ordering::SeqCst), 0);
        assert_eq!(third.decides.load(Ordering::SeqCst), 0, "never consulted");
    }

    #[tokio::test]
    async fn tier_error_also_unwinds() {
        let first = Arc::new(StubTier::admitting(10));
        let failing = Arc::new(
            DistributedTokenBucketLimiter::new(
                FailingStore,
                LimiterKey::new("stacked"),
                TokenBucketConfig {
                    capacity: 5,
                    refill_rate: 1.0,
                },
            )
            .unwrap(),
        );
        let stack =
            MultiTierLimiter::new(vec![first.clone() as Arc<dyn RateLimiter>, failing]).unwrap();

        // Fail-closed store error aborts the composite call and still
        // unwinds the tier that had already admitted
        assert!(matches!(
            stack.decide(1).await,
            Err(ThrottleError::Store(_))
        ));
        assert_eq!(first.rollbacks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unwind_failure_surfaces_as_rollback_failed() {
        let stack = MultiTierLimiter::new(vec![
            Arc::new(StubTier::admitting(10).without_rollback()) as Arc<dyn RateLimiter>,
            Arc::new(StubTier::rejecting()),
        ])
        .unwrap();

        assert!(matches!(
            stack.decide(1).await,
            Err(ThrottleError::RollbackFailed(_))
        ));
    }

    #[tokio::test]
    async fn composite_rollback_reaches_every_tier() {
        let first = Arc::new(StubTier::admitting(10));
        let second = Arc::new(StubTier::admitting(5));
        let stack =
            MultiTierLimiter::new(vec![first.clone() as Arc<dyn RateLimiter>, second.clone()])
                .unwrap();

        stack.decide(1).await.unwrap();
        stack.rollback(1).await.unwrap();
        assert_eq!(first.rollbacks.load(Ordering::SeqCst), 1);
        assert_eq!(second.rollbacks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reset_propagates_to_every_tier() {
        let hourly = hourly_tier(2);
        let stack = MultiTierLimiter::new(vec![hourly.clone() as Arc<dyn RateLimiter>]).unwrap();

        stack.decide(2).await.unwrap();
        stack.reset().await.unwrap();
        assert!(hourly.decide(2).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn empty_stack_is_a_config_error() {
        assert!(matches!(
            MultiTierLimiter::new(Vec::new()),
            Err(ThrottleError::Config(_))
        ));
    }

    #[tokio::test]
    async fn stacks_nest() {
        let inner_tier = Arc::new(StubTier::admitting(4));
        let inner =
            MultiTierLimiter::new(vec![inner_tier.clone() as Arc<dyn RateLimiter>]).unwrap();
        let outer = MultiTierLimiter::new(vec![
            Arc::new(inner) as Arc<dyn RateLimiter>,
            Arc::new(StubTier::rejecting()),
        ])
        .unwrap();

        // The outer unwind rolls the nested stack back through its
        // composite rollback
        let decision = outer.decide(1).await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(inner_tier.rollbacks.load(Ordering::SeqCst), 1);
    }
}
