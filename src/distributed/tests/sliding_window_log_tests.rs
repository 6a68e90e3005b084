#[cfg(test)]
mod tests {
    use std::time::Duration;
    use tokio::time;

    use crate::config::{FailurePolicy, LimiterKey, SlidingWindowConfig};
    use crate::distributed::DistributedSlidingWindowLogLimiter;
    use crate::error::ThrottleError;
    use crate::limiters::RateLimiter;
    use crate::store::MemoryStore;
    use crate::test_utils::FailingStore;

    fn limiter(
        store: MemoryStore,
        identifier: &str,
        limit: u64,
        window: Duration,
    ) -> DistributedSlidingWindowLogLimiter<MemoryStore> {
        DistributedSlidingWindowLogLimiter::new(
            store,
            LimiterKey::new(identifier),
            SlidingWindowConfig { limit, window },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn exact_count_within_the_trailing_window() {
        let store = MemoryStore::new();
        let limiter = limiter(store, "swl:basic", 3, Duration::from_secs(60));

        for expected_remaining in [2, 1, 0] {
            let decision = limiter.decide(1).await.unwrap();
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
        }

        let decision = limiter.decide(1).await.unwrap();
        assert!(!decision.allowed);
        let retry = decision.retry_after.unwrap().as_secs_f64();
        assert!(
            (59.0..=60.0).contains(&retry),
            "oldest marker leaves the window after ~60s, got {}",
            retry
        );
    }

    #[tokio::test]
    async fn instances_share_the_log() {
        let store = MemoryStore::new();
        let a = limiter(store.clone(), "swl:shared", 3, Duration::from_secs(60));
        let b = limiter(store, "swl:shared", 3, Duration::from_secs(60));

        assert!(a.decide(2).await.unwrap().allowed);
        assert!(b.decide(1).await.unwrap().allowed);
        assert!(!a.decide(1).await.unwrap().allowed);
        assert!(!b.decide(1).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn markers_evict_as_the_window_slides() {
        let store = MemoryStore::new();
        let limiter = limiter(store, "swl:evict", 2, Duration::from_secs(1));

        assert!(limiter.decide(2).await.unwrap().allowed);
        assert!(!limiter.decide(1).await.unwrap().allowed);

        time::sleep(Duration::from_millis(1100)).await;
        assert!(limiter.decide(2).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn empty_log_rejection_has_zero_retry() {
        let store = MemoryStore::new();
        let limiter = limiter(store, "swl:empty", 3, Duration::from_secs(60));

        let decision = limiter.decide(5).await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.retry_after.unwrap(), Duration::ZERO);
    }

    /// An over-limit cost rejects before any store call; deciding over a
    /// dead store proves the short-circuit
    #[tokio::test]
    async fn huge_cost_rejects_before_touching_the_store() {
        let limiter = DistributedSlidingWindowLogLimiter::new(
            FailingStore,
            LimiterKey::new("swl:huge"),
            SlidingWindowConfig {
                limit: 3,
                window: Duration::from_secs(60),
            },
        )
        .unwrap();

        let decision = limiter.decide(u64::MAX).await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.retry_after.unwrap(), Duration::ZERO);
    }

    /// Admitted markers cannot be attributed back to a caller, so this
    /// variant does not participate in rollback
    #[tokio::test]
    async fn rollback_is_unsupported() {
        let store = MemoryStore::new();
        let limiter = limiter(store, "swl:rollback", 3, Duration::from_secs(60));

        limiter.decide(1).await.unwrap();
        assert!(matches!(
            limiter.rollback(1).await,
            Err(ThrottleError::RollbackUnsupported)
        ));
    }

    #[tokio::test]
    async fn reset_drops_the_ordered_set() {
        let store = MemoryStore::new();
        let limiter = limiter(store, "swl:reset", 2, Duration::from_secs(60));

        limiter.decide(2).await.unwrap();
        limiter.reset().await.unwrap();
        assert!(limiter.decide(2).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn fail_open_admits_when_the_store_is_down() {
        let limiter = DistributedSlidingWindowLogLimiter::new(
            FailingStore,
            LimiterKey::new("swl:down"),
            SlidingWindowConfig {
                limit: 5,
                window: Duration::from_secs(60),
            },
        )
        .unwrap()
        .failure_policy(FailurePolicy::FailOpen);

        assert!(limiter.decide(1).await.unwrap().allowed);
    }
}
