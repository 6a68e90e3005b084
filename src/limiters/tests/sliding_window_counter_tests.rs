#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::config::SlidingWindowConfig;
    use crate::limiters::{RateLimiter, SlidingWindowCounterLimiter};
    use crate::test_utils::align_to_window;

    fn limiter(limit: u64, window: Duration) -> SlidingWindowCounterLimiter {
        SlidingWindowCounterLimiter::new(SlidingWindowConfig { limit, window }).unwrap()
    }

    #[tokio::test]
    async fn counts_within_one_window() {
        let limiter = limiter(3, Duration::from_secs(60));

        for _ in 0..3 {
            assert!(limiter.decide(1).await.unwrap().allowed);
        }
        let decision = limiter.decide(1).await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
        assert!(decision.retry_after.unwrap() <= Duration::from_secs(60));
    }

    /// Right after a rollover the previous window still weighs in through
    /// the overlap fraction, so a full-limit burst is rejected
    #[tokio::test]
    async fn previous_window_weighs_into_the_estimate() {
        align_to_window(1).await;
        let limiter = limiter(4, Duration::from_secs(1));

        assert!(limiter.decide(4).await.unwrap().allowed);

        // Early in the next window: estimate ~= 4 * high overlap
        align_to_window(1).await;
        let decision = limiter.decide(4).await.unwrap();
        assert!(
            !decision.allowed,
            "estimate carries the previous window's count"
        );

        // Once the window that actually held the burst rotates out of the
        // previous slot, the estimate drops to zero
        align_to_window(1).await;
        align_to_window(1).await;
        assert!(limiter.decide(4).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn remaining_reflects_the_estimate() {
        let limiter = limiter(10, Duration::from_secs(60));
        let decision = limiter.decide(3).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 7);
    }

    #[tokio::test]
    async fn cost_above_limit_always_rejects() {
        let limiter = limiter(3, Duration::from_secs(60));
        assert!(!limiter.decide(4).await.unwrap().allowed);
        assert!(limiter.decide(3).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn huge_cost_rejects_without_consuming() {
        let limiter = limiter(3, Duration::from_secs(60));
        assert!(!limiter.decide(u64::MAX).await.unwrap().allowed);
        assert!(limiter.decide(3).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn rollback_decrements_the_current_window() {
        let limiter = limiter(3, Duration::from_secs(60));
        limiter.decide(3).await.unwrap();
        assert!(!limiter.decide(1).await.unwrap().allowed);

        limiter.rollback(1).await.unwrap();
        assert!(limiter.decide(1).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn reset_discards_both_windows() {
        let limiter = limiter(2, Duration::from_secs(60));
        limiter.decide(2).await.unwrap();
        limiter.reset().await.unwrap();
        assert!(limiter.decide(2).await.unwrap().allowed);
    }
}
