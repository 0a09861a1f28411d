use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::time::Duration;

/// Minimum-interval gate shared by every request a client issues
///
/// One cell per `interval` with a burst of one, so the first request passes
/// immediately and each later one waits out the remainder of the interval.
/// `None` for a zero interval, which means no gating at all.
pub fn request_gate(interval: Duration) -> Option<DefaultDirectRateLimiter> {
    Quota::with_period(interval).map(RateLimiter::direct)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    // The gate keeps its own monotonic clock, so these run in real time
    // with short intervals. Lower bounds allow for clock granularity.
    const INTERVAL: Duration = Duration::from_millis(100);
    const SLACK: Duration = Duration::from_millis(10);

    #[tokio::test]
    async fn test_first_pass_is_immediate() {
        let gate = request_gate(Duration::from_secs(5)).unwrap();
        let start = Instant::now();
        gate.until_ready().await;
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_passes_are_spaced_by_interval() {
        let gate = request_gate(INTERVAL).unwrap();
        let start = Instant::now();

        gate.until_ready().await;
        gate.until_ready().await;
        gate.until_ready().await;

        assert!(start.elapsed() >= 2 * INTERVAL - SLACK);
    }

    #[tokio::test]
    async fn test_elapsed_work_counts_towards_interval() {
        let gate = request_gate(Duration::from_millis(500)).unwrap();
        gate.until_ready().await;

        tokio::time::sleep(Duration::from_millis(300)).await;
        let before = Instant::now();
        gate.until_ready().await;

        let waited = before.elapsed();
        assert!(waited >= Duration::from_millis(200) - SLACK);
        assert!(waited < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_concurrent_callers_are_serialised() {
        let gate = Arc::new(request_gate(INTERVAL).unwrap());
        let start = Instant::now();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let gate = Arc::clone(&gate);
                tokio::spawn(async move {
                    gate.until_ready().await;
                    Instant::now()
                })
            })
            .collect();

        let mut last = start;
        for handle in handles {
            last = last.max(handle.await.unwrap());
        }

        // Four passes need three full intervals after the first
        assert!(last - start >= 3 * INTERVAL - SLACK);
    }

    #[test]
    fn test_zero_interval_has_no_gate() {
        assert!(request_gate(Duration::ZERO).is_none());
    }
}
