//! Rate policies for ingestion pacing.
//!
//! Batch ingestion pauses between network-heavy steps to respect
//! third-party rate limits. The policy is injected so the pacing shape
//! (fixed delay, token bucket, none at all) stays out of the pipeline
//! logic. This is a courtesy toward collaborators, not a correctness
//! requirement.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// A pacing policy for sequential batch work.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
pub trait RatePolicy: Send + Sync {
    /// Wait until the next unit of paced work may proceed.
    fn pause(&self) -> impl std::future::Future<Output = ()> + Send;
}

/// No pacing at all. Useful for tests and local backfills.
pub struct NoPacing;

impl RatePolicy for NoPacing {
    async fn pause(&self) {}
}

/// Sleep a fixed duration per unit of work.
pub struct FixedDelay {
    delay: Duration,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn from_millis(millis: u64) -> Self {
        Self::new(Duration::from_millis(millis))
    }
}

impl RatePolicy for FixedDelay {
    async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

/// Token bucket: bursts up to `capacity`, then refills continuously at
/// `refill_per_sec` tokens per second.
pub struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(capacity: u32, refill_per_sec: f64) -> Self {
        let capacity = f64::from(capacity.max(1));
        Self {
            capacity,
            refill_per_sec: refill_per_sec.max(f64::MIN_POSITIVE),
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }
}

impl RatePolicy for TokenBucket {
    async fn pause(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                let elapsed = now.duration_since(state.last_refill).as_secs_f64();
                state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
                state.last_refill = now;
                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return;
                }
                Duration::from_secs_f64((1.0 - state.tokens) / self.refill_per_sec)
            };
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_no_pacing_is_immediate() {
        let start = Instant::now();
        NoPacing.pause().await;
        assert!(start.elapsed() < Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_fixed_delay_sleeps() {
        let pacer = FixedDelay::from_millis(30);
        let start = Instant::now();
        pacer.pause().await;
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_fixed_delay_zero_is_immediate() {
        let pacer = FixedDelay::from_millis(0);
        let start = Instant::now();
        pacer.pause().await;
        assert!(start.elapsed() < Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_token_bucket_allows_burst_up_to_capacity() {
        let pacer = TokenBucket::new(3, 1.0);
        let start = Instant::now();
        for _ in 0..3 {
            pacer.pause().await;
        }
        assert!(
            start.elapsed() < Duration::from_millis(100),
            "burst within capacity should not block"
        );
    }

    #[tokio::test]
    async fn test_token_bucket_blocks_once_drained() {
        let pacer = TokenBucket::new(1, 50.0);
        pacer.pause().await;

        let start = Instant::now();
        pacer.pause().await;
        // One token at 50/s refills in ~20ms.
        assert!(start.elapsed() >= Duration::from_millis(10));
    }
}
