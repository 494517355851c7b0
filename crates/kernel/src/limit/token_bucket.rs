//! Token bucket.
//!
//! A bucket holding up to `permit_limit` tokens, starting full. Every
//! replenishment period restores `tokens_per_period` tokens, never
//! exceeding capacity. Refill is computed lazily from elapsed whole
//! periods on each acquisition; no timer task runs per tenant.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::clock::Clock;
use crate::limit::policy::RateLimitPolicy;
use crate::limit::{Lease, Limiter, WaitQueue};

struct BucketState {
    tokens: u32,
    last_refill_ms: u64,
}

pub struct TokenBucketLimiter {
    capacity: u32,
    tokens_per_period: u32,
    period_ms: u64,
    clock: Arc<dyn Clock>,
    queue: Option<WaitQueue>,
    state: Mutex<BucketState>,
}

impl TokenBucketLimiter {
    pub fn new(policy: &RateLimitPolicy, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now_ms();
        Self {
            capacity: policy.permit_limit,
            tokens_per_period: policy.tokens_per_period,
            period_ms: policy.replenishment_period_seconds * 1000,
            clock,
            queue: (policy.queue_limit > 0).then(|| WaitQueue::new(policy.queue_limit)),
            state: Mutex::new(BucketState {
                tokens: policy.permit_limit,
                last_refill_ms: now,
            }),
        }
    }

    fn refill(&self, state: &mut BucketState, now: u64) {
        if now < state.last_refill_ms + self.period_ms {
            return;
        }
        let periods = (now - state.last_refill_ms) / self.period_ms;
        let restored = periods.saturating_mul(u64::from(self.tokens_per_period));
        state.tokens = u64::from(state.tokens)
            .saturating_add(restored)
            .min(u64::from(self.capacity)) as u32;
        state.last_refill_ms += periods * self.period_ms;
    }
}

impl Limiter for TokenBucketLimiter {
    fn try_acquire_once(&self) -> Lease {
        let now = self.clock.now_ms();

        let mut state = self.state.lock();
        self.refill(&mut state, now);
        let next_refill = state.last_refill_ms + self.period_ms;
        let reset_at = next_refill / 1000;

        if state.tokens > 0 {
            state.tokens -= 1;
            Lease::granted(self.capacity, state.tokens, reset_at)
        } else {
            Lease::denied(self.capacity, reset_at, next_refill.saturating_sub(now).max(1))
        }
    }

    fn wait_queue(&self) -> Option<&WaitQueue> {
        self.queue.as_ref()
    }
}

impl std::fmt::Debug for TokenBucketLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBucketLimiter")
            .field("capacity", &self.capacity)
            .field("tokens_per_period", &self.tokens_per_period)
            .field("period_ms", &self.period_ms)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::clock::ManualClock;
    use crate::limit::Algorithm;

    fn policy(capacity: u32, tokens_per_period: u32, period_seconds: u64) -> RateLimitPolicy {
        RateLimitPolicy {
            algorithm: Algorithm::TokenBucket,
            permit_limit: capacity,
            window_seconds: 60,
            queue_limit: 0,
            segments_per_window: 1,
            tokens_per_period,
            replenishment_period_seconds: period_seconds,
        }
    }

    #[test]
    fn full_bucket_grants_exactly_capacity() {
        let clock = Arc::new(ManualClock::new(0));
        let limiter = TokenBucketLimiter::new(&policy(5, 2, 1), clock);

        for expected_remaining in [4, 3, 2, 1, 0] {
            let lease = limiter.try_acquire_once();
            assert!(lease.is_acquired());
            assert_eq!(lease.remaining(), expected_remaining);
        }
        assert!(!limiter.try_acquire_once().is_acquired());
    }

    #[test]
    fn one_period_restores_exactly_tokens_per_period() {
        let clock = Arc::new(ManualClock::new(0));
        let limiter = TokenBucketLimiter::new(&policy(5, 2, 1), clock.clone());

        for _ in 0..5 {
            assert!(limiter.try_acquire_once().is_acquired());
        }
        assert!(!limiter.try_acquire_once().is_acquired());

        clock.advance(Duration::from_secs(1));
        assert!(limiter.try_acquire_once().is_acquired());
        assert!(limiter.try_acquire_once().is_acquired());
        assert!(!limiter.try_acquire_once().is_acquired());
    }

    #[test]
    fn refill_never_exceeds_capacity() {
        let clock = Arc::new(ManualClock::new(0));
        let limiter = TokenBucketLimiter::new(&policy(5, 2, 1), clock.clone());

        // Idle for a long time: the bucket caps at 5, not 5 + 2*3600.
        clock.advance(Duration::from_secs(3600));
        for _ in 0..5 {
            assert!(limiter.try_acquire_once().is_acquired());
        }
        assert!(!limiter.try_acquire_once().is_acquired());
    }

    #[test]
    fn rejection_hints_at_next_refill() {
        let clock = Arc::new(ManualClock::new(0));
        let limiter = TokenBucketLimiter::new(&policy(1, 1, 10), clock.clone());

        assert!(limiter.try_acquire_once().is_acquired());
        clock.advance(Duration::from_secs(4));

        let rejected = limiter.try_acquire_once();
        assert!(!rejected.is_acquired());
        assert_eq!(rejected.retry_after_secs(), Some(6));
    }
}
