//! Sliding window counter.
//!
//! The window is divided into equal segments; the effective count is the
//! sum over the segments still inside the window. Compared to a fixed
//! window this smooths the boundary-reset burst while keeping memory at
//! O(segments) per tenant.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::clock::Clock;
use crate::limit::policy::RateLimitPolicy;
use crate::limit::{Lease, Limiter, WaitQueue};

struct Segment {
    index: u64,
    count: u32,
}

pub struct SlidingWindowLimiter {
    permit_limit: u32,
    segments_per_window: u64,
    segment_ms: u64,
    clock: Arc<dyn Clock>,
    queue: Option<WaitQueue>,
    state: Mutex<VecDeque<Segment>>,
}

impl SlidingWindowLimiter {
    pub fn new(policy: &RateLimitPolicy, clock: Arc<dyn Clock>) -> Self {
        let segments = u64::from(policy.segments_per_window.max(1));
        let window_ms = policy.window_seconds * 1000;
        Self {
            permit_limit: policy.permit_limit,
            segments_per_window: segments,
            // Validation guarantees window > 0; a window shorter than its
            // segment count still gets 1ms segments.
            segment_ms: (window_ms / segments).max(1),
            clock,
            queue: (policy.queue_limit > 0).then(|| WaitQueue::new(policy.queue_limit)),
            state: Mutex::new(VecDeque::new()),
        }
    }
}

impl Limiter for SlidingWindowLimiter {
    fn try_acquire_once(&self) -> Lease {
        let now = self.clock.now_ms();
        let current = now / self.segment_ms;
        // Segments older than this have slid out of the window.
        let oldest_active = (current + 1).saturating_sub(self.segments_per_window);
        let reset_at = (current + 1) * self.segment_ms / 1000;

        let mut segments = self.state.lock();
        while segments.front().is_some_and(|s| s.index < oldest_active) {
            segments.pop_front();
        }

        let total: u32 = segments.iter().map(|s| s.count).sum();
        if total < self.permit_limit {
            match segments.back_mut() {
                Some(back) if back.index == current => back.count += 1,
                _ => segments.push_back(Segment {
                    index: current,
                    count: 1,
                }),
            }
            Lease::granted(self.permit_limit, self.permit_limit - total - 1, reset_at)
        } else {
            // A permit frees when the oldest occupied segment expires.
            let retry_ms = segments
                .front()
                .map(|s| ((s.index + self.segments_per_window) * self.segment_ms).saturating_sub(now))
                .unwrap_or(self.segment_ms)
                .max(1);
            Lease::denied(self.permit_limit, reset_at, retry_ms)
        }
    }

    fn wait_queue(&self) -> Option<&WaitQueue> {
        self.queue.as_ref()
    }
}

impl std::fmt::Debug for SlidingWindowLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlidingWindowLimiter")
            .field("permit_limit", &self.permit_limit)
            .field("segments_per_window", &self.segments_per_window)
            .field("segment_ms", &self.segment_ms)
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

    fn policy(permit_limit: u32, window_seconds: u64, segments: u32) -> RateLimitPolicy {
        RateLimitPolicy {
            algorithm: Algorithm::SlidingWindow,
            permit_limit,
            window_seconds,
            queue_limit: 0,
            segments_per_window: segments,
            tokens_per_period: 1,
            replenishment_period_seconds: 1,
        }
    }

    #[test]
    fn counts_slide_out_segment_by_segment() {
        let clock = Arc::new(ManualClock::new(0));
        let limiter = SlidingWindowLimiter::new(&policy(4, 4, 4), clock.clone());

        // Two permits at t=0, two at t=2s: window is now full.
        assert!(limiter.try_acquire_once().is_acquired());
        assert!(limiter.try_acquire_once().is_acquired());
        clock.advance(Duration::from_secs(2));
        assert!(limiter.try_acquire_once().is_acquired());
        assert!(limiter.try_acquire_once().is_acquired());
        assert!(!limiter.try_acquire_once().is_acquired());

        // At t=4s the t=0 segment slides out, freeing exactly two permits.
        clock.advance(Duration::from_secs(2));
        assert!(limiter.try_acquire_once().is_acquired());
        assert!(limiter.try_acquire_once().is_acquired());
        assert!(!limiter.try_acquire_once().is_acquired());
    }

    #[test]
    fn rejection_points_at_oldest_segment_expiry() {
        let clock = Arc::new(ManualClock::new(0));
        let limiter = SlidingWindowLimiter::new(&policy(1, 4, 4), clock.clone());

        assert!(limiter.try_acquire_once().is_acquired());
        clock.advance(Duration::from_secs(1));

        let rejected = limiter.try_acquire_once();
        assert!(!rejected.is_acquired());
        // The only occupied segment (t=0) expires at t=4s, 3s from now.
        assert_eq!(rejected.retry_after_secs(), Some(3));
    }

    #[test]
    fn full_window_clears_after_whole_window_passes() {
        let clock = Arc::new(ManualClock::new(0));
        let limiter = SlidingWindowLimiter::new(&policy(4, 60, 4), clock.clone());

        for _ in 0..4 {
            assert!(limiter.try_acquire_once().is_acquired());
        }
        assert!(!limiter.try_acquire_once().is_acquired());

        clock.advance(Duration::from_secs(60));
        for _ in 0..4 {
            assert!(limiter.try_acquire_once().is_acquired());
        }
    }
}
