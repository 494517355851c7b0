//! Rate limiting algorithms and their shared acquisition contract.
//!
//! Four interchangeable strategies sit behind the [`Limiter`] trait:
//! fixed window, sliding window, token bucket, and a concurrency limiter.
//! Each instance guards a single tenant and is shared by every concurrent
//! request from that tenant, so all state is lock-protected and
//! `try_acquire` is safe to call from many tasks at once.
//!
//! Acquisition produces a [`Lease`]. When a policy allows queueing
//! (`queue_limit > 0`), a failed acquisition waits in a bounded,
//! oldest-first queue for a permit instead of failing immediately; a
//! cancelled request simply drops its wait future, which releases its
//! queue slot without leaking a permit.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::OwnedSemaphorePermit;

use crate::clock::Clock;

pub mod cache;
pub mod concurrency;
pub mod fixed_window;
pub mod policy;
pub mod resolver;
pub mod sliding_window;
pub mod token_bucket;

pub use cache::LimiterCache;
pub use concurrency::ConcurrencyLimiter;
pub use fixed_window::FixedWindowLimiter;
pub use policy::{Algorithm, PolicyError, RateLimitPolicy};
pub use resolver::PolicyResolver;
pub use sliding_window::SlidingWindowLimiter;
pub use token_bucket::TokenBucketLimiter;

/// Minimum pause between retries for a queued waiter, so a zero or stale
/// retry hint cannot degenerate into a busy loop.
const MIN_QUEUE_RETRY_MS: u64 = 10;

/// Outcome of one permit-acquisition attempt.
///
/// Ephemeral: a lease lives for the request that produced it and is never
/// stored. For the concurrency limiter the lease owns the permit itself;
/// dropping the lease returns the permit to the pool.
#[derive(Debug)]
pub struct Lease {
    acquired: bool,
    limit: u32,
    remaining: u32,
    reset_at: u64,
    retry_after_ms: Option<u64>,
    permit: Option<OwnedSemaphorePermit>,
}

impl Lease {
    /// A successful acquisition.
    pub fn granted(limit: u32, remaining: u32, reset_at: u64) -> Self {
        Self {
            acquired: true,
            limit,
            remaining,
            reset_at,
            retry_after_ms: None,
            permit: None,
        }
    }

    /// A failed acquisition with a hint for when to retry.
    pub fn denied(limit: u32, reset_at: u64, retry_after_ms: u64) -> Self {
        Self {
            acquired: false,
            limit,
            remaining: 0,
            reset_at,
            retry_after_ms: Some(retry_after_ms),
            permit: None,
        }
    }

    /// Attach an owned concurrency permit, released when the lease drops.
    pub(crate) fn with_permit(mut self, permit: OwnedSemaphorePermit) -> Self {
        self.permit = Some(permit);
        self
    }

    /// Whether the request may proceed.
    pub fn is_acquired(&self) -> bool {
        self.acquired
    }

    /// Permit ceiling of the policy in effect.
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Permits left in the current window/bucket (0 on rejection).
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Epoch seconds of the next window boundary or replenishment.
    pub fn reset_at(&self) -> u64 {
        self.reset_at
    }

    /// Suggested wait before retrying, in whole seconds (rejections only).
    pub fn retry_after_secs(&self) -> Option<u64> {
        self.retry_after_ms.map(|ms| ms.div_ceil(1000).max(1))
    }

    fn retry_after_ms(&self) -> Option<u64> {
        self.retry_after_ms
    }
}

/// Bounded FIFO queue of callers waiting for a permit.
///
/// Joining is non-blocking: when every slot is taken the newest caller
/// fails fast. A joined waiter serializes on an async mutex, so waiters
/// are served oldest-first; dropping the slot (request cancelled) frees
/// its place immediately.
#[derive(Debug)]
pub struct WaitQueue {
    capacity: u32,
    occupied: AtomicU32,
    turn: tokio::sync::Mutex<()>,
}

impl WaitQueue {
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity,
            occupied: AtomicU32::new(0),
            turn: tokio::sync::Mutex::new(()),
        }
    }

    /// Claim a queue slot, or `None` when the queue is full.
    pub fn try_join(&self) -> Option<QueueSlot<'_>> {
        let mut current = self.occupied.load(Ordering::Acquire);
        loop {
            if current >= self.capacity {
                return None;
            }
            match self.occupied.compare_exchange(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(QueueSlot { queue: self }),
                Err(observed) => current = observed,
            }
        }
    }

    /// Wait for this caller's turn at the head of the queue.
    pub async fn turn(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.turn.lock().await
    }
}

/// RAII handle for an occupied queue slot.
pub struct QueueSlot<'a> {
    queue: &'a WaitQueue,
}

impl Drop for QueueSlot<'_> {
    fn drop(&mut self) {
        self.queue.occupied.fetch_sub(1, Ordering::Release);
    }
}

/// Uniform permit-acquisition contract shared by all four algorithms.
#[async_trait]
pub trait Limiter: Send + Sync {
    /// One non-blocking acquisition attempt.
    fn try_acquire_once(&self) -> Lease;

    /// The waiter queue, when the policy allows queueing.
    fn wait_queue(&self) -> Option<&WaitQueue> {
        None
    }

    /// Acquire a permit, waiting in the queue when the policy allows it.
    ///
    /// With no queue (or a full one) this returns the denied lease
    /// immediately. A queued waiter retries at the limiter's suggested
    /// boundary until a permit frees up; the wait is abandoned cleanly if
    /// the future is dropped.
    async fn try_acquire(&self) -> Lease {
        let lease = self.try_acquire_once();
        if lease.is_acquired() {
            return lease;
        }

        let Some(queue) = self.wait_queue() else {
            return lease;
        };
        let Some(_slot) = queue.try_join() else {
            return lease;
        };

        let _turn = queue.turn().await;
        loop {
            let lease = self.try_acquire_once();
            if lease.is_acquired() {
                return lease;
            }
            let wait = lease
                .retry_after_ms()
                .unwrap_or(MIN_QUEUE_RETRY_MS)
                .max(MIN_QUEUE_RETRY_MS);
            tokio::time::sleep(Duration::from_millis(wait)).await;
        }
    }
}

/// Construct the live limiter instance a policy dictates.
///
/// Callers validate the policy first (see [`RateLimitPolicy::validate`]);
/// construction itself cannot fail.
pub fn build_limiter(policy: &RateLimitPolicy, clock: Arc<dyn Clock>) -> Arc<dyn Limiter> {
    match policy.algorithm {
        Algorithm::FixedWindow => Arc::new(FixedWindowLimiter::new(policy, clock)),
        Algorithm::SlidingWindow => Arc::new(SlidingWindowLimiter::new(policy, clock)),
        Algorithm::TokenBucket => Arc::new(TokenBucketLimiter::new(policy, clock)),
        Algorithm::Concurrency => Arc::new(ConcurrencyLimiter::new(policy, clock)),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn wait_queue_bounds_waiters() {
        let queue = WaitQueue::new(2);
        let a = queue.try_join();
        let b = queue.try_join();
        assert!(a.is_some());
        assert!(b.is_some());
        assert!(queue.try_join().is_none());

        drop(a);
        assert!(queue.try_join().is_some());
    }

    #[test]
    fn retry_after_rounds_up_to_whole_seconds() {
        let lease = Lease::denied(10, 0, 1_200);
        assert_eq!(lease.retry_after_secs(), Some(2));

        // Sub-second hints still tell the caller to wait at least 1s.
        let lease = Lease::denied(10, 0, 40);
        assert_eq!(lease.retry_after_secs(), Some(1));

        let lease = Lease::granted(10, 9, 0);
        assert_eq!(lease.retry_after_secs(), None);
    }
}
