//! Concurrency limiter.
//!
//! Bounds the number of outstanding leases rather than a rate. The permit
//! travels inside the [`Lease`] and returns to the pool when the lease is
//! dropped, so release happens on success and failure alike. This is the
//! one algorithm where release matters to correctness.
//!
//! Queued waiting rides on the semaphore itself: `acquire_owned` wakes
//! waiters in FIFO order and is cancel-safe, so a request dropped while
//! queued never holds a phantom permit.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::clock::Clock;
use crate::limit::policy::RateLimitPolicy;
use crate::limit::{Lease, Limiter};

/// Retry hint for a denied concurrency acquisition; unlike the window
/// algorithms there is no boundary to point at.
const RETRY_HINT_MS: u64 = 1_000;

pub struct ConcurrencyLimiter {
    permit_limit: u32,
    queue_limit: u32,
    semaphore: Arc<Semaphore>,
    waiters: AtomicU32,
    clock: Arc<dyn Clock>,
}

impl ConcurrencyLimiter {
    pub fn new(policy: &RateLimitPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            permit_limit: policy.permit_limit,
            queue_limit: policy.queue_limit,
            semaphore: Arc::new(Semaphore::new(policy.permit_limit as usize)),
            waiters: AtomicU32::new(0),
            clock,
        }
    }

    fn denied(&self) -> Lease {
        Lease::denied(self.permit_limit, self.clock.now_secs(), RETRY_HINT_MS)
    }
}

#[async_trait]
impl Limiter for ConcurrencyLimiter {
    fn try_acquire_once(&self) -> Lease {
        match Arc::clone(&self.semaphore).try_acquire_owned() {
            Ok(permit) => {
                let remaining = self.semaphore.available_permits() as u32;
                Lease::granted(self.permit_limit, remaining, self.clock.now_secs())
                    .with_permit(permit)
            }
            Err(_) => self.denied(),
        }
    }

    async fn try_acquire(&self) -> Lease {
        let lease = self.try_acquire_once();
        if lease.is_acquired() || self.queue_limit == 0 {
            return lease;
        }

        // Claim a bounded waiter slot before joining the semaphore queue.
        if self.waiters.fetch_add(1, Ordering::AcqRel) >= self.queue_limit {
            self.waiters.fetch_sub(1, Ordering::AcqRel);
            return lease;
        }
        let _slot = WaiterSlot(&self.waiters);

        match Arc::clone(&self.semaphore).acquire_owned().await {
            Ok(permit) => {
                let remaining = self.semaphore.available_permits() as u32;
                Lease::granted(self.permit_limit, remaining, self.clock.now_secs())
                    .with_permit(permit)
            }
            // The semaphore is never closed; treat it as a denial anyway.
            Err(_) => self.denied(),
        }
    }
}

struct WaiterSlot<'a>(&'a AtomicU32);

impl Drop for WaiterSlot<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl std::fmt::Debug for ConcurrencyLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcurrencyLimiter")
            .field("permit_limit", &self.permit_limit)
            .field("queue_limit", &self.queue_limit)
            .field("available", &self.semaphore.available_permits())
            .finish()
    }
}
