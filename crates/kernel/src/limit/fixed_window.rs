//! Fixed window counter.
//!
//! A counter reset every window, with windows aligned to the wall clock
//! (window start = now rounded down to a multiple of the window length)
//! rather than to any caller's first request. A burst straddling a
//! boundary can therefore see up to twice the permit limit; that is the
//! accepted trade-off for the cheapest possible bookkeeping.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::clock::Clock;
use crate::limit::policy::RateLimitPolicy;
use crate::limit::{Lease, Limiter, WaitQueue};

struct WindowState {
    window_start_ms: u64,
    count: u32,
}

pub struct FixedWindowLimiter {
    permit_limit: u32,
    window_ms: u64,
    clock: Arc<dyn Clock>,
    queue: Option<WaitQueue>,
    state: Mutex<WindowState>,
}

impl FixedWindowLimiter {
    pub fn new(policy: &RateLimitPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            permit_limit: policy.permit_limit,
            window_ms: policy.window_seconds * 1000,
            clock,
            queue: (policy.queue_limit > 0).then(|| WaitQueue::new(policy.queue_limit)),
            state: Mutex::new(WindowState {
                window_start_ms: 0,
                count: 0,
            }),
        }
    }
}

impl Limiter for FixedWindowLimiter {
    fn try_acquire_once(&self) -> Lease {
        let now = self.clock.now_ms();
        let window_start = now - now % self.window_ms;
        let window_end = window_start + self.window_ms;
        let reset_at = window_end / 1000;

        let mut state = self.state.lock();
        if state.window_start_ms != window_start {
            state.window_start_ms = window_start;
            state.count = 0;
        }

        if state.count < self.permit_limit {
            state.count += 1;
            Lease::granted(self.permit_limit, self.permit_limit - state.count, reset_at)
        } else {
            Lease::denied(self.permit_limit, reset_at, window_end - now)
        }
    }

    fn wait_queue(&self) -> Option<&WaitQueue> {
        self.queue.as_ref()
    }
}

impl std::fmt::Debug for FixedWindowLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixedWindowLimiter")
            .field("permit_limit", &self.permit_limit)
            .field("window_ms", &self.window_ms)
            .finish()
    }
}
