//! Live limiter cache.
//!
//! Maps a tenant to its live algorithm instance so state (window counts,
//! bucket levels, outstanding leases) carries across requests. Entries
//! expire after five idle minutes; every access refreshes the idle clock.

use std::sync::Arc;
use std::time::Duration;

use crate::cache::ExpiringCache;
use crate::clock::Clock;
use crate::limit::policy::RateLimitPolicy;
use crate::limit::{Limiter, build_limiter};

/// Idle TTL for a live limiter instance.
pub const LIMITER_IDLE_TTL: Duration = Duration::from_secs(5 * 60);

/// Shared cache of live limiter instances, keyed by tenant + policy.
///
/// The key embeds the policy fingerprint: when a tenant's resolved policy
/// changes (say, a premium upgrade mid-session) its traffic moves to a
/// fresh limiter immediately, and the entry under the old policy stops
/// being touched and ages out within the idle TTL.
pub struct LimiterCache {
    entries: ExpiringCache<String, Arc<dyn Limiter>>,
    clock: Arc<dyn Clock>,
}

impl LimiterCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: ExpiringCache::with_sliding_expiry(clock.clone()),
            clock,
        }
    }

    /// Fetch the tenant's live limiter, constructing it on first access.
    ///
    /// Two simultaneous first requests from the same tenant collapse into
    /// a single construction (see [`ExpiringCache::get_or_create`]); a
    /// duplicate instance would silently double the tenant's quota.
    pub fn get_or_create(&self, tenant_key: &str, policy: &RateLimitPolicy) -> Arc<dyn Limiter> {
        let key = format!("{tenant_key}:{}", policy.fingerprint());
        self.entries.get_or_create(key, LIMITER_IDLE_TTL, || {
            build_limiter(policy, self.clock.clone())
        })
    }

    /// Number of live entries (for monitoring).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no limiter is currently cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for LimiterCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LimiterCache")
            .field("entries", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::limit::Algorithm;

    fn fixed_policy(permit_limit: u32) -> RateLimitPolicy {
        RateLimitPolicy {
            algorithm: Algorithm::FixedWindow,
            permit_limit,
            window_seconds: 60,
            queue_limit: 0,
            segments_per_window: 1,
            tokens_per_period: 1,
            replenishment_period_seconds: 1,
        }
    }

    #[test]
    fn same_tenant_reuses_instance_and_state() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = LimiterCache::new(clock);
        let policy = fixed_policy(2);

        let first = cache.get_or_create("tenant_acme", &policy);
        assert!(first.try_acquire_once().is_acquired());
        assert!(first.try_acquire_once().is_acquired());

        // The second request sees the exhausted window, proving the
        // instance (and its counters) carried over.
        let second = cache.get_or_create("tenant_acme", &policy);
        assert!(!second.try_acquire_once().is_acquired());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn idle_expiry_yields_fresh_instance() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = LimiterCache::new(clock.clone());
        let policy = fixed_policy(1);

        let limiter = cache.get_or_create("tenant_acme", &policy);
        assert!(limiter.try_acquire_once().is_acquired());
        assert!(!limiter.try_acquire_once().is_acquired());

        // Past the idle TTL the entry is rebuilt with reset counters.
        clock.advance(LIMITER_IDLE_TTL + Duration::from_secs(1));
        let fresh = cache.get_or_create("tenant_acme", &policy);
        assert!(fresh.try_acquire_once().is_acquired());
    }

    #[test]
    fn tenants_get_isolated_instances() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = LimiterCache::new(clock);
        let policy = fixed_policy(1);

        let acme = cache.get_or_create("tenant_acme", &policy);
        assert!(acme.try_acquire_once().is_acquired());
        assert!(!acme.try_acquire_once().is_acquired());

        let globex = cache.get_or_create("tenant_globex", &policy);
        assert!(globex.try_acquire_once().is_acquired());
    }

    #[test]
    fn policy_change_moves_tenant_to_fresh_limiter() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = LimiterCache::new(clock);

        let standard = fixed_policy(1);
        let limiter = cache.get_or_create("tenant_acme", &standard);
        assert!(limiter.try_acquire_once().is_acquired());
        assert!(!limiter.try_acquire_once().is_acquired());

        // Upgraded policy: new fingerprint, new instance, old one idles out.
        let upgraded = fixed_policy(100);
        let limiter = cache.get_or_create("tenant_acme", &upgraded);
        assert!(limiter.try_acquire_once().is_acquired());
        assert_eq!(cache.len(), 2);
    }
}
