//! Subscription tier resolution.
//!
//! Answers "is this tenant premium?" against an external subscription
//! lookup, memoized for five minutes. Lookup failures downgrade to the
//! standard tier — premium benefits are never granted speculatively — and
//! the negative answer is cached so a broken lookup is not hammered.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::cache::ExpiringCache;
use crate::clock::Clock;
use crate::tenant::identity::TENANT_KEY_PREFIX;

/// How long a tier answer is cached, from lookup time (not refreshed on
/// read — a plan change is picked up within this window).
pub const TIER_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Rate-limit keys with this prefix identify callers by IP, not tenant;
/// they are never premium.
const IP_KEY_PREFIX: &str = "ip_";

/// External subscription store consulted on tier-cache misses.
///
/// Implementations may fail; the resolver treats any error as "not
/// premium".
#[async_trait]
pub trait TenantSubscriptionLookup: Send + Sync {
    async fn is_premium(&self, tenant_id: &str) -> Result<bool>;
}

/// Lookup backed by a fixed set of premium tenant ids.
///
/// The default integration: the binary feeds it from configuration. An
/// empty set means no tenant resolves premium until a real subscription
/// service is wired in.
#[derive(Debug, Default)]
pub struct StaticSubscriptionLookup {
    premium: HashSet<String>,
}

impl StaticSubscriptionLookup {
    pub fn new<I, S>(premium: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            premium: premium.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl TenantSubscriptionLookup for StaticSubscriptionLookup {
    async fn is_premium(&self, tenant_id: &str) -> Result<bool> {
        Ok(self.premium.contains(tenant_id))
    }
}

/// Cached premium-tier resolver.
pub struct TierResolver {
    cache: ExpiringCache<String, bool>,
    lookup: Arc<dyn TenantSubscriptionLookup>,
}

impl TierResolver {
    pub fn new(lookup: Arc<dyn TenantSubscriptionLookup>, clock: Arc<dyn Clock>) -> Self {
        Self {
            cache: ExpiringCache::new(clock),
            lookup,
        }
    }

    /// Whether the tenant behind `tenant_key` is on a premium plan.
    pub async fn is_premium(&self, tenant_key: &str) -> bool {
        if tenant_key.is_empty() || tenant_key.starts_with(IP_KEY_PREFIX) {
            return false;
        }
        let tenant_id = tenant_key
            .strip_prefix(TENANT_KEY_PREFIX)
            .unwrap_or(tenant_key);

        if let Some(cached) = self.cache.try_get(&tenant_id.to_string()) {
            return cached;
        }

        let premium = match self.lookup.is_premium(tenant_id).await {
            Ok(premium) => premium,
            Err(error) => {
                warn!(
                    tenant = %tenant_id,
                    error = %error,
                    "subscription lookup failed, treating tenant as standard tier"
                );
                false
            }
        };

        debug!(tenant = %tenant_id, premium, "tier resolved");
        self.cache
            .insert(tenant_id.to_string(), premium, TIER_CACHE_TTL);
        premium
    }
}

impl std::fmt::Debug for TierResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TierResolver")
            .field("cached", &self.cache.len())
            .finish()
    }
}
