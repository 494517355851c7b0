//! Policy resolution.
//!
//! Picks the [`RateLimitPolicy`] in effect for one request: endpoint
//! overrides beat tier overrides beat the process-wide default. The
//! resolver holds no per-request state; given its inputs and the tier
//! resolver's cached answer it is a pure decision table.

use crate::limit::policy::{Algorithm, RateLimitPolicy};
use crate::tenant::tier::TierResolver;

/// Path fragments that mark an authentication endpoint.
///
/// Matching is substring containment over the normalized path, so both
/// `/auth/login` and `/api/auth/login/2fa` land on the auth policy.
const AUTH_PATTERNS: &[&str] = &["/auth/login", "/auth/refresh", "/auth/2fa", "/login"];

/// Prefix of the general API surface eligible for the premium policy.
const API_PREFIX: &str = "/api/";

/// Login endpoints get a strict fixed window. The permit count leaves
/// room for multi-step flows (password + 2FA + token refresh); the zero
/// queue rejects excess attempts immediately instead of parking them.
fn auth_policy() -> RateLimitPolicy {
    RateLimitPolicy {
        algorithm: Algorithm::FixedWindow,
        permit_limit: 10,
        window_seconds: 60,
        queue_limit: 0,
        segments_per_window: 1,
        tokens_per_period: 1,
        replenishment_period_seconds: 1,
    }
}

/// Premium tenants on the API surface get a token bucket with a much
/// higher ceiling and fast replenishment.
fn premium_policy() -> RateLimitPolicy {
    RateLimitPolicy {
        algorithm: Algorithm::TokenBucket,
        permit_limit: 1000,
        window_seconds: 60,
        queue_limit: 0,
        segments_per_window: 1,
        tokens_per_period: 100,
        replenishment_period_seconds: 1,
    }
}

/// Chooses the applicable policy for a tenant and endpoint.
#[derive(Debug)]
pub struct PolicyResolver {
    default_policy: RateLimitPolicy,
    auth_policy: RateLimitPolicy,
    premium_policy: RateLimitPolicy,
}

impl PolicyResolver {
    pub fn new(default_policy: RateLimitPolicy) -> Self {
        Self {
            default_policy,
            auth_policy: auth_policy(),
            premium_policy: premium_policy(),
        }
    }

    /// Whether a normalized path is an authentication endpoint.
    pub fn is_auth_path(path: &str) -> bool {
        AUTH_PATTERNS.iter().any(|pattern| path.contains(pattern))
    }

    /// Resolve the policy for `tenant_key` calling `path`.
    ///
    /// Auth endpoints always use the strict fixed-window policy, even for
    /// premium tenants; brute-force protection does not relax with spend.
    pub async fn resolve(
        &self,
        tenant_key: &str,
        path: &str,
        tier: &TierResolver,
    ) -> RateLimitPolicy {
        if Self::is_auth_path(path) {
            return self.auth_policy;
        }

        if path.starts_with(API_PREFIX) && tier.is_premium(tenant_key).await {
            return self.premium_policy;
        }

        self.default_policy
    }
}
