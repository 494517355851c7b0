//! Admission control.
//!
//! Decides per inbound request whether it proceeds to business handlers
//! or is rejected with backpressure signaling. The pipeline is linear
//! with early exits:
//!
//! skip check → tenant identification → policy resolution → limiter
//! acquisition → admit or reject.
//!
//! Runs inline on the worker handling the request; the only background
//! work is the caches' lazy TTL eviction. A failure while resolving the
//! tier is downgraded to "standard" inside the tier resolver; nothing
//! else on this path can fail, so there is no silently-admit or
//! silently-reject error handling here.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::Response;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::config::AdmissionSettings;
use crate::limit::{Lease, Limiter, LimiterCache, PolicyResolver, RateLimitPolicy};
use crate::metrics::{Metrics, PolicyLabels};
use crate::middleware::response::{annotate_response, rejection_response};
use crate::state::AppState;
use crate::tenant::identity::{AuthClaims, identify_tenant};
use crate::tenant::tier::{TenantSubscriptionLookup, TierResolver};

/// Outcome of one admission decision.
#[derive(Debug)]
pub enum Verdict {
    /// Admission control does not apply: disabled, skip-listed path, or
    /// no tenant identity.
    Bypassed,

    /// The request proceeds; the lease annotates the response on the way
    /// out (and, for the concurrency algorithm, holds the permit until
    /// the handler finishes).
    Admitted {
        policy: RateLimitPolicy,
        lease: Lease,
    },

    /// The request is rejected with 429 and never reaches its handler.
    Rejected {
        policy: RateLimitPolicy,
        lease: Lease,
    },
}

/// Orchestrates skip-list filtering, tenant identification, policy
/// resolution, and limiter acquisition.
pub struct AdmissionController {
    enabled: bool,
    skip_paths: Vec<String>,
    resolver: PolicyResolver,
    tier: TierResolver,
    limiters: LimiterCache,
    metrics: Arc<Metrics>,
}

impl AdmissionController {
    /// Build a controller from an immutable settings snapshot.
    ///
    /// `enabled` is the effective switch: callers fold the environment
    /// escape hatch (test/CI bypass) into it. The settings' default
    /// policy must already be validated; an invalid policy is a startup
    /// error, never a per-request one.
    pub fn new(
        settings: &AdmissionSettings,
        enabled: bool,
        lookup: Arc<dyn TenantSubscriptionLookup>,
        clock: Arc<dyn Clock>,
        metrics: Arc<Metrics>,
    ) -> Self {
        if !enabled {
            info!("admission control disabled for this process");
        }

        Self {
            enabled,
            skip_paths: settings.skip_paths.clone(),
            resolver: PolicyResolver::new(settings.default_policy()),
            tier: TierResolver::new(lookup, clock.clone()),
            limiters: LimiterCache::new(clock),
            metrics,
        }
    }

    /// Whether a normalized lower-cased path bypasses admission control.
    pub fn is_skipped(&self, path: &str) -> bool {
        self.skip_paths.iter().any(|skip| path.contains(skip))
    }

    /// Decide admission for one request.
    pub async fn admit(
        &self,
        claims: Option<&AuthClaims>,
        headers: &HeaderMap,
        path: &str,
    ) -> Verdict {
        if !self.enabled {
            return Verdict::Bypassed;
        }

        if self.is_skipped(path) {
            self.metrics.admission_bypassed.inc();
            return Verdict::Bypassed;
        }

        let tenant_key = identify_tenant(claims, headers);
        if tenant_key.is_empty() {
            // No tenant identity: admitted without tenant-scoped limiting.
            self.metrics.admission_bypassed.inc();
            debug!(path = %path, "request without tenant identity admitted unlimited");
            return Verdict::Bypassed;
        }

        let policy = self.resolver.resolve(&tenant_key, path, &self.tier).await;
        let limiter = self.limiters.get_or_create(&tenant_key, &policy);
        let lease = limiter.try_acquire().await;

        if lease.is_acquired() {
            self.metrics.admission_admitted.inc();
            debug!(
                tenant = %tenant_key,
                path = %path,
                algorithm = %policy.algorithm,
                remaining = lease.remaining(),
                "request admitted"
            );
            Verdict::Admitted { policy, lease }
        } else {
            self.metrics
                .admission_rejections
                .get_or_create(&PolicyLabels {
                    algorithm: policy.algorithm.as_str().to_string(),
                })
                .inc();
            debug!(
                tenant = %tenant_key,
                path = %path,
                algorithm = %policy.algorithm,
                limit = lease.limit(),
                "rate limit exceeded"
            );
            Verdict::Rejected { policy, lease }
        }
    }

    /// Live limiter count (for monitoring).
    pub fn live_limiters(&self) -> usize {
        self.limiters.len()
    }
}

impl std::fmt::Debug for AdmissionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionController")
            .field("enabled", &self.enabled)
            .field("skip_paths", &self.skip_paths.len())
            .field("live_limiters", &self.limiters.len())
            .finish()
    }
}

/// Axum middleware enforcing admission control.
///
/// Admitted requests continue down the pipeline and get rate-limit
/// headers attached on the way back out; rejected requests short-circuit
/// with 429 and never reach their handler. Downstream handler failures
/// propagate unmodified — they are not this layer's concern.
pub async fn enforce_admission(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_ascii_lowercase();
    let claims = request.extensions().get::<AuthClaims>().cloned();

    let verdict = state
        .admission()
        .admit(claims.as_ref(), request.headers(), &path)
        .await;

    match verdict {
        Verdict::Bypassed => next.run(request).await,
        Verdict::Admitted { lease, .. } => {
            let response = next.run(request).await;
            // `lease` stays alive across the handler; for the concurrency
            // algorithm that is what holds the permit until completion.
            annotate_response(response, &lease)
        }
        Verdict::Rejected { policy, lease } => rejection_response(&policy, &lease),
    }
}
