#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Common test utilities for integration tests.
//!
//! Builds a real router with the real admission middleware in front of
//! stub handlers; tests drive it with `tower::ServiceExt::oneshot` so the
//! full request path (skip list, identification, policy resolution,
//! limiter acquisition, response annotation) is exercised.

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::routing::{get, post};
use http_body_util::BodyExt;
use tower::ServiceExt;

use turnstile_kernel::clock::Clock;
use turnstile_kernel::config::{AdmissionSettings, Config};
use turnstile_kernel::limit::Algorithm;
use turnstile_kernel::middleware::enforce_admission;
use turnstile_kernel::state::AppState;
use turnstile_kernel::tenant::identity::AuthClaims;
use turnstile_kernel::tenant::tier::StaticSubscriptionLookup;

/// Fixed test epoch: an arbitrary instant 30s into its aligned
/// one-minute window, safely away from window boundaries.
pub const TEST_EPOCH_MS: u64 = 1_700_000_010_000;

/// Admission settings with a small default policy for fast exhaustion.
pub fn test_settings(algorithm: Algorithm, permit_limit: u32, queue_limit: u32) -> AdmissionSettings {
    AdmissionSettings {
        enabled: true,
        algorithm,
        permit_limit,
        window_seconds: 60,
        queue_limit,
        segments_per_window: 4,
        tokens_per_period: 10,
        replenishment_period_seconds: 1,
        ..AdmissionSettings::default()
    }
}

/// Build real application state around injected collaborators.
pub fn build_state(
    admission: AdmissionSettings,
    premium: &[&str],
    environment: &str,
    clock: Arc<dyn Clock>,
) -> AppState {
    let config = Config {
        port: 0,
        environment: environment.to_string(),
        cors_allowed_origins: vec!["*".to_string()],
        premium_tenants: premium.iter().map(|s| s.to_string()).collect(),
        admission,
    };
    let lookup = Arc::new(StaticSubscriptionLookup::new(premium.iter().copied()));
    AppState::new(config, lookup, clock)
}

/// Router with stub business handlers behind the admission middleware.
pub fn test_router(state: AppState) -> Router {
    Router::new()
        .route("/api/items", get(|| async { "items" }))
        .route("/api/auth/login", post(|| async { "logged in" }))
        .route("/reports/summary", get(|| async { "report" }))
        .route("/health", get(|| async { "healthy" }))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            enforce_admission,
        ))
        .with_state(state)
}

/// Send one request, optionally identifying a tenant via header.
pub async fn send(router: &Router, method: &str, path: &str, tenant: Option<&str>) -> Response<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(path)
        .header("host", "localhost:3000");
    if let Some(tenant) = tenant {
        builder = builder.header("x-tenant-id", tenant);
    }
    let request = builder.body(Body::empty()).unwrap();
    router.clone().oneshot(request).await.unwrap()
}

/// Send one request authenticated with the given claims.
pub async fn send_with_claims(router: &Router, path: &str, claims: AuthClaims) -> Response<Body> {
    let request = Request::builder()
        .method("GET")
        .uri(path)
        .header("host", "localhost:3000")
        .extension(claims)
        .body(Body::empty())
        .unwrap();
    router.clone().oneshot(request).await.unwrap()
}

/// Read a response body as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
