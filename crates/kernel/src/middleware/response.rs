//! Response annotation for admission verdicts.
//!
//! Translates a verdict into the rate-limit response contract:
//! `X-RateLimit-*` headers on every decided response, plus `Retry-After`
//! and a structured JSON error body on rejection.

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::limit::{Lease, RateLimitPolicy};

const X_RATE_LIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const X_RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
const X_RATE_LIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");
const RETRY_AFTER: HeaderName = HeaderName::from_static("retry-after");

/// Attach rate-limit headers to an admitted response.
pub fn annotate_response(mut response: Response, lease: &Lease) -> Response {
    let headers = response.headers_mut();
    headers.insert(X_RATE_LIMIT_LIMIT, HeaderValue::from(lease.limit()));
    headers.insert(X_RATE_LIMIT_REMAINING, HeaderValue::from(lease.remaining()));
    headers.insert(X_RATE_LIMIT_RESET, HeaderValue::from(lease.reset_at()));
    response
}

/// Build the 429 response for a rejected request.
///
/// The body's `retryAfter` reports the policy window by contract; the
/// `Retry-After` header carries the limiter's sharper hint when it has
/// one.
pub fn rejection_response(policy: &RateLimitPolicy, lease: &Lease) -> Response {
    let retry_after = lease
        .retry_after_secs()
        .unwrap_or(policy.window_seconds);

    let body = json!({
        "error": "Rate limit exceeded",
        "message": "Too many requests. Please retry after some time.",
        "retryAfter": policy.window_seconds,
    });

    let mut response = (StatusCode::TOO_MANY_REQUESTS, axum::Json(body)).into_response();
    let headers = response.headers_mut();
    headers.insert(X_RATE_LIMIT_LIMIT, HeaderValue::from(lease.limit()));
    headers.insert(X_RATE_LIMIT_REMAINING, HeaderValue::from(0u32));
    headers.insert(X_RATE_LIMIT_RESET, HeaderValue::from(lease.reset_at()));
    headers.insert(RETRY_AFTER, HeaderValue::from(retry_after));
    response
}
