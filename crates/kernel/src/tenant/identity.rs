//! Tenant identification.
//!
//! Derives the rate-limit subject for a request from its identity
//! context. Pure function of request metadata; computed once per request
//! and never persisted.
//!
//! Precedence, first match wins:
//! 1. authenticated tenant claim
//! 2. `X-Tenant-Id` header
//! 3. non-trivial host subdomain
//! 4. none — an empty key means the request is not limited by tenant.
//!    Anonymous traffic therefore bypasses tenant-scoped limiting
//!    entirely; that gap is deliberate and documented rather than closed.

use axum::http::HeaderMap;
use axum::http::header::HOST;
use serde::{Deserialize, Serialize};

/// Prefix for tenant-derived rate-limit keys.
pub const TENANT_KEY_PREFIX: &str = "tenant_";

/// Header consulted when no authenticated claim names a tenant.
pub const TENANT_ID_HEADER: &str = "x-tenant-id";

/// Host labels that never denote a tenant.
const RESERVED_SUBDOMAINS: &[&str] = &["", "www", "api"];

/// Claims of the authenticated caller, inserted into request extensions
/// by the authentication layer in front of this kernel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthClaims {
    /// Subject (user) identifier.
    pub subject: String,

    /// Tenant the caller belongs to, when the token carries one.
    pub tenant_id: Option<String>,
}

/// Derive the tenant key for a request, or an empty string when the
/// request carries no tenant identity.
pub fn identify_tenant(claims: Option<&AuthClaims>, headers: &HeaderMap) -> String {
    if let Some(tenant_id) = claims.and_then(|c| c.tenant_id.as_deref())
        && !tenant_id.is_empty()
    {
        return format!("{TENANT_KEY_PREFIX}{tenant_id}");
    }

    if let Some(header) = headers.get(TENANT_ID_HEADER)
        && let Ok(value) = header.to_str()
        && !value.trim().is_empty()
    {
        return format!("{TENANT_KEY_PREFIX}{}", value.trim());
    }

    if let Some(subdomain) = headers
        .get(HOST)
        .and_then(|h| h.to_str().ok())
        .and_then(subdomain_of)
    {
        return format!("{TENANT_KEY_PREFIX}{subdomain}");
    }

    String::new()
}

/// Extract a tenant-bearing subdomain from a Host header value.
///
/// `localhost` (with or without port) never yields a tenant, and neither
/// do bare domains or reserved first labels (`www`, `api`).
fn subdomain_of(host: &str) -> Option<String> {
    let host = host.split(':').next().unwrap_or(host);
    if host.starts_with("localhost") {
        return None;
    }

    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() < 3 {
        return None;
    }

    let first = labels[0].to_ascii_lowercase();
    if RESERVED_SUBDOMAINS.contains(&first.as_str()) {
        return None;
    }

    Some(first)
}
