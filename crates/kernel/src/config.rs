//! Configuration loaded from environment variables.

use std::env;

use anyhow::{Context, Result};

use crate::limit::policy::{Algorithm, RateLimitPolicy};

/// Paths (substring match) that bypass admission control entirely:
/// health checks, API docs, the job dashboard, well-known URIs, static
/// assets. Checked before tenant identification so high-volume
/// infrastructure endpoints never pay for it.
pub const DEFAULT_SKIP_PATHS: &[&str] = &[
    "/health",
    "/metrics",
    "/swagger",
    "/api-docs",
    "/jobs",
    "/.well-known",
    "/static/",
    "/assets/",
    "/favicon",
];

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port (default: 3000).
    pub port: u16,

    /// Deployment environment name (default: "development").
    pub environment: String,

    /// CORS allowed origins (comma-separated, default: "*").
    pub cors_allowed_origins: Vec<String>,

    /// Tenant ids treated as premium by the static subscription lookup.
    pub premium_tenants: Vec<String>,

    /// Admission-control settings.
    pub admission: AdmissionSettings,
}

/// Immutable admission-control settings, passed into the controller's
/// constructor so tests can inject policies instead of reading the
/// environment.
#[derive(Debug, Clone)]
pub struct AdmissionSettings {
    /// Master switch (default: true).
    pub enabled: bool,

    /// Algorithm of the default policy (default: sliding window).
    pub algorithm: Algorithm,

    /// Permit ceiling of the default policy (default: 500).
    pub permit_limit: u32,

    /// Window length of the default policy in seconds (default: 60).
    pub window_seconds: u64,

    /// Waiter queue size of the default policy (default: 5).
    pub queue_limit: u32,

    /// Sliding-window segments of the default policy (default: 4).
    pub segments_per_window: u32,

    /// Token-bucket refill amount of the default policy (default: 10).
    pub tokens_per_period: u32,

    /// Token-bucket refill period of the default policy in seconds
    /// (default: 1).
    pub replenishment_period_seconds: u64,

    /// Paths that bypass admission control (substring match).
    pub skip_paths: Vec<String>,
}

impl Default for AdmissionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            algorithm: Algorithm::SlidingWindow,
            permit_limit: 500,
            window_seconds: 60,
            queue_limit: 5,
            segments_per_window: 4,
            tokens_per_period: 10,
            replenishment_period_seconds: 1,
            skip_paths: DEFAULT_SKIP_PATHS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl AdmissionSettings {
    /// The process-wide default policy these settings describe.
    pub fn default_policy(&self) -> RateLimitPolicy {
        RateLimitPolicy {
            algorithm: self.algorithm,
            permit_limit: self.permit_limit,
            window_seconds: self.window_seconds,
            queue_limit: self.queue_limit,
            segments_per_window: self.segments_per_window,
            tokens_per_period: self.tokens_per_period,
            replenishment_period_seconds: self.replenishment_period_seconds,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .context("PORT must be a valid u16")?;

        let environment = env::var("ENVIRONMENT")
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase();

        let cors_allowed_origins = env::var("CORS_ALLOWED_ORIGINS")
            .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_else(|_| vec!["*".to_string()]);

        let premium_tenants = list_var("PREMIUM_TENANTS");

        let defaults = AdmissionSettings::default();

        let enabled = env::var("RATE_LIMIT_ENABLED")
            .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(defaults.enabled);

        let algorithm = match env::var("RATE_LIMIT_ALGORITHM") {
            Ok(value) => value
                .parse()
                .context("RATE_LIMIT_ALGORITHM is not a known algorithm")?,
            Err(_) => defaults.algorithm,
        };

        let skip_paths = match env::var("RATE_LIMIT_SKIP_PATHS") {
            Ok(value) => value
                .split(',')
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
            Err(_) => defaults.skip_paths.clone(),
        };

        let admission = AdmissionSettings {
            enabled,
            algorithm,
            permit_limit: parse_var("RATE_LIMIT_PERMIT_LIMIT", defaults.permit_limit)?,
            window_seconds: parse_var("RATE_LIMIT_WINDOW_SECONDS", defaults.window_seconds)?,
            queue_limit: parse_var("RATE_LIMIT_QUEUE_LIMIT", defaults.queue_limit)?,
            segments_per_window: parse_var(
                "RATE_LIMIT_SEGMENTS_PER_WINDOW",
                defaults.segments_per_window,
            )?,
            tokens_per_period: parse_var(
                "RATE_LIMIT_TOKENS_PER_PERIOD",
                defaults.tokens_per_period,
            )?,
            replenishment_period_seconds: parse_var(
                "RATE_LIMIT_REPLENISHMENT_PERIOD_SECONDS",
                defaults.replenishment_period_seconds,
            )?,
            skip_paths,
        };

        // An unusable default policy is a startup error, not something to
        // discover on the first rejected request.
        admission
            .default_policy()
            .validate()
            .context("invalid rate limit configuration")?;

        Ok(Self {
            port,
            environment,
            cors_allowed_origins,
            premium_tenants,
            admission,
        })
    }

    /// Whether this process runs in a test/CI environment, where
    /// admission control is bypassed entirely.
    pub fn is_test_environment(&self) -> bool {
        matches!(self.environment.as_str(), "test" | "ci" | "testing")
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .with_context(|| format!("{name} must be a valid integer")),
        Err(_) => Ok(default),
    }
}

fn list_var(name: &str) -> Vec<String> {
    env::var(name)
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}
