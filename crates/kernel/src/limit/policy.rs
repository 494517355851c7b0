//! Rate-limit policy values.
//!
//! A [`RateLimitPolicy`] is a pure configuration snapshot: which algorithm
//! guards a tenant and with what parameters. Policies never mutate after
//! construction; the policy resolver hands out copies per request.

use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Policy validation and parsing errors.
///
/// These are fatal at startup or policy-resolution time: an invalid policy
/// must never reach a live limiter, where it would fail open or closed in
/// an undefined way.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("unknown rate limit algorithm: {0:?}")]
    UnknownAlgorithm(String),

    #[error("{algorithm} requires {field} > 0")]
    ZeroParameter {
        algorithm: &'static str,
        field: &'static str,
    },
}

/// The limiting strategy a policy selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Algorithm {
    FixedWindow,
    SlidingWindow,
    TokenBucket,
    Concurrency,
}

impl Algorithm {
    /// Stable lowercase name, used in config, metrics labels, and cache keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::FixedWindow => "fixed_window",
            Algorithm::SlidingWindow => "sliding_window",
            Algorithm::TokenBucket => "token_bucket",
            Algorithm::Concurrency => "concurrency",
        }
    }
}

impl FromStr for Algorithm {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed_window" => Ok(Algorithm::FixedWindow),
            "sliding_window" => Ok(Algorithm::SlidingWindow),
            "token_bucket" => Ok(Algorithm::TokenBucket),
            "concurrency" => Ok(Algorithm::Concurrency),
            other => Err(PolicyError::UnknownAlgorithm(other.to_string())),
        }
    }
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable description of one rate limit.
///
/// `window_seconds` applies to the window algorithms, `segments_per_window`
/// to sliding window only, and `tokens_per_period` /
/// `replenishment_period_seconds` to token bucket only; the other
/// algorithms ignore the fields they do not use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitPolicy {
    pub algorithm: Algorithm,

    /// Maximum permits per window, bucket capacity, or concurrent leases.
    pub permit_limit: u32,

    /// Window length for the window algorithms.
    pub window_seconds: u64,

    /// How many callers may wait for a permit instead of being rejected
    /// immediately. Zero means acquisition never suspends.
    pub queue_limit: u32,

    /// Sliding window only: sub-intervals the window is divided into.
    pub segments_per_window: u32,

    /// Token bucket only: tokens restored per replenishment period.
    pub tokens_per_period: u32,

    /// Token bucket only: seconds between replenishments.
    pub replenishment_period_seconds: u64,
}

impl RateLimitPolicy {
    /// Check the parameters the selected algorithm actually uses.
    pub fn validate(&self) -> Result<(), PolicyError> {
        let zero = |field| PolicyError::ZeroParameter {
            algorithm: self.algorithm.as_str(),
            field,
        };

        match self.algorithm {
            Algorithm::FixedWindow => {
                if self.window_seconds == 0 {
                    return Err(zero("window_seconds"));
                }
            }
            Algorithm::SlidingWindow => {
                if self.window_seconds == 0 {
                    return Err(zero("window_seconds"));
                }
                if self.segments_per_window == 0 {
                    return Err(zero("segments_per_window"));
                }
            }
            Algorithm::TokenBucket => {
                if self.tokens_per_period == 0 {
                    return Err(zero("tokens_per_period"));
                }
                if self.replenishment_period_seconds == 0 {
                    return Err(zero("replenishment_period_seconds"));
                }
            }
            Algorithm::Concurrency => {}
        }

        Ok(())
    }

    /// Window length as a [`Duration`].
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }

    /// Replenishment period as a [`Duration`].
    pub fn replenishment_period(&self) -> Duration {
        Duration::from_secs(self.replenishment_period_seconds)
    }

    /// Compact identity string for limiter-cache keys.
    ///
    /// Two policies with the same fingerprint are interchangeable for a
    /// live limiter instance; a tenant whose resolved policy changes gets
    /// a different fingerprint and therefore a fresh limiter, while the
    /// stale entry ages out within the cache's idle TTL.
    pub fn fingerprint(&self) -> String {
        format!(
            "{}:{}:{}:{}:{}:{}:{}",
            self.algorithm.as_str(),
            self.permit_limit,
            self.window_seconds,
            self.queue_limit,
            self.segments_per_window,
            self.tokens_per_period,
            self.replenishment_period_seconds,
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn base_policy(algorithm: Algorithm) -> RateLimitPolicy {
        RateLimitPolicy {
            algorithm,
            permit_limit: 100,
            window_seconds: 60,
            queue_limit: 0,
            segments_per_window: 4,
            tokens_per_period: 10,
            replenishment_period_seconds: 1,
        }
    }

    #[test]
    fn algorithm_round_trips_through_names() {
        for algorithm in [
            Algorithm::FixedWindow,
            Algorithm::SlidingWindow,
            Algorithm::TokenBucket,
            Algorithm::Concurrency,
        ] {
            assert_eq!(algorithm.as_str().parse::<Algorithm>().unwrap(), algorithm);
        }
        assert!("leaky_bucket".parse::<Algorithm>().is_err());
    }

    #[test]
    fn validate_rejects_zero_window() {
        let mut policy = base_policy(Algorithm::SlidingWindow);
        policy.window_seconds = 0;
        assert!(policy.validate().is_err());

        // Token bucket does not care about the window at all.
        policy.algorithm = Algorithm::TokenBucket;
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_segments() {
        let mut policy = base_policy(Algorithm::SlidingWindow);
        policy.segments_per_window = 0;
        assert!(policy.validate().is_err());
    }

    #[test]
    fn fingerprint_distinguishes_policies() {
        let sliding = base_policy(Algorithm::SlidingWindow);
        let mut premium = base_policy(Algorithm::TokenBucket);
        premium.permit_limit = 1000;

        assert_ne!(sliding.fingerprint(), premium.fingerprint());
        assert_eq!(sliding.fingerprint(), base_policy(Algorithm::SlidingWindow).fingerprint());
    }
}
