//! Tenant identity and subscription tier.

pub mod identity;
pub mod tier;

pub use identity::{AuthClaims, identify_tenant};
pub use tier::{StaticSubscriptionLookup, TenantSubscriptionLookup, TierResolver};
