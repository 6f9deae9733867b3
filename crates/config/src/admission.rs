//! Admission control configuration structures.

use std::{
    collections::{BTreeMap, BTreeSet},
    time::Duration,
};

use duration_str::deserialize_duration;
use serde::Deserialize;

use crate::{HeaderName, StorageConfig};

/// Admission control configuration for the server.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AdmissionConfig {
    /// Whether admission control is enabled.
    pub enabled: bool,
    /// Counter store backend configuration.
    pub storage: StorageConfig,
    /// Tier applied when the caller does not claim one, or claims an unknown one.
    pub default_tier: String,
    /// The short-window burst guard evaluated next to the tiered limit.
    pub burst: BurstConfig,
    /// Requests that bypass counting entirely.
    pub exemptions: ExemptionConfig,
    /// Where the caller identity is read from.
    pub identity: IdentityConfig,
    /// Window policies keyed by tier identifier.
    pub tiers: BTreeMap<String, TierConfig>,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            storage: StorageConfig::default(),
            default_tier: "free".to_string(),
            burst: BurstConfig::default(),
            exemptions: ExemptionConfig::default(),
            identity: IdentityConfig::default(),
            tiers: default_tiers(),
        }
    }
}

/// A single tier's window policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TierConfig {
    /// Maximum number of requests admitted within one window.
    pub limit: u32,
    /// Length of the fixed window.
    #[serde(deserialize_with = "deserialize_duration")]
    pub window: Duration,
    /// Human readable name used in rejection messages.
    pub label: Option<String>,
}

impl TierConfig {
    fn fifteen_minutes(limit: u32, label: &str) -> Self {
        Self {
            limit,
            window: Duration::from_secs(15 * 60),
            label: Some(label.to_string()),
        }
    }
}

fn default_tiers() -> BTreeMap<String, TierConfig> {
    [
        ("demo", TierConfig::fifteen_minutes(50, "Demo")),
        ("free", TierConfig::fifteen_minutes(100, "Free")),
        ("premium", TierConfig::fifteen_minutes(1000, "Premium")),
        ("enterprise", TierConfig::fifteen_minutes(5000, "Enterprise")),
        ("admin", TierConfig::fifteen_minutes(10000, "Administrator")),
    ]
    .into_iter()
    .map(|(id, tier)| (id.to_string(), tier))
    .collect()
}

/// Burst guard configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BurstConfig {
    /// Whether the burst guard is enabled.
    pub enabled: bool,
    /// Maximum number of requests per network identity within one window.
    pub limit: u32,
    /// Length of the burst window.
    #[serde(deserialize_with = "deserialize_duration")]
    pub window: Duration,
}

impl Default for BurstConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            limit: 10,
            window: Duration::from_secs(10),
        }
    }
}

/// Requests matching any of these predicates are never counted.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExemptionConfig {
    /// Caller roles with administrative privileges.
    pub roles: BTreeSet<String>,
    /// Health and liveness paths.
    pub paths: BTreeSet<String>,
    /// Pre-flight methods.
    pub methods: BTreeSet<String>,
}

impl Default for ExemptionConfig {
    fn default() -> Self {
        Self {
            roles: BTreeSet::from(["admin".to_string()]),
            paths: BTreeSet::from(["/health".to_string()]),
            methods: BTreeSet::from(["OPTIONS".to_string()]),
        }
    }
}

/// Where the caller identity is read from.
///
/// Every header here can be forged by the client, so they are only honored when a proxy in
/// front of the gateway sets or strips them. By default the caller is identified by its
/// socket address alone.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IdentityConfig {
    /// Header with the authenticated user identifier.
    pub user_header: Option<HeaderName>,
    /// Header with the caller role, checked against the exempt roles.
    pub role_header: Option<HeaderName>,
    /// Header with the subscription tier.
    pub tier_header: Option<HeaderName>,
    /// Whether `X-Forwarded-For` and `X-Real-IP` are trusted for the network identity.
    pub trust_forwarded_headers: bool,
}

impl IdentityConfig {
    /// Identity as set by an authenticating proxy: `x-user-id`, `x-user-role` and
    /// `x-user-tier`, with forwarded client addresses trusted.
    pub fn trusted_proxy() -> Self {
        Self {
            user_header: Some(HeaderName::from_static("x-user-id")),
            role_header: Some(HeaderName::from_static("x-user-role")),
            tier_header: Some(HeaderName::from_static("x-user-tier")),
            trust_forwarded_headers: true,
        }
    }
}
