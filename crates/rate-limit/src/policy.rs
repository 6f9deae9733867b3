use std::time::Duration;

use config::{BurstConfig, TierConfig};

use crate::RateLimitError;

/// Tier identifier used for the burst guard policy.
pub const BURST_TIER: &str = "burst";

/// Request ceiling over a fixed window, for one tier. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowPolicy {
    tier: String,
    window: Duration,
    limit: u32,
    label: String,
}

impl WindowPolicy {
    /// Creates a policy. Both the ceiling and the window must be non-zero.
    pub fn new(
        tier: impl Into<String>,
        window: Duration,
        limit: u32,
        label: impl Into<String>,
    ) -> Result<Self, RateLimitError> {
        let tier = tier.into();

        if limit == 0 {
            return Err(RateLimitError::InvalidPolicy {
                tier,
                reason: "the request ceiling must be greater than zero",
            });
        }

        if window.is_zero() {
            return Err(RateLimitError::InvalidPolicy {
                tier,
                reason: "the window must be longer than zero",
            });
        }

        Ok(Self {
            tier,
            window,
            limit,
            label: label.into(),
        })
    }

    /// Builds a tier policy from configuration. Without a label the tier id is used.
    pub fn from_tier(tier: &str, config: &TierConfig) -> Result<Self, RateLimitError> {
        let label = config.label.clone().unwrap_or_else(|| tier.to_string());
        Self::new(tier, config.window, config.limit, label)
    }

    /// Builds the burst guard policy, or `None` when the guard is disabled.
    pub fn from_burst(config: &BurstConfig) -> Result<Option<Self>, RateLimitError> {
        if !config.enabled {
            return Ok(None);
        }

        Self::new(BURST_TIER, config.window, config.limit, "Burst").map(Some)
    }

    /// The tier this policy applies to.
    pub fn tier(&self) -> &str {
        &self.tier
    }

    /// Length of one window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Requests admitted per window.
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Human readable tier name.
    pub fn label(&self) -> &str {
        &self.label
    }
}
