//! Liveness endpoint configuration.

use std::borrow::Cow;

use serde::Deserialize;

/// Liveness endpoint served next to the metered routes.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HealthConfig {
    /// Serve the endpoint at all.
    pub enabled: bool,
    /// Route of the endpoint. Always added to the admission exemptions.
    pub path: Cow<'static, str>,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: Cow::Borrowed("/health"),
        }
    }
}
