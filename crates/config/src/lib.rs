//! Turnstile configuration structures to map the turnstile.toml configuration.

#![deny(missing_docs)]

mod admission;
mod client;
mod health;
mod http_types;
mod loader;
mod storage;

use std::{net::SocketAddr, path::Path, time::Duration};

pub use admission::{AdmissionConfig, BurstConfig, ExemptionConfig, IdentityConfig, TierConfig};
pub use client::{ClientConfig, RetryConfig, ThrottleConfig};
use duration_str::deserialize_duration;
pub use health::HealthConfig;
pub use http_types::HeaderName;
use serde::Deserialize;
pub use storage::{RedisConfig, RedisPoolConfig, RedisTlsConfig, StorageConfig};
use url::Url;

/// Main configuration structure for the Turnstile gateway.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// HTTP server configuration settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Admission control configuration settings.
    #[serde(default)]
    pub admission: AdmissionConfig,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
        loader::load(path)
    }

    /// Validates tier and burst policies.
    pub fn validate(&self) -> anyhow::Result<()> {
        loader::validate_admission(&self.admission)
    }
}

/// HTTP server configuration settings.
#[derive(Default, Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// The socket address the server should listen on.
    pub listen_address: Option<SocketAddr>,
    /// Health endpoint configuration.
    #[serde(default)]
    pub health: HealthConfig,
    /// Upstream service receiving admitted requests.
    pub upstream: Option<UpstreamConfig>,
}

/// Upstream service configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpstreamConfig {
    /// Base URL of the upstream service.
    pub url: Url,
    /// Timeout for a single forwarded request.
    #[serde(default = "default_upstream_timeout", deserialize_with = "deserialize_duration")]
    pub timeout: Duration,
    /// Largest request body that will be forwarded, in bytes.
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

fn default_upstream_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_max_body_size() -> usize {
    10 * 1024 * 1024
}
