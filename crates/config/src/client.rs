//! Outbound client configuration.

use std::time::Duration;

use duration_str::deserialize_duration;
use serde::Deserialize;
use url::Url;

/// Configuration of the outbound request pipeline.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Base URL every endpoint is resolved against.
    pub base_url: Url,
    /// Endpoint exchanging credentials for a bearer token.
    #[serde(default = "default_login_path")]
    pub login_path: String,
    /// Endpoint invalidating the current bearer token.
    #[serde(default = "default_logout_path")]
    pub logout_path: String,
    /// Local self-throttle applied before any request leaves the process.
    #[serde(default)]
    pub throttle: ThrottleConfig,
    /// Retry behavior for transient failures.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Upper bound for a single attempt.
    #[serde(default = "default_attempt_timeout", deserialize_with = "deserialize_duration")]
    pub attempt_timeout: Duration,
}

impl ClientConfig {
    /// Creates a configuration with defaults for everything but the base URL.
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            login_path: default_login_path(),
            logout_path: default_logout_path(),
            throttle: ThrottleConfig::default(),
            retry: RetryConfig::default(),
            attempt_timeout: default_attempt_timeout(),
        }
    }
}

fn default_login_path() -> String {
    "/auth/login".to_string()
}

fn default_logout_path() -> String {
    "/auth/logout".to_string()
}

fn default_attempt_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Client-side fixed window.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThrottleConfig {
    /// Maximum number of attempts sent within one window.
    pub limit: u32,
    /// Length of the window.
    #[serde(deserialize_with = "deserialize_duration")]
    pub window: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            limit: 100,
            window: Duration::from_secs(60),
        }
    }
}

/// Linear backoff retry configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    /// Total number of attempts, the initial one included.
    pub max_attempts: u32,
    /// Delay unit; the n-th retry waits `base_delay * n`.
    #[serde(deserialize_with = "deserialize_duration")]
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}
