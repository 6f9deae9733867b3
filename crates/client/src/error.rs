use std::time::Duration;

use http::StatusCode;

/// Failure to exchange a request with the server at all.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// The connection failed or broke before a response arrived.
    #[error("Network error: {0}")]
    Network(String),
    /// The request could not be built.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Terminal result of a failed call.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The local self-throttle is exhausted. Nothing was sent.
    #[error("Request not sent: local limit of {limit} requests per {window:?} reached, retry in {retry_after:?}")]
    RateLimitedLocally {
        /// Requests allowed per window.
        limit: u32,
        /// Length of the window.
        window: Duration,
        /// Time until the local window resets.
        retry_after: Duration,
    },

    /// The call needs credentials and none are stored. Nothing was sent.
    #[error("Authentication required")]
    AuthRequired,

    /// The server rejected the credentials. They have been cleared.
    #[error("Authentication expired or invalid")]
    AuthExpired {
        /// Message returned by the server.
        message: Option<String>,
    },

    /// The caller is not allowed to perform the call.
    #[error("Forbidden{}", fmt_message(message))]
    Forbidden {
        /// Message returned by the server.
        message: Option<String>,
        /// Server provided wait time, if any.
        retry_after: Option<Duration>,
    },

    /// The server refused the call because an admission window is exhausted.
    #[error("Rate limited by the server{}", fmt_message(message))]
    RateLimited {
        /// Message returned by the server.
        message: Option<String>,
        /// Time the server asks the caller to wait.
        retry_after: Option<Duration>,
    },

    /// The server answered with a non-retryable status.
    #[error("Request failed with status {status}")]
    Status {
        /// Response status.
        status: StatusCode,
        /// Response body, lossily decoded.
        body: String,
    },

    /// Retryable failures persisted until the attempt budget ran out.
    #[error("Request failed after {attempts} attempt(s): {reason}")]
    Transient {
        /// Attempts sent.
        attempts: u32,
        /// Last failure.
        reason: String,
        /// Status of the last response, when the failure was a server error.
        status: Option<StatusCode>,
    },

    /// The caller supplied deadline passed.
    #[error("Deadline exceeded after {attempts} attempt(s)")]
    DeadlineExceeded {
        /// Attempts sent.
        attempts: u32,
    },

    /// The caller cancelled the call.
    #[error("Request cancelled after {attempts} attempt(s)")]
    Cancelled {
        /// Attempts sent.
        attempts: u32,
    },

    /// A request or response body was not valid JSON of the expected shape.
    #[error("Invalid JSON payload: {0}")]
    Decode(#[from] serde_json::Error),

    /// The request could not be built.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

fn fmt_message(message: &Option<String>) -> String {
    message.as_deref().map(|m| format!(": {m}")).unwrap_or_default()
}

impl ClientError {
    /// How long the caller should wait before trying again, when known.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ClientError::RateLimitedLocally { retry_after, .. } => Some(*retry_after),
            ClientError::RateLimited { retry_after, .. } | ClientError::Forbidden { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Whether the same call may succeed later without new credentials or permissions.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::RateLimitedLocally { .. }
                | ClientError::RateLimited { .. }
                | ClientError::Transient { .. }
                | ClientError::DeadlineExceeded { .. }
        )
    }

    /// Whether the caller has to authenticate again.
    pub fn requires_login(&self) -> bool {
        matches!(self, ClientError::AuthRequired | ClientError::AuthExpired { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_message_is_appended() {
        let error = ClientError::RateLimited {
            message: Some("Slow down".to_string()),
            retry_after: Some(Duration::from_secs(50)),
        };

        assert_eq!(error.to_string(), "Rate limited by the server: Slow down");
        assert_eq!(error.retry_after(), Some(Duration::from_secs(50)));
        assert!(error.is_retryable());
    }

    #[test]
    fn credential_errors_are_not_retryable() {
        let error = ClientError::AuthExpired { message: None };

        assert!(!error.is_retryable());
        assert!(error.requires_login());
        assert_eq!(error.retry_after(), None);
    }
}
