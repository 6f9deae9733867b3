//! Error types for admission control.

/// Errors raised while building the admission model.
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    /// A window policy violates its invariants.
    #[error("Invalid window policy for tier '{tier}': {reason}")]
    InvalidPolicy {
        /// The tier the policy belongs to.
        tier: String,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// The default tier has no policy.
    #[error("Default tier '{0}' has no window policy")]
    UnknownDefaultTier(String),
}
