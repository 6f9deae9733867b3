/// Identity used when neither a user nor a network address is known.
pub const ANONYMOUS: &str = "anonymous";

/// What admission knows about the caller of a single request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerContext {
    /// Identity the tier counter is keyed by.
    pub identity: String,
    /// Network-level identity the burst counter is keyed by.
    pub network_identity: String,
    /// Tier claimed by the caller, if any.
    pub tier: Option<String>,
    /// Role of the caller, if any.
    pub role: Option<String>,
    /// Whether the request skips admission.
    pub is_exempt: bool,
}

impl CallerContext {
    /// Creates a new builder.
    pub fn builder() -> CallerContextBuilder {
        CallerContextBuilder::default()
    }
}

/// Builder for [`CallerContext`].
#[derive(Debug, Default)]
pub struct CallerContextBuilder {
    identity: Option<String>,
    network_identity: Option<String>,
    tier: Option<String>,
    role: Option<String>,
    is_exempt: bool,
}

impl CallerContextBuilder {
    /// Sets the caller identity.
    pub fn identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    /// Sets the network identity, usually the client IP address.
    pub fn network_identity(mut self, network_identity: impl Into<String>) -> Self {
        self.network_identity = Some(network_identity.into());
        self
    }

    /// Sets the claimed tier.
    pub fn tier(mut self, tier: impl Into<String>) -> Self {
        self.tier = Some(tier.into());
        self
    }

    /// Sets the caller role.
    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Marks the request as exempt.
    pub fn exempt(mut self, is_exempt: bool) -> Self {
        self.is_exempt = is_exempt;
        self
    }

    /// Builds the context. Missing identities fall back to each other, then to
    /// [`ANONYMOUS`].
    pub fn build(self) -> CallerContext {
        let network_identity = self.network_identity.unwrap_or_else(|| ANONYMOUS.to_string());
        let identity = self.identity.unwrap_or_else(|| network_identity.clone());

        CallerContext {
            identity,
            network_identity,
            tier: self.tier,
            role: self.role,
            is_exempt: self.is_exempt,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_falls_back_to_network_identity() {
        let context = CallerContext::builder().network_identity("10.0.0.1").build();

        assert_eq!(context.identity, "10.0.0.1");
        assert_eq!(context.network_identity, "10.0.0.1");
    }

    #[test]
    fn unknown_caller_is_anonymous() {
        let context = CallerContext::builder().build();

        assert_eq!(context.identity, ANONYMOUS);
        assert_eq!(context.network_identity, ANONYMOUS);
        assert!(!context.is_exempt);
    }
}
