use std::collections::BTreeMap;

use config::AdmissionConfig;

use crate::{CallerContext, RateLimitError, WindowPolicy};

/// Maps callers to the window policy of their tier.
#[derive(Debug, Clone)]
pub struct TierResolver {
    policies: BTreeMap<String, WindowPolicy>,
    default_policy: WindowPolicy,
}

impl TierResolver {
    /// Creates a resolver. `default_tier` must be one of the given policies.
    pub fn new(
        policies: impl IntoIterator<Item = WindowPolicy>,
        default_tier: &str,
    ) -> Result<Self, RateLimitError> {
        let policies: BTreeMap<_, _> = policies
            .into_iter()
            .map(|policy| (policy.tier().to_string(), policy))
            .collect();

        let default_policy = policies
            .get(default_tier)
            .cloned()
            .ok_or_else(|| RateLimitError::UnknownDefaultTier(default_tier.to_string()))?;

        Ok(Self {
            policies,
            default_policy,
        })
    }

    /// Builds the resolver from the configured tier table.
    pub fn from_config(config: &AdmissionConfig) -> Result<Self, RateLimitError> {
        let policies = config
            .tiers
            .iter()
            .map(|(tier, tier_config)| WindowPolicy::from_tier(tier, tier_config))
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(policies, &config.default_tier)
    }

    /// The policy for the caller, or `None` when the caller bypasses admission.
    ///
    /// Callers claiming no tier or an unknown one get the default tier.
    pub fn resolve(&self, context: &CallerContext) -> Option<&WindowPolicy> {
        if context.is_exempt {
            return None;
        }

        let Some(tier) = context.tier.as_deref() else {
            return Some(&self.default_policy);
        };

        match self.policies.get(tier) {
            Some(policy) => Some(policy),
            None => {
                log::debug!("Unknown tier '{tier}' claimed by caller, using '{}'", self.default_policy.tier());
                Some(&self.default_policy)
            }
        }
    }

    /// The policy used for callers without a known tier.
    pub fn default_policy(&self) -> &WindowPolicy {
        &self.default_policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> TierResolver {
        TierResolver::from_config(&AdmissionConfig::default()).unwrap()
    }

    #[test]
    fn known_tier_resolves_to_its_policy() {
        let context = CallerContext::builder().identity("u1").tier("premium").build();
        let policy = resolver().resolve(&context).cloned().unwrap();

        assert_eq!(policy.tier(), "premium");
        assert_eq!(policy.limit(), 1000);
    }

    #[test]
    fn missing_or_unknown_tier_uses_default() {
        let resolver = resolver();

        let anonymous = CallerContext::builder().build();
        let unknown = CallerContext::builder().tier("platinum").build();

        assert_eq!(resolver.resolve(&anonymous).map(WindowPolicy::tier), Some("free"));
        assert_eq!(resolver.resolve(&unknown).map(WindowPolicy::tier), Some("free"));
    }

    #[test]
    fn exempt_callers_have_no_policy() {
        let context = CallerContext::builder().tier("premium").exempt(true).build();
        assert_eq!(resolver().resolve(&context), None);
    }

    #[test]
    fn default_tier_must_exist() {
        let policy = WindowPolicy::new("free", std::time::Duration::from_secs(1), 1, "Free").unwrap();
        let error = TierResolver::new([policy], "gold").unwrap_err();

        assert_eq!(error.to_string(), "Default tier 'gold' has no window policy");
    }
}
