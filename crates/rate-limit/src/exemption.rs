use std::collections::BTreeSet;

use config::ExemptionConfig;

/// Predicates that let a request skip admission entirely.
#[derive(Debug, Clone, Default)]
pub struct ExemptionRules {
    roles: BTreeSet<String>,
    paths: BTreeSet<String>,
    methods: BTreeSet<String>,
}

impl ExemptionRules {
    /// Builds the rules from configuration. Methods compare case-insensitively.
    pub fn from_config(config: &ExemptionConfig) -> Self {
        Self {
            roles: config.roles.clone(),
            paths: config.paths.clone(),
            methods: config.methods.iter().map(|m| m.to_ascii_uppercase()).collect(),
        }
    }

    /// Adds a path that is never metered.
    pub fn exempt_path(&mut self, path: impl Into<String>) {
        self.paths.insert(path.into());
    }

    /// Whether a request with this method, path and caller role is exempt.
    pub fn is_exempt(&self, method: &str, path: &str, role: Option<&str>) -> bool {
        if role.is_some_and(|role| self.roles.contains(role)) {
            return true;
        }

        if self.methods.contains(&method.to_ascii_uppercase()) {
            return true;
        }

        let path = match path.trim_end_matches('/') {
            "" => "/",
            trimmed => trimmed,
        };

        self.paths.contains(path)
    }
}
