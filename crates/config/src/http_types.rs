//! Header names read from the configuration.

use std::ops::Deref;

use serde::Deserialize;

/// A request header name, validated and lowercased when the configuration is loaded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub struct HeaderName(http::HeaderName);

impl HeaderName {
    /// Wraps a lowercase header name known at compile time.
    pub fn from_static(name: &'static str) -> Self {
        Self(http::HeaderName::from_static(name))
    }
}

impl TryFrom<String> for HeaderName {
    type Error = String;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        http::HeaderName::try_from(name.as_str())
            .map(Self)
            .map_err(|e| format!("invalid header name '{name}': {e}"))
    }
}

impl Deref for HeaderName {
    type Target = http::HeaderName;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::HeaderName;

    #[derive(Debug, Deserialize)]
    struct Identity {
        header: HeaderName,
    }

    #[test]
    fn header_names_are_lowercased() {
        let identity: Identity = toml::from_str(r#"header = "X-User-Tier""#).unwrap();
        assert_eq!(identity.header.as_str(), "x-user-tier");
    }

    #[test]
    fn invalid_header_names_are_rejected() {
        let error = toml::from_str::<Identity>(r#"header = "x user""#).unwrap_err();
        assert!(error.to_string().contains("invalid header name 'x user'"));
    }
}
