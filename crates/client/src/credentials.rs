use std::sync::{PoisonError, RwLock};

use http::HeaderValue;
use secrecy::{ExposeSecret, SecretString};

/// Bearer token storage of a client.
#[derive(Debug, Default)]
pub struct Credentials {
    token: RwLock<Option<SecretString>>,
}

impl Credentials {
    /// Stores a token, replacing any previous one.
    pub fn set(&self, token: SecretString) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token);
    }

    /// Forgets the token. Returns whether one was stored.
    pub fn clear(&self) -> bool {
        self.token.write().unwrap_or_else(PoisonError::into_inner).take().is_some()
    }

    /// Whether a token is stored.
    pub fn is_present(&self) -> bool {
        self.token.read().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    /// The `Authorization` header value for the stored token.
    pub(crate) fn authorization(&self) -> Option<HeaderValue> {
        let token = self.token.read().unwrap_or_else(PoisonError::into_inner);
        let token = token.as_ref()?;

        let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret())).ok()?;
        value.set_sensitive(true);

        Some(value)
    }
}
