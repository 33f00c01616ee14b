//! API credentials. Immutable per exchange instance, never logged.

use std::fmt;

/// API key material for one venue.
///
/// The secret (and passphrase) are deliberately excluded from the
/// `Debug` output so credentials can never leak through logging.
#[derive(Clone)]
pub struct Credentials {
    api_key: String,
    secret: String,
    passphrase: Option<String>,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, secret: impl Into<String>) -> Self {
        Credentials {
            api_key: api_key.into(),
            secret: secret.into(),
            passphrase: None,
        }
    }

    /// Some venues require a third credential component
    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = Some(passphrase.into());
        self
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn secret(&self) -> &[u8] {
        self.secret.as_bytes()
    }

    pub fn passphrase(&self) -> Option<&str> {
        self.passphrase.as_deref()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("secret", &"<redacted>")
            .field(
                "passphrase",
                &self.passphrase.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}
