//! Bind credentials for directory connections.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

/// Credentials used for the initial simple bind.
///
/// The password is held in a [`SecretString`] so it is redacted from `Debug`
/// output and never serialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryCredentials {
    /// Distinguished name to bind as.
    pub bind_dn: String,

    /// Bind password.
    #[serde(skip_serializing)]
    pub bind_password: SecretString,
}

impl DirectoryCredentials {
    /// Creates new bind credentials.
    #[must_use]
    pub fn new(bind_dn: impl Into<String>, bind_password: impl Into<String>) -> Self {
        Self {
            bind_dn: bind_dn.into(),
            bind_password: SecretString::from(bind_password.into()),
        }
    }

    /// Returns the bind distinguished name.
    #[must_use]
    pub fn bind_dn(&self) -> &str {
        &self.bind_dn
    }

    /// Exposes the bind password for handing to the native client.
    #[must_use]
    pub fn bind_password(&self) -> &str {
        self.bind_password.expose_secret()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_return_configured_values() {
        let creds = DirectoryCredentials::new("cn=admin,dc=example,dc=com", "secret");
        assert_eq!(creds.bind_dn(), "cn=admin,dc=example,dc=com");
        assert_eq!(creds.bind_password(), "secret");
    }

    #[test]
    fn debug_redacts_password() {
        let creds = DirectoryCredentials::new("cn=admin,dc=example,dc=com", "secret");
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("cn=admin"));
        assert!(!rendered.contains("secret"));
    }

    #[test]
    fn serialization_skips_password() {
        let creds = DirectoryCredentials::new("cn=admin,dc=example,dc=com", "secret");
        let json = serde_json::to_string(&creds).unwrap();
        assert!(json.contains("cn=admin"));
        assert!(!json.contains("secret"));
    }
}
