//! Credentials used to bind to the directory.

use secrecy::{ExposeSecret, SecretString};
use std::fmt;

/// Simple-bind credentials for the directory service account.
///
/// The password is held in a [`SecretString`] so it is zeroized on drop and redacted from
/// `Debug` output.
pub struct BindCredentials {
    bind_dn: String,
    password: SecretString,
}

impl BindCredentials {
    /// Creates new bind credentials.
    #[must_use]
    pub fn new(bind_dn: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            bind_dn: bind_dn.into(),
            password: SecretString::from(password.into()),
        }
    }

    /// Get the LDAP bind DN.
    #[must_use]
    pub fn bind_dn(&self) -> &str {
        &self.bind_dn
    }

    /// Get the LDAP bind password.
    #[must_use]
    pub fn bind_password(&self) -> &str {
        self.password.expose_secret()
    }
}

impl fmt::Debug for BindCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindCredentials")
            .field("bind_dn", &self.bind_dn)
            .field("password", &"[REDACTED]")
            .finish()
    }
}
