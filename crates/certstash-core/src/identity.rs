//! Identity names that credentials are filed under.

use std::fmt;

use crate::error::VaultError;

/// The human-readable name a credential is filed under.
///
/// Maps 1:1 to the certificate subject `CN=<name>`. Comparison against a
/// stored common name is case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity(String);

impl Identity {
    /// Create a new Identity, rejecting names that cannot form a subject.
    pub fn new(name: impl Into<String>) -> Result<Self, VaultError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(VaultError::InvalidIdentity(
                "identity cannot be empty".to_string(),
            ));
        }
        if name.contains('\0') {
            return Err(VaultError::InvalidIdentity(
                "identity cannot contain NUL".to_string(),
            ));
        }
        Ok(Self(name))
    }

    /// Get the inner string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The distinguished name rendered the way it appears on the certificate.
    pub fn subject(&self) -> String {
        format!("CN={}", self.0)
    }

    /// Whether a certificate common name belongs to this identity.
    pub fn matches(&self, common_name: &str) -> bool {
        self.0 == common_name || self.0.to_lowercase() == common_name.to_lowercase()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<&str> for Identity {
    type Error = VaultError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl TryFrom<String> for Identity {
    type Error = VaultError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}
