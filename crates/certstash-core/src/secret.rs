//! Plaintext token wrapper.

use std::fmt;

use zeroize::Zeroizing;

/// A recovered plaintext token.
///
/// The backing buffer is wiped when the value is dropped and `Debug`
/// never prints the contents.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretToken(Zeroizing<String>);

impl SecretToken {
    pub fn new(token: String) -> Self {
        Self(Zeroizing::new(token))
    }

    /// Borrow the plaintext.
    pub fn expose(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Debug for SecretToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretToken([REDACTED; {} bytes])", self.0.len())
    }
}
