//! Vault configuration.

use crate::bundle::KeyStorageFlags;
use crate::payload::OaepDigest;

/// How a write replaces certificates already filed under the identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplaceStrategy {
    /// Remove old certificates, then add the new one. The identity has no
    /// certificate between the two steps, and a failed add is not rolled back.
    #[default]
    RemoveThenAdd,

    /// Add the new certificate, then remove the old ones. The identity briefly
    /// has more than one certificate instead.
    AddThenRemove,
}

/// Vault configuration.
#[derive(Debug, Clone)]
pub struct VaultConfig {
    /// RSA modulus size for generated keys.
    pub key_bits: usize,

    /// Certificate validity in months.
    pub validity_months: u32,

    /// OAEP digest for the token payload. Reader and writer must agree.
    pub oaep_digest: OaepDigest,

    pub replace_strategy: ReplaceStrategy,

    /// Key storage flag combinations tried when importing a bundle.
    pub storage_attempts: Vec<KeyStorageFlags>,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            key_bits: 2048,
            validity_months: 12,
            oaep_digest: OaepDigest::Sha1,
            replace_strategy: ReplaceStrategy::RemoveThenAdd,
            storage_attempts: KeyStorageFlags::default_attempts(),
        }
    }
}
