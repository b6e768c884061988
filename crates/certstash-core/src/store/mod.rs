//! Credential store interface.
//!
//! The platform credential store is reached through [`CredentialStore`].
//! Opening a store yields a [`StoreSession`] which is released when dropped.

mod file;
mod memory;

use std::fmt;

use rsa::RsaPrivateKey;

use crate::bundle::KeyStorageFlags;
use crate::certificate::{self, CertificateInfo};
use crate::error::{CertificateError, StoreError};

pub use file::FileStore;
pub use memory::MemoryStore;

/// Which account a store belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StoreLocation {
    #[default]
    CurrentUser,
    LocalMachine,
}

impl StoreLocation {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreLocation::CurrentUser => "CurrentUser",
            StoreLocation::LocalMachine => "LocalMachine",
        }
    }
}

/// A store identified by name and location.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreId {
    pub name: String,
    pub location: StoreLocation,
}

impl StoreId {
    pub fn new(name: impl Into<String>, location: StoreLocation) -> Self {
        Self {
            name: name.into(),
            location,
        }
    }
}

impl Default for StoreId {
    fn default() -> Self {
        Self::new("My", StoreLocation::CurrentUser)
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\\{}", self.location.as_str(), self.name)
    }
}

/// Access mode for a store session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    ReadOnly,
    ReadWrite,
}

/// A certificate as held by a credential store, with its private key when
/// the store can provide one.
#[derive(Clone)]
pub struct InstalledCertificate {
    der: Vec<u8>,
    private_key: Option<RsaPrivateKey>,
    key_storage: KeyStorageFlags,
    thumbprint: String,
}

impl InstalledCertificate {
    pub fn new(
        der: Vec<u8>,
        private_key: Option<RsaPrivateKey>,
        key_storage: KeyStorageFlags,
    ) -> Self {
        let thumbprint = certificate::thumbprint(&der);
        Self {
            der,
            private_key,
            key_storage,
            thumbprint,
        }
    }

    /// DER-encoded certificate.
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    pub fn private_key(&self) -> Option<&RsaPrivateKey> {
        self.private_key.as_ref()
    }

    /// Flags the key was imported under. Stores that do not record them
    /// report `KeyStorageFlags::default()`.
    pub fn key_storage(&self) -> KeyStorageFlags {
        self.key_storage
    }

    /// SHA-256 thumbprint (hex).
    pub fn thumbprint(&self) -> &str {
        &self.thumbprint
    }

    /// Parse the certificate fields.
    pub fn info(&self) -> Result<CertificateInfo, CertificateError> {
        CertificateInfo::parse(&self.der)
    }
}

impl fmt::Debug for InstalledCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstalledCertificate")
            .field("thumbprint", &self.thumbprint)
            .field("has_private_key", &self.private_key.is_some())
            .field("key_storage", &self.key_storage)
            .finish()
    }
}

/// A platform credential store.
pub trait CredentialStore: Send + Sync {
    /// Name and location of this store.
    fn id(&self) -> &StoreId;

    /// Open a session. The session is closed when dropped.
    fn open(&self, mode: OpenMode) -> Result<Box<dyn StoreSession + '_>, StoreError>;
}

/// An open handle on a credential store.
pub trait StoreSession {
    fn mode(&self) -> OpenMode;

    /// Enumerate every certificate in the store.
    fn certificates(&self) -> Result<Vec<InstalledCertificate>, StoreError>;

    /// Install a certificate. Adding a certificate already present replaces it.
    fn add(&mut self, cert: &InstalledCertificate) -> Result<(), StoreError>;

    /// Remove the certificate with `thumbprint`. Returns whether it existed.
    fn remove(&mut self, thumbprint: &str) -> Result<bool, StoreError>;
}

pub(crate) fn require_writable(mode: OpenMode, id: &StoreId) -> Result<(), StoreError> {
    match mode {
        OpenMode::ReadWrite => Ok(()),
        OpenMode::ReadOnly => Err(StoreError::ReadOnly(id.to_string())),
    }
}
