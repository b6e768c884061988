//! certstash core
//!
//! Hides a connection token inside a self-signed certificate so it can be
//! kept in a credential store and recovered only by the holder of the
//! matching private key:
//! - [`TokenWriter`] generates a keypair and certificate carrying the
//!   encrypted token and installs it, replacing earlier ones
//! - [`TokenReader`] finds the unexpired certificate for an identity and
//!   decrypts the token
//!
//! The credential store is reached through the [`CredentialStore`] trait.

pub mod bundle;
pub mod certificate;
pub mod config;
pub mod error;
pub mod identity;
pub mod matching;
pub mod payload;
pub mod reader;
pub mod secret;
pub mod store;
pub mod writer;

// Re-export commonly used types
pub use bundle::{
    CertificateBundler, CredentialBundle, KeyImport, KeyScope, KeyStorageFlags, SoftwareKeyImport,
};
pub use config::{ReplaceStrategy, VaultConfig};
pub use error::{BundleError, CertificateError, StoreError, VaultError};
pub use identity::Identity;
pub use payload::OaepDigest;
pub use reader::{CertificateSummary, TokenReader};
pub use secret::SecretToken;
pub use store::{
    CredentialStore, FileStore, InstalledCertificate, MemoryStore, OpenMode, StoreId, StoreLocation,
    StoreSession,
};
pub use writer::TokenWriter;
