//! Error types for certstash.

use thiserror::Error;

/// Errors raised while generating keys or building and parsing certificates.
#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("failed to generate key pair: {0}")]
    KeyGeneration(String),

    #[error("failed to encode private key: {0}")]
    KeyEncoding(String),

    #[error("invalid certificate parameters: {0}")]
    InvalidParams(String),

    #[error("failed to sign certificate: {0}")]
    SignError(String),

    #[error("failed to parse certificate: {0}")]
    ParseError(String),
}

/// Errors raised while packaging or unpacking a credential bundle.
#[derive(Debug, Error)]
pub enum BundleError {
    #[error("failed to seal bundle: {0}")]
    Seal(String),

    #[error("failed to parse bundle: {0}")]
    Parse(String),

    #[error("bundle integrity check failed (wrong passphrase or corrupt data)")]
    MacMismatch,

    #[error("bundle does not contain a certificate")]
    MissingCertificate,

    #[error("key storage flags {0} rejected: {1}")]
    Rejected(String, String),

    #[error("private key not retrievable from imported certificate")]
    KeyUnavailable,

    #[error("private key does not match certificate public key")]
    KeyMismatch,

    #[error("no storage flag combination accepted the bundle after {attempts} attempts: {last}")]
    Exhausted {
        attempts: usize,
        #[source]
        last: Box<BundleError>,
    },
}

/// Errors raised by a credential store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store '{0}' is open read-only")]
    ReadOnly(String),

    #[error("store lock poisoned")]
    Poisoned,

    #[error("corrupt store entry '{entry}': {reason}")]
    Corrupt { entry: String, reason: String },
}

/// Top-level errors for token read and write operations.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Write was called without a token.
    #[error("a non-empty token is required")]
    MissingToken,

    /// Identity cannot be used as a certificate subject.
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    /// Encryption or decryption of the payload failed.
    #[error("cryptographic failure: {0}")]
    Crypto(String),

    #[error(transparent)]
    Certificate(#[from] CertificateError),

    #[error(transparent)]
    Bundle(#[from] BundleError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result alias for vault operations.
pub type Result<T, E = VaultError> = std::result::Result<T, E>;
