//! Credential bundles and conversion into installable certificates.
//!
//! A bundle is a PKCS#12 container holding the certificate and its private
//! key under a fixed internal passphrase. The passphrase only satisfies the
//! container format; confidentiality comes from the credential store.

use std::fmt;

use p12::PFX;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey};
use rsa::RsaPrivateKey;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::certificate::CertificateInfo;
use crate::error::BundleError;
use crate::store::InstalledCertificate;

/// Passphrase protecting bundles. Not a user secret.
pub const BUNDLE_PASSPHRASE: &str = "certstash-bundle";

/// Where an imported private key is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyScope {
    User,
    Machine,
}

/// Private-key storage options requested when importing a bundle.
///
/// `scope: None` leaves the choice to the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct KeyStorageFlags {
    pub scope: Option<KeyScope>,
    pub exportable: bool,
    pub persist: bool,
}

impl KeyStorageFlags {
    pub const USER_EXPORTABLE_PERSIST: Self = Self {
        scope: Some(KeyScope::User),
        exportable: true,
        persist: true,
    };

    pub const MACHINE_EXPORTABLE_PERSIST: Self = Self {
        scope: Some(KeyScope::Machine),
        exportable: true,
        persist: true,
    };

    pub const EXPORTABLE: Self = Self {
        scope: None,
        exportable: true,
        persist: false,
    };

    pub const PLATFORM_DEFAULT: Self = Self {
        scope: None,
        exportable: false,
        persist: false,
    };

    /// Combinations tried in order until one yields a usable private key.
    pub fn default_attempts() -> Vec<Self> {
        vec![
            Self::USER_EXPORTABLE_PERSIST,
            Self::MACHINE_EXPORTABLE_PERSIST,
            Self::EXPORTABLE,
            Self::PLATFORM_DEFAULT,
        ]
    }
}

impl fmt::Display for KeyStorageFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        match self.scope {
            Some(KeyScope::User) => parts.push("user"),
            Some(KeyScope::Machine) => parts.push("machine"),
            None => {}
        }
        if self.exportable {
            parts.push("exportable");
        }
        if self.persist {
            parts.push("persist");
        }
        if parts.is_empty() {
            parts.push("default");
        }
        write!(f, "{}", parts.join("|"))
    }
}

/// A certificate and its private key sealed in a PKCS#12 container.
#[derive(Clone)]
pub struct CredentialBundle {
    bytes: Vec<u8>,
}

impl CredentialBundle {
    /// Seal a certificate and its private key under `passphrase`.
    pub fn seal(
        cert_der: &[u8],
        key: &RsaPrivateKey,
        passphrase: &str,
        friendly_name: &str,
    ) -> Result<Self, BundleError> {
        let key_der = key
            .to_pkcs8_der()
            .map_err(|e| BundleError::Seal(e.to_string()))?;

        let pfx = PFX::new(cert_der, key_der.as_bytes(), None, passphrase, friendly_name)
            .ok_or_else(|| BundleError::Seal("PKCS#12 encoding failed".to_string()))?;

        Ok(Self {
            bytes: pfx.to_der(),
        })
    }

    /// Wrap previously sealed bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Unpack the certificate DER and private key (if any).
    pub fn open(
        &self,
        passphrase: &str,
    ) -> Result<(Vec<u8>, Option<RsaPrivateKey>), BundleError> {
        let pfx = PFX::parse(&self.bytes).map_err(|e| BundleError::Parse(format!("{:?}", e)))?;

        if !pfx.verify_mac(passphrase) {
            return Err(BundleError::MacMismatch);
        }

        let cert_der = pfx
            .cert_x509_bags(passphrase)
            .map_err(|e| BundleError::Parse(format!("{:?}", e)))?
            .into_iter()
            .next()
            .ok_or(BundleError::MissingCertificate)?;

        let key_bags = Zeroizing::new(
            pfx.key_bags(passphrase)
                .map_err(|e| BundleError::Parse(format!("{:?}", e)))?,
        );

        let key = match key_bags.first() {
            Some(der) => Some(
                RsaPrivateKey::from_pkcs8_der(der)
                    .map_err(|e| BundleError::Parse(e.to_string()))?,
            ),
            None => None,
        };

        Ok((cert_der, key))
    }
}

impl fmt::Debug for CredentialBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialBundle")
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Platform step that turns a bundle into a store-installable certificate
/// under the requested key storage flags.
pub trait KeyImport: Send + Sync {
    fn import(
        &self,
        bundle: &CredentialBundle,
        passphrase: &str,
        flags: KeyStorageFlags,
    ) -> Result<InstalledCertificate, BundleError>;
}

/// Import performed entirely in process; accepts every flag combination.
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftwareKeyImport;

impl KeyImport for SoftwareKeyImport {
    fn import(
        &self,
        bundle: &CredentialBundle,
        passphrase: &str,
        flags: KeyStorageFlags,
    ) -> Result<InstalledCertificate, BundleError> {
        let (der, key) = bundle.open(passphrase)?;
        Ok(InstalledCertificate::new(der, key, flags))
    }
}

/// Converts bundles into installable certificates, trying an ordered list of
/// key storage flag combinations.
#[derive(Debug, Clone)]
pub struct CertificateBundler {
    attempts: Vec<KeyStorageFlags>,
}

impl Default for CertificateBundler {
    fn default() -> Self {
        Self::new(KeyStorageFlags::default_attempts())
    }
}

impl CertificateBundler {
    pub fn new(attempts: Vec<KeyStorageFlags>) -> Self {
        Self { attempts }
    }

    pub fn attempts(&self) -> &[KeyStorageFlags] {
        &self.attempts
    }

    /// Import `bundle`, returning the first attempt whose private key is
    /// actually retrievable and belongs to the certificate.
    pub fn from_bundle(
        &self,
        importer: &dyn KeyImport,
        bundle: &CredentialBundle,
        passphrase: &str,
    ) -> Result<InstalledCertificate, BundleError> {
        let mut last = None;

        for (attempt, flags) in self.attempts.iter().enumerate() {
            let result = importer
                .import(bundle, passphrase, *flags)
                .and_then(verify_private_key);

            match result {
                Ok(cert) => {
                    debug!(attempt = attempt + 1, flags = %flags, "bundle imported");
                    return Ok(cert);
                }
                Err(e) => {
                    warn!(
                        attempt = attempt + 1,
                        flags = %flags,
                        error = %e,
                        "bundle import attempt failed"
                    );
                    last = Some(e);
                }
            }
        }

        let last = last.unwrap_or_else(|| {
            BundleError::Rejected(
                "<none>".to_string(),
                "no storage flag combinations configured".to_string(),
            )
        });

        Err(BundleError::Exhausted {
            attempts: self.attempts.len(),
            last: Box::new(last),
        })
    }
}

fn verify_private_key(cert: InstalledCertificate) -> Result<InstalledCertificate, BundleError> {
    let key = cert.private_key().ok_or(BundleError::KeyUnavailable)?;
    let info =
        CertificateInfo::parse(cert.der()).map_err(|e| BundleError::Parse(e.to_string()))?;

    if !info.matches_key(key) {
        return Err(BundleError::KeyMismatch);
    }

    Ok(cert)
}
