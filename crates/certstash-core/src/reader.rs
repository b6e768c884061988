//! Token recovery from the credential store.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::certificate::CertificateInfo;
use crate::config::VaultConfig;
use crate::error::Result;
use crate::identity::Identity;
use crate::matching;
use crate::payload::{self, OaepDigest};
use crate::secret::SecretToken;
use crate::store::{CredentialStore, InstalledCertificate, OpenMode};

/// Summary of a stored certificate, without any secret material.
#[derive(Debug, Clone, Serialize)]
pub struct CertificateSummary {
    pub identity: Option<String>,
    pub thumbprint: String,
    pub serial: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub expired: bool,
    pub has_private_key: bool,
    pub has_payload: bool,
}

/// Reads tokens hidden in certificates.
pub struct TokenReader {
    store: Arc<dyn CredentialStore>,
    oaep_digest: OaepDigest,
}

impl TokenReader {
    pub fn new(store: Arc<dyn CredentialStore>, config: &VaultConfig) -> Self {
        Self {
            store,
            oaep_digest: config.oaep_digest,
        }
    }

    /// Recover the token stored for `identity`.
    ///
    /// Returns `Ok(None)` when no unexpired certificate with a private key
    /// and a payload exists for the identity. An empty or otherwise invalid
    /// identity is an error (`VaultError::InvalidIdentity`), not a miss.
    pub fn read(&self, identity: &str) -> Result<Option<SecretToken>> {
        self.read_at(identity, Utc::now())
    }

    /// Same as [`read`](Self::read) with an explicit current time.
    pub fn read_at(&self, identity: &str, now: DateTime<Utc>) -> Result<Option<SecretToken>> {
        let identity = Identity::new(identity)?;

        let session = self.store.open(OpenMode::ReadOnly)?;
        let certificates = session.certificates()?;
        drop(session);

        let mut candidates: Vec<(CertificateInfo, &InstalledCertificate)> = certificates
            .iter()
            .filter_map(|cert| match cert.info() {
                Ok(info) => Some((info, cert)),
                Err(e) => {
                    warn!(
                        thumbprint = %cert.thumbprint(),
                        error = %e,
                        "skipping unparseable certificate"
                    );
                    None
                }
            })
            .filter(|(info, _)| matching::is_active_for(info, &identity, now))
            .collect();

        // Newest first, so a staged replacement wins over the certificate it replaces
        candidates.sort_by(|a, b| b.0.not_before.cmp(&a.0.not_before));

        for (info, cert) in candidates {
            let Some(key) = cert.private_key() else {
                debug!(thumbprint = %cert.thumbprint(), "certificate has no usable private key");
                continue;
            };

            let Some(raw) = info.payload.as_deref() else {
                debug!(thumbprint = %cert.thumbprint(), "certificate has no payload extension");
                continue;
            };

            let Some(ciphertext) = payload::strip_header(raw)? else {
                debug!(thumbprint = %cert.thumbprint(), "payload shorter than header");
                continue;
            };

            let token = payload::decrypt_token(key, self.oaep_digest, ciphertext)?;
            info!(%identity, thumbprint = %cert.thumbprint(), "token recovered");
            return Ok(Some(token));
        }

        debug!(%identity, "no token found");
        Ok(None)
    }

    /// List every certificate in the store.
    pub fn list(&self) -> Result<Vec<CertificateSummary>> {
        let now = Utc::now();
        let session = self.store.open(OpenMode::ReadOnly)?;

        let mut summaries = Vec::new();
        for cert in session.certificates()? {
            let info = match cert.info() {
                Ok(info) => info,
                Err(e) => {
                    warn!(
                        thumbprint = %cert.thumbprint(),
                        error = %e,
                        "skipping unparseable certificate"
                    );
                    continue;
                }
            };

            summaries.push(CertificateSummary {
                expired: !matching::is_unexpired(&info, now),
                identity: info.common_name,
                thumbprint: cert.thumbprint().to_string(),
                serial: info.serial,
                not_before: info.not_before,
                not_after: info.not_after,
                has_private_key: cert.private_key().is_some(),
                has_payload: info.payload.is_some(),
            });
        }
        Ok(summaries)
    }
}
