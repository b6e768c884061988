//! Token storage: fresh keypair, self-signed certificate, encrypted payload.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rsa::RsaPublicKey;
use tracing::{debug, info, warn};

use crate::bundle::{
    CertificateBundler, CredentialBundle, KeyImport, SoftwareKeyImport, BUNDLE_PASSPHRASE,
};
use crate::certificate;
use crate::config::{ReplaceStrategy, VaultConfig};
use crate::error::{Result, VaultError};
use crate::identity::Identity;
use crate::matching;
use crate::payload::{self, OaepDigest};
use crate::store::{CredentialStore, InstalledCertificate, OpenMode, StoreSession};

/// Writes tokens into freshly issued certificates.
pub struct TokenWriter {
    store: Arc<dyn CredentialStore>,
    importer: Arc<dyn KeyImport>,
    bundler: CertificateBundler,
    key_bits: usize,
    validity_months: u32,
    oaep_digest: OaepDigest,
    replace_strategy: ReplaceStrategy,
}

impl TokenWriter {
    pub fn new(store: Arc<dyn CredentialStore>, config: &VaultConfig) -> Self {
        Self {
            store,
            importer: Arc::new(SoftwareKeyImport),
            bundler: CertificateBundler::new(config.storage_attempts.clone()),
            key_bits: config.key_bits,
            validity_months: config.validity_months,
            oaep_digest: config.oaep_digest,
            replace_strategy: config.replace_strategy,
        }
    }

    /// Use a different platform import step for bundles.
    pub fn with_importer(mut self, importer: Arc<dyn KeyImport>) -> Self {
        self.importer = importer;
        self
    }

    /// Store `token` for `identity`, replacing any previous certificate.
    ///
    /// Returns the thumbprint of the installed certificate.
    pub fn write(&self, identity: &str, token: &str) -> Result<String> {
        self.write_at(identity, token, Utc::now())
    }

    /// Same as [`write`](Self::write) with an explicit issue time.
    pub fn write_at(
        &self,
        identity: &str,
        token: &str,
        issued_at: DateTime<Utc>,
    ) -> Result<String> {
        if token.is_empty() {
            return Err(VaultError::MissingToken);
        }
        let identity = Identity::new(identity)?;

        let installable = self.issue(&identity, token, issued_at)?;
        let thumbprint = installable.thumbprint().to_string();

        let mut session = self.store.open(OpenMode::ReadWrite)?;
        let removed = match self.replace_strategy {
            ReplaceStrategy::RemoveThenAdd => {
                let removed = remove_matching(&mut *session, &identity, None)?;
                session.add(&installable)?;
                removed
            }
            ReplaceStrategy::AddThenRemove => {
                session.add(&installable)?;
                remove_matching(&mut *session, &identity, Some(thumbprint.as_str()))?
            }
        };
        info!(%identity, %thumbprint, removed, store = %self.store.id(), "certificate installed");

        Ok(thumbprint)
    }

    /// Remove every certificate filed under `identity`.
    pub fn remove(&self, identity: &str) -> Result<usize> {
        let identity = Identity::new(identity)?;
        let mut session = self.store.open(OpenMode::ReadWrite)?;
        let removed = remove_matching(&mut *session, &identity, None)?;
        info!(%identity, removed, store = %self.store.id(), "certificates removed");
        Ok(removed)
    }

    /// Build the installable certificate without touching the store.
    fn issue(
        &self,
        identity: &Identity,
        token: &str,
        issued_at: DateTime<Utc>,
    ) -> Result<InstalledCertificate> {
        let key = certificate::generate_private_key(self.key_bits)?;
        debug!(%identity, bits = self.key_bits, "key pair generated");

        let ciphertext =
            payload::encrypt_token(&RsaPublicKey::from(&key), self.oaep_digest, token)?;
        let extension = payload::encode_payload(&ciphertext)?;

        let issued = certificate::build_self_signed(
            identity,
            &key,
            extension,
            issued_at,
            self.validity_months,
        )?;
        debug!(%identity, not_after = %issued.not_after, "certificate signed");

        let bundle =
            CredentialBundle::seal(&issued.der, &key, BUNDLE_PASSPHRASE, identity.as_str())?;
        drop(key);

        Ok(self
            .bundler
            .from_bundle(self.importer.as_ref(), &bundle, BUNDLE_PASSPHRASE)?)
    }
}

/// Remove certificates whose subject matches `identity`, except `keep`.
fn remove_matching(
    session: &mut (dyn StoreSession + '_),
    identity: &Identity,
    keep: Option<&str>,
) -> Result<usize> {
    let mut removed = 0;

    for cert in session.certificates()? {
        if keep == Some(cert.thumbprint()) {
            continue;
        }

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

        if matching::subject_matches(&info, identity) && session.remove(cert.thumbprint())? {
            debug!(%identity, thumbprint = %cert.thumbprint(), "previous certificate removed");
            removed += 1;
        }
    }

    Ok(removed)
}
