//! Certificate selection rules shared by reader and writer.

use chrono::{DateTime, Utc};

use crate::certificate::CertificateInfo;
use crate::identity::Identity;

/// Whether the certificate's subject common name belongs to `identity`.
pub fn subject_matches(info: &CertificateInfo, identity: &Identity) -> bool {
    info.common_name
        .as_deref()
        .is_some_and(|cn| identity.matches(cn))
}

/// Whether the certificate has not yet expired at `now`.
///
/// `not_before` is not checked: certificates are used right after issue.
pub fn is_unexpired(info: &CertificateInfo, now: DateTime<Utc>) -> bool {
    now < info.not_after
}

/// Subject matches and the certificate is still valid at `now`.
pub fn is_active_for(info: &CertificateInfo, identity: &Identity, now: DateTime<Utc>) -> bool {
    subject_matches(info, identity) && is_unexpired(info, now)
}
