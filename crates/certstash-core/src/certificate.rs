//! Keypair generation and self-signed certificate handling.
//!
//! Uses rsa for key material, rcgen to build and sign certificates and
//! x509-parser to read them back.

use chrono::{DateTime, Months, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use rcgen::{
    CertificateParams, CustomExtension, DistinguishedName, DnType, IsCa, KeyPair,
    KeyUsagePurpose, SerialNumber, PKCS_RSA_SHA256,
};
use rsa::pkcs8::{DecodePublicKey, EncodePrivateKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use ::time::OffsetDateTime;
use x509_parser::prelude::*;

use crate::error::CertificateError;
use crate::identity::Identity;
use crate::payload::PAYLOAD_EXTENSION_OID;

/// Serial number length in bytes.
const SERIAL_LEN: usize = 16;

/// Generate a fresh RSA private key from the OS random source.
pub fn generate_private_key(bits: usize) -> Result<RsaPrivateKey, CertificateError> {
    RsaPrivateKey::new(&mut OsRng, bits).map_err(|e| CertificateError::KeyGeneration(e.to_string()))
}

/// Random positive serial number.
///
/// The top bit is cleared so the DER INTEGER is positive, and the next bit is
/// set so the value is never zero and always uses the full length.
fn random_serial() -> [u8; SERIAL_LEN] {
    let mut serial = [0u8; SERIAL_LEN];
    OsRng.fill_bytes(&mut serial);
    serial[0] = (serial[0] & 0x7f) | 0x40;
    serial
}

fn to_offset(at: DateTime<Utc>) -> Result<OffsetDateTime, CertificateError> {
    OffsetDateTime::from_unix_timestamp(at.timestamp())
        .map_err(|e| CertificateError::InvalidParams(format!("invalid timestamp: {}", e)))
}

/// A freshly signed certificate.
#[derive(Debug, Clone)]
pub struct IssuedCertificate {
    /// DER-encoded certificate.
    pub der: Vec<u8>,

    /// Start of the validity window.
    pub not_before: DateTime<Utc>,

    /// End of the validity window.
    pub not_after: DateTime<Utc>,
}

/// Build a self-signed certificate for `identity` carrying `payload` in the
/// payload extension, signed with SHA-256 RSA by `key`.
pub fn build_self_signed(
    identity: &Identity,
    key: &RsaPrivateKey,
    payload: Vec<u8>,
    issued_at: DateTime<Utc>,
    validity_months: u32,
) -> Result<IssuedCertificate, CertificateError> {
    let key_pem = key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| CertificateError::KeyEncoding(e.to_string()))?;
    let key_pair = KeyPair::from_pem_and_sign_algo(&key_pem, &PKCS_RSA_SHA256)
        .map_err(|e| CertificateError::KeyEncoding(e.to_string()))?;

    // Whole seconds so the parsed certificate compares equal
    let not_before = DateTime::from_timestamp(issued_at.timestamp(), 0).ok_or_else(|| {
        CertificateError::InvalidParams("issue time out of range".to_string())
    })?;
    let not_after = not_before
        .checked_add_months(Months::new(validity_months))
        .ok_or_else(|| CertificateError::InvalidParams("validity out of range".to_string()))?;

    let mut params = CertificateParams::default();

    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, identity.as_str());
    params.distinguished_name = dn;

    params.serial_number = Some(SerialNumber::from_slice(&random_serial()));
    params.not_before = to_offset(not_before)?;
    params.not_after = to_offset(not_after)?;
    params.is_ca = IsCa::NoCa;
    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyEncipherment,
        KeyUsagePurpose::DataEncipherment,
    ];
    params.custom_extensions = vec![CustomExtension::from_oid_content(
        PAYLOAD_EXTENSION_OID,
        payload,
    )];

    let cert = params
        .self_signed(&key_pair)
        .map_err(|e| CertificateError::SignError(e.to_string()))?;

    Ok(IssuedCertificate {
        der: cert.der().to_vec(),
        not_before,
        not_after,
    })
}

/// Fields read back from a stored certificate.
#[derive(Debug, Clone)]
pub struct CertificateInfo {
    /// Subject common name, if present.
    pub common_name: Option<String>,

    pub not_before: DateTime<Utc>,

    pub not_after: DateTime<Utc>,

    /// Serial number, hex encoded.
    pub serial: String,

    /// Raw value of the payload extension, if present.
    pub payload: Option<Vec<u8>>,

    /// DER SubjectPublicKeyInfo.
    pub public_key_der: Vec<u8>,
}

impl CertificateInfo {
    /// Parse a DER-encoded certificate.
    pub fn parse(der: &[u8]) -> Result<Self, CertificateError> {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|e| CertificateError::ParseError(format!("{:?}", e)))?;

        let common_name = cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|attr| attr.as_str().ok())
            .map(|s| s.to_string());

        let validity = cert.validity();
        let not_before = to_utc(validity.not_before.timestamp())?;
        let not_after = to_utc(validity.not_after.timestamp())?;

        let payload_oid = payload_oid_string();
        let payload = cert
            .extensions()
            .iter()
            .find(|ext| ext.oid.to_id_string() == payload_oid)
            .map(|ext| ext.value.to_vec());

        Ok(Self {
            common_name,
            not_before,
            not_after,
            serial: hex::encode(cert.raw_serial()),
            payload,
            public_key_der: cert.public_key().raw.to_vec(),
        })
    }

    /// Whether `key` is the private half of this certificate's public key.
    pub fn matches_key(&self, key: &RsaPrivateKey) -> bool {
        match RsaPublicKey::from_public_key_der(&self.public_key_der) {
            Ok(public) => public == RsaPublicKey::from(key),
            Err(_) => false,
        }
    }
}

fn to_utc(timestamp: i64) -> Result<DateTime<Utc>, CertificateError> {
    DateTime::from_timestamp(timestamp, 0).ok_or_else(|| {
        CertificateError::ParseError(format!("timestamp {} out of range", timestamp))
    })
}

fn payload_oid_string() -> String {
    PAYLOAD_EXTENSION_OID
        .iter()
        .map(|arc| arc.to_string())
        .collect::<Vec<_>>()
        .join(".")
}

/// SHA-256 thumbprint of a DER certificate (hex encoded).
pub fn thumbprint(der: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(der);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::encode_payload;
    use chrono::TimeZone;

    fn sample_payload() -> Vec<u8> {
        encode_payload(&[0xAB; 256]).unwrap()
    }

    fn issue(name: &str, payload: Vec<u8>) -> (RsaPrivateKey, IssuedCertificate) {
        let key = generate_private_key(2048).unwrap();
        let identity = Identity::new(name).unwrap();
        let issued_at = Utc.with_ymd_and_hms(2026, 3, 15, 10, 30, 5).unwrap();
        let cert = build_self_signed(&identity, &key, payload, issued_at, 12).unwrap();
        (key, cert)
    }

    #[test]
    fn test_build_and_parse() {
        let (key, cert) = issue("device-42", sample_payload());

        let info = CertificateInfo::parse(&cert.der).unwrap();
        assert_eq!(info.common_name.as_deref(), Some("device-42"));
        assert_eq!(
            info.not_before,
            Utc.with_ymd_and_hms(2026, 3, 15, 10, 30, 5).unwrap()
        );
        assert_eq!(
            info.not_after,
            Utc.with_ymd_and_hms(2027, 3, 15, 10, 30, 5).unwrap()
        );
        assert_eq!(info.not_after, cert.not_after);
        assert_eq!(info.payload, Some(sample_payload()));
        assert!(info.matches_key(&key));
    }

    #[test]
    fn test_serial_is_positive_and_random() {
        let (_, a) = issue("a", sample_payload());
        let (_, b) = issue("a", sample_payload());

        let a = CertificateInfo::parse(&a.der).unwrap();
        let b = CertificateInfo::parse(&b.der).unwrap();
        assert_ne!(a.serial, b.serial);

        let first = u8::from_str_radix(&a.serial[..2], 16).unwrap();
        assert!(first & 0x80 == 0);
        assert!(first != 0);
    }

    #[test]
    fn test_key_mismatch_detected() {
        let (_, cert) = issue("device-1", sample_payload());
        let other = generate_private_key(2048).unwrap();

        let info = CertificateInfo::parse(&cert.der).unwrap();
        assert!(!info.matches_key(&other));
    }

    #[test]
    fn test_parse_garbage_fails() {
        let result = CertificateInfo::parse(&[0x30, 0x03, 0x02, 0x01]);
        assert!(matches!(result, Err(CertificateError::ParseError(_))));
    }

    #[test]
    fn test_thumbprint_is_sha256_hex() {
        let tp = thumbprint(b"certificate");
        assert_eq!(tp.len(), 64);
        assert_eq!(tp, thumbprint(b"certificate"));
        assert_ne!(tp, thumbprint(b"certificatf"));
    }
}
