//! Encrypted token payload carried in a certificate extension.
//!
//! The extension value is `[4-byte header][ciphertext]`. The header is a DER
//! OCTET STRING tag with a two-byte long-form length, so the value stays
//! well-formed for parsers that decode the reused extension.

use rand::rngs::OsRng;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use zeroize::{Zeroize, Zeroizing};

use crate::error::VaultError;
use crate::secret::SecretToken;

/// Extension OID reused to carry the payload (id-ce-subjectKeyIdentifier).
///
/// Certificates are issued without `IsCa`, so the builder never emits its own
/// subject key identifier and the slot is free.
pub const PAYLOAD_EXTENSION_OID: &[u64] = &[2, 5, 29, 14];

/// Length of the fixed header in front of the ciphertext.
pub const PAYLOAD_HEADER_LEN: usize = 4;

const OCTET_STRING_TAG: u8 = 0x04;
const LONG_FORM_TWO_BYTES: u8 = 0x82;

/// Digest used with OAEP padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OaepDigest {
    /// Compatible with previously stored certificates.
    #[default]
    Sha1,
    Sha256,
}

impl OaepDigest {
    fn padding(self) -> Oaep {
        match self {
            OaepDigest::Sha1 => Oaep::new::<sha1::Sha1>(),
            OaepDigest::Sha256 => Oaep::new::<sha2::Sha256>(),
        }
    }
}

fn header_for(ciphertext_len: usize) -> Option<[u8; PAYLOAD_HEADER_LEN]> {
    let len = u16::try_from(ciphertext_len).ok()?;
    let [hi, lo] = len.to_be_bytes();
    Some([OCTET_STRING_TAG, LONG_FORM_TWO_BYTES, hi, lo])
}

/// Encrypt `token` under `public_key`.
pub fn encrypt_token(
    public_key: &RsaPublicKey,
    digest: OaepDigest,
    token: &str,
) -> Result<Vec<u8>, VaultError> {
    let ciphertext = public_key
        .encrypt(&mut OsRng, digest.padding(), token.as_bytes())
        .map_err(|e| VaultError::Crypto(format!("encryption failed: {}", e)))?;

    if ciphertext.is_empty() {
        return Err(VaultError::Crypto(
            "encryption produced no output".to_string(),
        ));
    }

    Ok(ciphertext)
}

/// Prefix the ciphertext with the header, producing the raw extension value.
pub fn encode_payload(ciphertext: &[u8]) -> Result<Vec<u8>, VaultError> {
    let header = header_for(ciphertext.len()).ok_or_else(|| {
        VaultError::Crypto(format!(
            "ciphertext of {} bytes does not fit the payload header",
            ciphertext.len()
        ))
    })?;

    let mut value = Vec::with_capacity(PAYLOAD_HEADER_LEN + ciphertext.len());
    value.extend_from_slice(&header);
    value.extend_from_slice(ciphertext);
    Ok(value)
}

/// Strip the header from a raw extension value.
///
/// Returns `Ok(None)` when the value is shorter than the header, and an
/// error when the header does not describe the remaining bytes.
pub fn strip_header(raw: &[u8]) -> Result<Option<&[u8]>, VaultError> {
    if raw.len() < PAYLOAD_HEADER_LEN {
        return Ok(None);
    }

    let (header, ciphertext) = raw.split_at(PAYLOAD_HEADER_LEN);
    match header_for(ciphertext.len()) {
        Some(expected) if expected == header => Ok(Some(ciphertext)),
        _ => Err(VaultError::Crypto("payload header mismatch".to_string())),
    }
}

/// Decrypt a ciphertext with the certificate's private key.
pub fn decrypt_token(
    private_key: &RsaPrivateKey,
    digest: OaepDigest,
    ciphertext: &[u8],
) -> Result<SecretToken, VaultError> {
    let mut plaintext = Zeroizing::new(
        private_key
            .decrypt(digest.padding(), ciphertext)
            .map_err(|e| VaultError::Crypto(format!("decryption failed: {}", e)))?,
    );

    let bytes = std::mem::take(&mut *plaintext);
    match String::from_utf8(bytes) {
        Ok(token) => Ok(SecretToken::new(token)),
        Err(e) => {
            e.into_bytes().zeroize();
            Err(VaultError::Crypto(
                "decrypted payload is not valid UTF-8".to_string(),
            ))
        }
    }
}
