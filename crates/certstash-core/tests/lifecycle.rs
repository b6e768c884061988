//! Integration tests: token write/read lifecycle against real stores.
//!
//! Exercises the path a device takes when it files its connection string and
//! later recovers it: keypair, certificate, bundle, store, decrypt.

use std::sync::Arc;

use chrono::{Duration, Months, Utc};

use certstash_core::{
    BundleError, CredentialBundle, CredentialStore, FileStore, InstalledCertificate, KeyImport,
    KeyScope, KeyStorageFlags, MemoryStore, OpenMode, SoftwareKeyImport, StoreId, TokenReader,
    TokenWriter, VaultConfig, VaultError,
};

const CONNECTION_STRING: &str = "HostName=hub.example;SharedAccessKey=abc123";

fn vault() -> (MemoryStore, TokenWriter, TokenReader) {
    let store = MemoryStore::default();
    let config = VaultConfig::default();
    let writer = TokenWriter::new(Arc::new(store.clone()), &config);
    let reader = TokenReader::new(Arc::new(store.clone()), &config);
    (store, writer, reader)
}

fn stored(store: &MemoryStore) -> Vec<InstalledCertificate> {
    store.open(OpenMode::ReadOnly).unwrap().certificates().unwrap()
}

fn read(reader: &TokenReader, identity: &str) -> Option<String> {
    reader
        .read(identity)
        .unwrap()
        .map(|token| token.expose().to_string())
}

// ---------------------------------------------------------------------------
// Round trip
// ---------------------------------------------------------------------------

#[test]
fn write_then_read_returns_token() {
    let (_, writer, reader) = vault();

    writer.write("device-42", CONNECTION_STRING).unwrap();

    assert_eq!(read(&reader, "device-42").as_deref(), Some(CONNECTION_STRING));
}

#[test]
fn read_matches_identity_case_insensitively() {
    let (_, writer, reader) = vault();

    writer.write("Device-42", "token-value").unwrap();

    assert_eq!(read(&reader, "DEVICE-42").as_deref(), Some("token-value"));
}

#[test]
fn read_unknown_identity_is_none() {
    let (_, writer, reader) = vault();

    writer.write("device-42", "token-value").unwrap();

    assert_eq!(read(&reader, "device-43"), None);

    let (_, _, empty) = vault();
    assert_eq!(read(&empty, "device-42"), None);
}

// ---------------------------------------------------------------------------
// Overwrite and isolation
// ---------------------------------------------------------------------------

#[test]
fn second_write_replaces_first() {
    let (store, writer, reader) = vault();

    writer.write("device-42", "first").unwrap();
    let second = writer.write("device-42", "second").unwrap();

    let certs = stored(&store);
    assert_eq!(certs.len(), 1, "exactly one certificate per identity");
    assert_eq!(certs[0].thumbprint(), second);
    assert_eq!(read(&reader, "device-42").as_deref(), Some("second"));
}

#[test]
fn identities_are_isolated() {
    let (store, writer, reader) = vault();

    writer.write("A", "t1").unwrap();
    writer.write("B", "t2").unwrap();

    assert_eq!(stored(&store).len(), 2);
    assert_eq!(read(&reader, "A").as_deref(), Some("t1"));
    assert_eq!(read(&reader, "B").as_deref(), Some("t2"));
}

#[test]
fn newest_certificate_wins_while_replacement_is_staged() {
    let now = Utc::now();
    let (older_store, older_writer, _) = vault();
    let (newer_store, newer_writer, _) = vault();

    older_writer
        .write_at("device-42", "old", now - Duration::days(1))
        .unwrap();
    newer_writer.write_at("device-42", "new", now).unwrap();

    let older = stored(&older_store).remove(0);
    let newer = stored(&newer_store).remove(0);

    // Both insertion orders: the newer not_before decides, not store order
    for pair in [[&older, &newer], [&newer, &older]] {
        let (store, _, reader) = vault();
        let mut session = store.open(OpenMode::ReadWrite).unwrap();
        for cert in pair {
            session.add(cert).unwrap();
        }
        drop(session);

        assert_eq!(stored(&store).len(), 2);
        assert_eq!(read(&reader, "device-42").as_deref(), Some("new"));
    }
}

#[test]
fn empty_identity_is_rejected_on_read() {
    let (_, _, reader) = vault();

    assert!(matches!(
        reader.read(""),
        Err(VaultError::InvalidIdentity(_))
    ));
}

// ---------------------------------------------------------------------------
// Expiry
// ---------------------------------------------------------------------------

#[test]
fn expired_certificate_is_never_returned() {
    let (_, writer, reader) = vault();
    let now = Utc::now();
    let issued_at = now - Months::new(13);

    writer.write_at("device-42", "stale", issued_at).unwrap();

    assert_eq!(reader.read_at("device-42", now).unwrap(), None);
    assert!(reader.read("device-42").unwrap().is_none());

    // Still readable while it was valid.
    let during = issued_at + Duration::days(30);
    assert_eq!(
        reader.read_at("device-42", during).unwrap().unwrap().expose(),
        "stale"
    );
}

#[test]
fn expiry_boundary_is_exclusive() {
    let (store, writer, reader) = vault();

    writer.write("device-42", "token-value").unwrap();
    let info = stored(&store)[0].info().unwrap();

    assert!(reader
        .read_at("device-42", info.not_after - Duration::seconds(1))
        .unwrap()
        .is_some());
    assert!(reader.read_at("device-42", info.not_after).unwrap().is_none());
}

#[test]
fn list_reports_expiry_without_secrets() {
    let (_, writer, reader) = vault();

    writer
        .write_at("old", "stale", Utc::now() - Months::new(13))
        .unwrap();
    writer.write("new", "fresh").unwrap();

    let mut summaries = reader.list().unwrap();
    summaries.sort_by(|a, b| a.identity.cmp(&b.identity));

    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].identity.as_deref(), Some("new"));
    assert!(!summaries[0].expired);
    assert_eq!(summaries[1].identity.as_deref(), Some("old"));
    assert!(summaries[1].expired);
    assert!(summaries.iter().all(|s| s.has_private_key && s.has_payload));
}

// ---------------------------------------------------------------------------
// Rejection
// ---------------------------------------------------------------------------

#[test]
fn empty_token_fails_without_mutating_store() {
    let (store, writer, reader) = vault();

    writer.write("device-42", "kept").unwrap();
    let before = stored(&store)[0].thumbprint().to_string();

    assert!(matches!(
        writer.write("device-42", ""),
        Err(VaultError::MissingToken)
    ));

    let certs = stored(&store);
    assert_eq!(certs.len(), 1);
    assert_eq!(certs[0].thumbprint(), before);
    assert_eq!(read(&reader, "device-42").as_deref(), Some("kept"));
}

#[test]
fn oversized_token_fails_before_store_mutation() {
    let (store, writer, _) = vault();

    writer.write("device-42", "kept").unwrap();
    let result = writer.write("device-42", &"x".repeat(512));

    assert!(matches!(result, Err(VaultError::Crypto(_))));
    assert_eq!(stored(&store).len(), 1);
}

// ---------------------------------------------------------------------------
// Tamper sensitivity
// ---------------------------------------------------------------------------

fn flip_payload_bit(cert: &InstalledCertificate, byte: usize, bit: u8) -> InstalledCertificate {
    let payload = cert.info().unwrap().payload.unwrap();
    let offset = cert
        .der()
        .windows(payload.len())
        .position(|window| window == payload.as_slice())
        .unwrap();

    let mut der = cert.der().to_vec();
    der[offset + byte] ^= 1 << bit;
    InstalledCertificate::new(der, cert.private_key().cloned(), cert.key_storage())
}

#[test]
fn flipped_ciphertext_bit_fails_decryption() {
    for (byte, bit) in [(4, 0), (60, 3), (200, 7), (259, 1)] {
        let (store, writer, reader) = vault();
        writer.write("device-42", CONNECTION_STRING).unwrap();

        let original = stored(&store).remove(0);
        let tampered = flip_payload_bit(&original, byte, bit);

        let mut session = store.open(OpenMode::ReadWrite).unwrap();
        session.remove(original.thumbprint()).unwrap();
        session.add(&tampered).unwrap();
        drop(session);

        assert!(
            matches!(reader.read("device-42"), Err(VaultError::Crypto(_))),
            "byte {byte} bit {bit} must not decrypt"
        );
    }
}

// ---------------------------------------------------------------------------
// Private key availability
// ---------------------------------------------------------------------------

#[test]
fn certificate_without_private_key_is_not_found() {
    let (store, writer, reader) = vault();
    writer.write("device-42", CONNECTION_STRING).unwrap();

    let original = stored(&store).remove(0);
    let public_only =
        InstalledCertificate::new(original.der().to_vec(), None, original.key_storage());

    let mut session = store.open(OpenMode::ReadWrite).unwrap();
    session.remove(original.thumbprint()).unwrap();
    session.add(&public_only).unwrap();
    drop(session);

    assert!(reader.read("device-42").unwrap().is_none());
}

/// Platform that refuses user-scoped keys.
struct MachineOnly;

impl KeyImport for MachineOnly {
    fn import(
        &self,
        bundle: &CredentialBundle,
        passphrase: &str,
        flags: KeyStorageFlags,
    ) -> Result<InstalledCertificate, BundleError> {
        if flags.scope != Some(KeyScope::Machine) {
            return Err(BundleError::Rejected(flags.to_string(), "access denied".to_string()));
        }
        SoftwareKeyImport.import(bundle, passphrase, flags)
    }
}

/// Platform whose imports never expose the private key.
struct KeylessPlatform;

impl KeyImport for KeylessPlatform {
    fn import(
        &self,
        bundle: &CredentialBundle,
        passphrase: &str,
        flags: KeyStorageFlags,
    ) -> Result<InstalledCertificate, BundleError> {
        let (der, _) = bundle.open(passphrase)?;
        Ok(InstalledCertificate::new(der, None, flags))
    }
}

#[test]
fn writer_falls_back_across_storage_flags() {
    let (store, writer, reader) = vault();
    let writer = writer.with_importer(Arc::new(MachineOnly));

    writer.write("device-42", CONNECTION_STRING).unwrap();

    let certs = stored(&store);
    assert_eq!(certs[0].key_storage(), KeyStorageFlags::MACHINE_EXPORTABLE_PERSIST);
    assert_eq!(read(&reader, "device-42").as_deref(), Some(CONNECTION_STRING));
}

#[test]
fn bundle_failure_leaves_previous_certificate() {
    let (store, writer, reader) = vault();
    writer.write("device-42", "kept").unwrap();

    let failing = TokenWriter::new(Arc::new(store.clone()), &VaultConfig::default())
        .with_importer(Arc::new(KeylessPlatform));
    let err = failing.write("device-42", "replacement").unwrap_err();

    assert!(matches!(
        err,
        VaultError::Bundle(BundleError::Exhausted { attempts: 4, .. })
    ));
    assert_eq!(stored(&store).len(), 1);
    assert_eq!(read(&reader, "device-42").as_deref(), Some("kept"));
}

// ---------------------------------------------------------------------------
// Directory-backed store
// ---------------------------------------------------------------------------

#[test]
fn file_store_round_trip_across_instances() {
    let dir = tempfile::tempdir().unwrap();
    let config = VaultConfig::default();

    let store: Arc<dyn CredentialStore> = Arc::new(FileStore::new(dir.path(), StoreId::default()));
    let writer = TokenWriter::new(store, &config);
    writer.write("device-42", "first").unwrap();
    writer.write("device-42", CONNECTION_STRING).unwrap();

    let reopened: Arc<dyn CredentialStore> =
        Arc::new(FileStore::new(dir.path(), StoreId::default()));
    let reader = TokenReader::new(reopened.clone(), &config);

    assert_eq!(
        reader.read("device-42").unwrap().unwrap().expose(),
        CONNECTION_STRING
    );
    assert_eq!(
        reopened
            .open(OpenMode::ReadOnly)
            .unwrap()
            .certificates()
            .unwrap()
            .len(),
        1
    );
}
