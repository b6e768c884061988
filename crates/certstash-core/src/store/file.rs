//! Directory-backed credential store.
//!
//! Layout: `<root>/<location>/<name>/<thumbprint>.p12` for certificates with
//! a private key and `<thumbprint>.der` for certificates without one.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::bundle::{CredentialBundle, KeyStorageFlags, BUNDLE_PASSPHRASE};
use crate::error::StoreError;
use crate::store::{
    require_writable, CredentialStore, InstalledCertificate, OpenMode, StoreId, StoreSession,
};

const BUNDLE_EXT: &str = "p12";
const CERT_EXT: &str = "der";

/// A credential store kept as files under a root directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    id: StoreId,
    dir: PathBuf,
}

impl FileStore {
    pub fn new(root: impl AsRef<Path>, id: StoreId) -> Self {
        let dir = root.as_ref().join(id.location.as_str()).join(&id.name);
        Self { id, dir }
    }

    /// Directory holding this store's entries.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, thumbprint: &str, ext: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", thumbprint, ext))
    }

    fn load(&self, path: &Path) -> Result<Option<InstalledCertificate>, StoreError> {
        let ext = path.extension().and_then(|e| e.to_str());
        let corrupt = |reason: String| StoreError::Corrupt {
            entry: path.display().to_string(),
            reason,
        };

        match ext {
            Some(BUNDLE_EXT) => {
                let bundle = CredentialBundle::from_bytes(fs::read(path)?);
                let (der, key) = bundle
                    .open(BUNDLE_PASSPHRASE)
                    .map_err(|e| corrupt(e.to_string()))?;
                // Import flags are not recorded on disk
                Ok(Some(InstalledCertificate::new(der, key, KeyStorageFlags::default())))
            }
            Some(CERT_EXT) => Ok(Some(InstalledCertificate::new(
                fs::read(path)?,
                None,
                KeyStorageFlags::default(),
            ))),
            _ => Ok(None),
        }
    }
}

impl CredentialStore for FileStore {
    fn id(&self) -> &StoreId {
        &self.id
    }

    fn open(&self, mode: OpenMode) -> Result<Box<dyn StoreSession + '_>, StoreError> {
        if mode == OpenMode::ReadWrite {
            fs::create_dir_all(&self.dir)?;
        }
        debug!(store = %self.id, dir = %self.dir.display(), ?mode, "store opened");
        Ok(Box::new(FileSession { store: self, mode }))
    }
}

struct FileSession<'a> {
    store: &'a FileStore,
    mode: OpenMode,
}

impl StoreSession for FileSession<'_> {
    fn mode(&self) -> OpenMode {
        self.mode
    }

    fn certificates(&self) -> Result<Vec<InstalledCertificate>, StoreError> {
        let entries = match fs::read_dir(&self.store.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut paths = entries
            .map(|entry| entry.map(|e| e.path()))
            .collect::<Result<Vec<_>, _>>()?;
        paths.sort();

        let mut certs = Vec::new();
        for path in paths {
            match self.store.load(&path) {
                Ok(Some(cert)) => certs.push(cert),
                Ok(None) => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable store entry")
                }
            }
        }
        Ok(certs)
    }

    fn add(&mut self, cert: &InstalledCertificate) -> Result<(), StoreError> {
        require_writable(self.mode, &self.store.id)?;

        match cert.private_key() {
            Some(key) => {
                let bundle =
                    CredentialBundle::seal(cert.der(), key, BUNDLE_PASSPHRASE, cert.thumbprint())
                        .map_err(|e| StoreError::Corrupt {
                            entry: cert.thumbprint().to_string(),
                            reason: e.to_string(),
                        })?;
                let path = self.store.entry_path(cert.thumbprint(), BUNDLE_EXT);
                write_secret_file(&path, bundle.as_bytes())?;
            }
            None => {
                write_secret_file(&self.store.entry_path(cert.thumbprint(), CERT_EXT), cert.der())?;
            }
        }
        Ok(())
    }

    fn remove(&mut self, thumbprint: &str) -> Result<bool, StoreError> {
        require_writable(self.mode, &self.store.id)?;

        let mut removed = false;
        for ext in [BUNDLE_EXT, CERT_EXT] {
            match fs::remove_file(self.store.entry_path(thumbprint, ext)) {
                Ok(()) => removed = true,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(removed)
    }
}

/// Write a file readable only by the owner, replacing it atomically.
fn write_secret_file(path: &Path, contents: &[u8]) -> io::Result<()> {
    let tmp = path.with_extension("tmp");
    let result = write_owner_only(&tmp, contents).and_then(|()| fs::rename(&tmp, path));
    if result.is_err() {
        if let Err(e) = fs::remove_file(&tmp) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %tmp.display(), error = %e, "failed to remove temporary file");
            }
        }
    }
    result
}

#[cfg(unix)]
fn write_owner_only(path: &Path, contents: &[u8]) -> io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

#[cfg(not(unix))]
fn write_owner_only(path: &Path, contents: &[u8]) -> io::Result<()> {
    fs::write(path, contents)
}
