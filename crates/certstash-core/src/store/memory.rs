//! In-memory credential store.

use std::sync::{Arc, RwLock};

use crate::error::StoreError;
use crate::store::{
    require_writable, CredentialStore, InstalledCertificate, OpenMode, StoreId, StoreSession,
};

/// A credential store held in process memory.
///
/// Clones share the same contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    id: StoreId,
    entries: Arc<RwLock<Vec<InstalledCertificate>>>,
}

impl MemoryStore {
    pub fn new(id: StoreId) -> Self {
        Self {
            id,
            entries: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl CredentialStore for MemoryStore {
    fn id(&self) -> &StoreId {
        &self.id
    }

    fn open(&self, mode: OpenMode) -> Result<Box<dyn StoreSession + '_>, StoreError> {
        Ok(Box::new(MemorySession { store: self, mode }))
    }
}

struct MemorySession<'a> {
    store: &'a MemoryStore,
    mode: OpenMode,
}

impl StoreSession for MemorySession<'_> {
    fn mode(&self) -> OpenMode {
        self.mode
    }

    fn certificates(&self) -> Result<Vec<InstalledCertificate>, StoreError> {
        let entries = self.store.entries.read().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.clone())
    }

    fn add(&mut self, cert: &InstalledCertificate) -> Result<(), StoreError> {
        require_writable(self.mode, &self.store.id)?;

        let mut entries = self.store.entries.write().map_err(|_| StoreError::Poisoned)?;
        entries.retain(|existing| existing.thumbprint() != cert.thumbprint());
        entries.push(cert.clone());
        Ok(())
    }

    fn remove(&mut self, thumbprint: &str) -> Result<bool, StoreError> {
        require_writable(self.mode, &self.store.id)?;

        let mut entries = self.store.entries.write().map_err(|_| StoreError::Poisoned)?;
        let before = entries.len();
        entries.retain(|existing| existing.thumbprint() != thumbprint);
        Ok(entries.len() != before)
    }
}
