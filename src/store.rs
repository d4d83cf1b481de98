//! The storage boundary.
//!
//! The session manager never touches a physical store. It hands back a salt
//! and a canary, and takes them as plain arguments later. This module
//! defines the record the caller persists, the trait a record store
//! implements, two small stores, and the glue that wires a store to a
//! manager.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::envelope::Envelope;
use crate::error::{EnvelockError, Result};
use crate::keys::Salt;
use crate::session::SessionKeyManager;

/// Everything needed to unlock a returning user. Neither field is secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredIdentity {
    pub salt: Salt,
    pub canary: Envelope,
}

/// A key-value persistence layer holding identity configuration.
pub trait IdentityStore {
    fn get_config(&self) -> Result<Option<StoredIdentity>>;
    fn put_config(&mut self, identity: &StoredIdentity) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Built-in store: memory
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    identity: Option<StoredIdentity>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdentityStore for MemoryStore {
    fn get_config(&self) -> Result<Option<StoredIdentity>> {
        Ok(self.identity.clone())
    }

    fn put_config(&mut self, identity: &StoredIdentity) -> Result<()> {
        self.identity = Some(identity.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Built-in store: file
// ---------------------------------------------------------------------------

/// Keeps the identity as one JSON document. A missing file means nothing
/// has been enrolled yet.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl IdentityStore for JsonFileStore {
    fn get_config(&self) -> Result<Option<StoredIdentity>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(EnvelockError::Storage(format!(
                    "failed to read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };
        serde_json::from_str(&contents).map(Some).map_err(|e| {
            EnvelockError::Storage(format!("failed to parse {}: {}", self.path.display(), e))
        })
    }

    fn put_config(&mut self, identity: &StoredIdentity) -> Result<()> {
        let json = serde_json::to_string_pretty(identity)
            .map_err(|e| EnvelockError::Storage(format!("failed to encode identity: {}", e)))?;
        fs::write(&self.path, json).map_err(|e| {
            EnvelockError::Storage(format!("failed to write {}: {}", self.path.display(), e))
        })
    }
}

// ---------------------------------------------------------------------------
// Glue
// ---------------------------------------------------------------------------

/// First-time setup: start a session under a fresh salt, seal a canary and
/// persist both.
///
/// Refuses with `ConfigurationError` when the store already holds an
/// identity: a new salt would orphan every envelope sealed under the old one.
pub fn enroll(
    manager: &SessionKeyManager,
    store: &mut dyn IdentityStore,
    passphrase: &str,
) -> Result<StoredIdentity> {
    ensure_not_enrolled(store)?;
    let salt = manager.initialize(passphrase, None)?;
    persist(manager, store, salt)
}

/// [`enroll`] with the key derivation moved to tokio's blocking pool.
pub async fn enroll_async(
    manager: &SessionKeyManager,
    store: &mut dyn IdentityStore,
    passphrase: &str,
) -> Result<StoredIdentity> {
    ensure_not_enrolled(store)?;
    let salt = manager.initialize_async(passphrase, None).await?;
    persist(manager, store, salt)
}

/// Returning user: unlock against the persisted salt and canary.
///
/// `Ok(false)` for a wrong passphrase; `ConfigurationError` if nothing has
/// been enrolled.
pub fn unlock_from_store(
    manager: &SessionKeyManager,
    store: &dyn IdentityStore,
    passphrase: &str,
) -> Result<bool> {
    let identity = enrolled(store)?;
    manager.unlock(passphrase, &identity.salt, &identity.canary)
}

/// [`unlock_from_store`] with the key derivation moved to tokio's blocking
/// pool.
pub async fn unlock_from_store_async(
    manager: &SessionKeyManager,
    store: &dyn IdentityStore,
    passphrase: &str,
) -> Result<bool> {
    let identity = enrolled(store)?;
    manager
        .unlock_async(passphrase, &identity.salt, &identity.canary)
        .await
}

fn ensure_not_enrolled(store: &dyn IdentityStore) -> Result<()> {
    match store.get_config()? {
        Some(_) => Err(EnvelockError::config("identity already enrolled")),
        None => Ok(()),
    }
}

fn enrolled(store: &dyn IdentityStore) -> Result<StoredIdentity> {
    store
        .get_config()?
        .ok_or_else(|| EnvelockError::config("no identity has been enrolled"))
}

fn persist(
    manager: &SessionKeyManager,
    store: &mut dyn IdentityStore,
    salt: Salt,
) -> Result<StoredIdentity> {
    let canary = manager.create_canary()?;
    let identity = StoredIdentity { salt, canary };
    store.put_config(&identity)?;
    tracing::info!("identity enrolled");
    Ok(identity)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> StoredIdentity {
        StoredIdentity {
            salt: Salt::from_bytes(vec![3u8; 16]).unwrap(),
            canary: Envelope::new([4u8; 12], vec![5u8; 20]),
        }
    }

    #[test]
    fn test_memory_store() {
        let mut store = MemoryStore::new();
        assert!(store.get_config().unwrap().is_none());
        store.put_config(&identity()).unwrap();
        assert_eq!(store.get_config().unwrap(), Some(identity()));
    }

    #[test]
    fn test_json_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonFileStore::new(dir.path().join("identity.json"));
        assert!(store.get_config().unwrap().is_none());

        store.put_config(&identity()).unwrap();
        assert_eq!(store.get_config().unwrap(), Some(identity()));

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw["salt"], identity().salt.to_base64());
        assert!(raw["canary"]["nonce"].is_string());
    }

    #[test]
    fn test_json_file_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.json");
        fs::write(&path, "{ not json").unwrap();
        let err = JsonFileStore::new(&path).get_config().unwrap_err();
        assert!(matches!(err, EnvelockError::Storage(_)));
    }
}
