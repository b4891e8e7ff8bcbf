//! Credential Store
//!
//! Account records keyed by user name: a password hash plus the playback
//! service token captured at the user's last authorization.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::playback::OAuthToken;

/// File name used by [`JsonFileStore`] inside its data directory
pub const USERS_FILE: &str = "users.json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("User already exists: {0}")]
    Exists(String),

    #[error("User not found: {0}")]
    NotFound(String),

    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage is corrupt: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Password hashing failed: {0}")]
    Hash(String),
}

/// One stored account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialEntry {
    pub name: String,
    /// PHC string produced by [`hash_password`]
    pub password_hash: String,
    #[serde(default)]
    pub token: Option<OAuthToken>,
}

impl CredentialEntry {
    /// New account with a freshly hashed password and no token
    pub fn new(name: impl Into<String>, password: &str) -> Result<Self, StoreError> {
        Ok(Self {
            name: name.into(),
            password_hash: hash_password(password)?,
            token: None,
        })
    }

    pub fn verify(&self, password: &str) -> bool {
        verify_password(password, &self.password_hash)
    }
}

/// Hash a password into a PHC string with a random salt
pub fn hash_password(password: &str) -> Result<String, StoreError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| StoreError::Hash(e.to_string()))
}

/// Check a password against a stored PHC string. A malformed hash never verifies.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Persistent account storage
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self, name: &str) -> Result<Option<CredentialEntry>, StoreError>;

    /// Insert `entry`. Fails with [`StoreError::Exists`] when the name is
    /// taken and `overwrite` is false.
    async fn put(&self, entry: CredentialEntry, overwrite: bool) -> Result<(), StoreError>;

    async fn delete(&self, name: &str) -> Result<(), StoreError>;

    /// Move an entry to a new name
    async fn rename(&self, current: &str, new: &str) -> Result<(), StoreError>;

    async fn list(&self) -> Result<Vec<CredentialEntry>, StoreError>;
}

type Entries = BTreeMap<String, CredentialEntry>;

fn put_entry(entries: &mut Entries, entry: CredentialEntry, overwrite: bool) -> Result<(), StoreError> {
    if !overwrite && entries.contains_key(&entry.name) {
        return Err(StoreError::Exists(entry.name));
    }
    entries.insert(entry.name.clone(), entry);
    Ok(())
}

fn delete_entry(entries: &mut Entries, name: &str) -> Result<(), StoreError> {
    entries
        .remove(name)
        .map(|_| ())
        .ok_or_else(|| StoreError::NotFound(name.to_string()))
}

fn rename_entry(entries: &mut Entries, current: &str, new: &str) -> Result<(), StoreError> {
    if current == new {
        return if entries.contains_key(current) {
            Ok(())
        } else {
            Err(StoreError::NotFound(current.to_string()))
        };
    }
    if entries.contains_key(new) {
        return Err(StoreError::Exists(new.to_string()));
    }
    let mut entry = entries
        .remove(current)
        .ok_or_else(|| StoreError::NotFound(current.to_string()))?;
    entry.name = new.to_string();
    entries.insert(new.to_string(), entry);
    Ok(())
}

/// Volatile store
#[derive(Default)]
pub struct MemoryStore {
    entries: parking_lot::Mutex<Entries>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn get(&self, name: &str) -> Result<Option<CredentialEntry>, StoreError> {
        Ok(self.entries.lock().get(name).cloned())
    }

    async fn put(&self, entry: CredentialEntry, overwrite: bool) -> Result<(), StoreError> {
        put_entry(&mut self.entries.lock(), entry, overwrite)
    }

    async fn delete(&self, name: &str) -> Result<(), StoreError> {
        delete_entry(&mut self.entries.lock(), name)
    }

    async fn rename(&self, current: &str, new: &str) -> Result<(), StoreError> {
        rename_entry(&mut self.entries.lock(), current, new)
    }

    async fn list(&self) -> Result<Vec<CredentialEntry>, StoreError> {
        Ok(self.entries.lock().values().cloned().collect())
    }
}

/// Store backed by a single JSON document.
///
/// Every mutation rewrites the whole file through a temporary sibling and a
/// rename, so a crash leaves either the old or the new document.
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open (creating the directory if needed) `dir/users.json`
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir).await?;
        Ok(Self {
            path: dir.join(USERS_FILE),
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Entries, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(Entries::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Entries::new()),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self, entries), fields(path = %self.path.display()))]
    async fn save(&self, entries: &Entries) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!("Saved {} accounts", entries.len());
        Ok(())
    }

    /// Load, apply `f`, and save when it succeeds
    async fn update<F>(&self, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Entries) -> Result<(), StoreError> + Send,
    {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        f(&mut entries)?;
        self.save(&entries).await
    }
}

#[async_trait]
impl CredentialStore for JsonFileStore {
    async fn get(&self, name: &str) -> Result<Option<CredentialEntry>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.remove(name))
    }

    async fn put(&self, entry: CredentialEntry, overwrite: bool) -> Result<(), StoreError> {
        self.update(move |entries| put_entry(entries, entry, overwrite))
            .await
    }

    async fn delete(&self, name: &str) -> Result<(), StoreError> {
        self.update(|entries| delete_entry(entries, name)).await
    }

    async fn rename(&self, current: &str, new: &str) -> Result<(), StoreError> {
        self.update(|entries| rename_entry(entries, current, new))
            .await
    }

    async fn list(&self) -> Result<Vec<CredentialEntry>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.into_values().collect())
    }
}
