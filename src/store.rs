//! Session store: flat key/value persistence with local-storage semantics.
//!
//! DESIGN
//! ======
//! The store knows nothing about expiry or integrity: values are trusted as-is
//! once read. `SessionVault` layers the well-known keys on top of any
//! [`SessionStore`] so the rest of the crate never spells key names.
//!
//! `FileStore` rewrites the whole JSON document on every mutation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::StoreError;
use crate::types::{IdentitySession, Session, User};

pub const KEY_AUTH_TOKEN: &str = "authToken";
pub const KEY_REFRESH_TOKEN: &str = "refreshToken";
pub const KEY_ADMIN_USER: &str = "adminUser";
pub const KEY_SESSION_EXPIRY: &str = "sessionExpiry";
pub const KEY_IDENTITY_SESSION: &str = "identitySession";

/// Every key the auth bridge owns.
pub const ALL_KEYS: [&str; 5] =
    [KEY_AUTH_TOKEN, KEY_REFRESH_TOKEN, KEY_ADMIN_USER, KEY_SESSION_EXPIRY, KEY_IDENTITY_SESSION];

/// Key/value persistence backend.
pub trait SessionStore: Send + Sync {
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the backing storage cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// # Errors
    ///
    /// Returns a [`StoreError`] if the backing storage cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Removing an absent key is not an error.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the backing storage cannot be written.
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

// =============================================================================
// MEMORY STORE
// =============================================================================

/// Process-local store. Contents are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().map_or(0, |entries| entries.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        entries.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        entries.remove(key);
        Ok(())
    }
}

// =============================================================================
// FILE STORE
// =============================================================================

/// JSON-object-on-disk store. A missing file reads as empty.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    cache: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open (or lazily create) the store at `path`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the file exists but cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let cache = match std::fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => BTreeMap::new(),
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, cache: Mutex::new(cache) })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl SessionStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.cache.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.cache.lock().map_err(|_| StoreError::Poisoned)?;
        entries.insert(key.to_owned(), value.to_owned());
        self.flush(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.cache.lock().map_err(|_| StoreError::Poisoned)?;
        if entries.remove(key).is_some() {
            self.flush(&entries)?;
        }
        Ok(())
    }
}

// =============================================================================
// SESSION VAULT
// =============================================================================

/// Typed accessors for the session keys over a shared store.
#[derive(Clone)]
pub struct SessionVault {
    store: Arc<dyn SessionStore>,
}

impl SessionVault {
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    /// # Errors
    ///
    /// Propagates store read failures.
    pub fn session_token(&self) -> Result<Option<String>, StoreError> {
        self.non_empty(KEY_AUTH_TOKEN)
    }

    /// # Errors
    ///
    /// Propagates store write failures.
    pub fn set_session_token(&self, token: &str) -> Result<(), StoreError> {
        self.store.set(KEY_AUTH_TOKEN, token)
    }

    /// # Errors
    ///
    /// Propagates store read failures.
    pub fn refresh_token(&self) -> Result<Option<String>, StoreError> {
        self.non_empty(KEY_REFRESH_TOKEN)
    }

    /// # Errors
    ///
    /// Propagates store write failures.
    pub fn set_refresh_token(&self, token: &str) -> Result<(), StoreError> {
        self.store.set(KEY_REFRESH_TOKEN, token)
    }

    /// Persisted identity-provider session. An unparseable blob reads as absent.
    ///
    /// # Errors
    ///
    /// Propagates store read failures.
    pub fn identity_session(&self) -> Result<Option<IdentitySession>, StoreError> {
        let Some(raw) = self.store.get(KEY_IDENTITY_SESSION)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                tracing::warn!(error = %e, "discarding unparseable identity session");
                Ok(None)
            }
        }
    }

    /// # Errors
    ///
    /// Propagates store write failures.
    pub fn set_identity_session(&self, session: &IdentitySession) -> Result<(), StoreError> {
        self.store.set(KEY_IDENTITY_SESSION, &serde_json::to_string(session)?)
    }

    /// # Errors
    ///
    /// Propagates store write failures.
    pub fn clear_identity_session(&self) -> Result<(), StoreError> {
        self.store.remove(KEY_IDENTITY_SESSION)
    }

    /// Cached legacy user. An unparseable blob reads as absent.
    ///
    /// # Errors
    ///
    /// Propagates store read failures.
    pub fn legacy_user(&self) -> Result<Option<User>, StoreError> {
        let Some(raw) = self.store.get(KEY_ADMIN_USER)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(user) => Ok(Some(user)),
            Err(e) => {
                tracing::warn!(error = %e, "discarding unparseable cached user");
                Ok(None)
            }
        }
    }

    /// Legacy expiry in epoch milliseconds. An unparseable value reads as absent.
    ///
    /// # Errors
    ///
    /// Propagates store read failures.
    pub fn legacy_expiry(&self) -> Result<Option<i64>, StoreError> {
        Ok(self
            .store
            .get(KEY_SESSION_EXPIRY)?
            .and_then(|raw| raw.trim().parse::<i64>().ok()))
    }

    /// Write the backward-compatible cached user and its expiry.
    ///
    /// # Errors
    ///
    /// Propagates store write failures.
    pub fn set_legacy_session(&self, user: &User, expires_at_ms: i64) -> Result<(), StoreError> {
        self.store.set(KEY_ADMIN_USER, &serde_json::to_string(user)?)?;
        self.store.set(KEY_SESSION_EXPIRY, &expires_at_ms.to_string())
    }

    /// Remove the session token, refresh token and identity session, keeping
    /// the legacy cache.
    ///
    /// # Errors
    ///
    /// Propagates store write failures.
    pub fn clear_tokens(&self) -> Result<(), StoreError> {
        self.store.remove(KEY_AUTH_TOKEN)?;
        self.store.remove(KEY_REFRESH_TOKEN)?;
        self.store.remove(KEY_IDENTITY_SESSION)
    }

    /// # Errors
    ///
    /// Propagates store write failures.
    pub fn clear_legacy(&self) -> Result<(), StoreError> {
        self.store.remove(KEY_ADMIN_USER)?;
        self.store.remove(KEY_SESSION_EXPIRY)
    }

    /// Remove every owned key. Every removal is attempted even if one fails;
    /// the first error is returned.
    ///
    /// # Errors
    ///
    /// Returns the first store write failure.
    pub fn clear_all(&self) -> Result<(), StoreError> {
        let mut first_err = None;
        for key in ALL_KEYS {
            if let Err(e) = self.store.remove(key) {
                tracing::warn!(key, error = %e, "failed to clear session key");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Snapshot of the persisted session material.
    ///
    /// # Errors
    ///
    /// Propagates store read failures.
    pub fn session(&self) -> Result<Session, StoreError> {
        Ok(Session {
            session_token: self.session_token()?,
            refresh_token: self.refresh_token()?,
            expires_at: self.legacy_expiry()?,
        })
    }

    fn non_empty(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.store.get(key)?.filter(|v| !v.is_empty()))
    }
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
