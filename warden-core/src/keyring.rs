// SPDX-FileCopyrightText: © 2026 Warden Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The key-ring state machine.
//!
//! Status is never stored - it is derived from `(loaded, key store,
//! session)`, and the decrypted mnemonic lives only inside a
//! [`Session`] that bundles it with the derived-key cache. Replacing
//! the session is the only way to set a mnemonic, so a stale cache
//! cannot outlive the secret that produced it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use k256::ecdsa::SigningKey;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::crypto::KdfParams;
use crate::error::{Result, WardenError};
use crate::keys::{self, AccountKey};
use crate::keystore::EncryptedKeyStore;
use crate::kv::{self, KvStore};

/// Fixed key under which the encrypted key store is persisted.
pub const KEY_STORE_KEY: &str = "key-ring/key-store";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyRingStatus {
    NotLoaded,
    Empty,
    Locked,
    Unlocked,
}

impl fmt::Display for KeyRingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotLoaded => write!(f, "not loaded"),
            Self::Empty => write!(f, "empty"),
            Self::Locked => write!(f, "locked"),
            Self::Unlocked => write!(f, "unlocked"),
        }
    }
}

/// Decrypted mnemonic plus the derived-key cache it feeds.
struct Session {
    mnemonic: SecretString,
    derived: HashMap<String, SigningKey>,
}

impl Session {
    fn new(mnemonic: SecretString) -> Self {
        Self {
            mnemonic,
            derived: HashMap::new(),
        }
    }
}

pub struct KeyRing {
    kv: Arc<dyn KvStore>,
    kdf_params: KdfParams,
    loaded: bool,
    key_store: Option<EncryptedKeyStore>,
    session: Option<Session>,
}

impl KeyRing {
    pub fn new(kv: Arc<dyn KvStore>, kdf_params: KdfParams) -> Self {
        Self {
            kv,
            kdf_params,
            loaded: false,
            key_store: None,
            session: None,
        }
    }

    /// Status as a pure function of the three pieces of state.
    pub fn status(&self) -> KeyRingStatus {
        if !self.loaded {
            KeyRingStatus::NotLoaded
        } else if self.key_store.is_none() {
            KeyRingStatus::Empty
        } else if self.session.is_none() {
            KeyRingStatus::Locked
        } else {
            KeyRingStatus::Unlocked
        }
    }

    /// Seal a fresh mnemonic under `password`, replacing the key store.
    /// Ends `Unlocked` with an empty derived-key cache.
    pub fn create_key(&mut self, mnemonic: &str, password: &str) -> Result<()> {
        self.guard("create-key", &[KeyRingStatus::Empty])?;
        keys::validate_mnemonic(mnemonic)?;
        if password.is_empty() {
            return Err(WardenError::InvalidInput("password must not be empty".into()));
        }

        let store = EncryptedKeyStore::seal(mnemonic, password, self.kdf_params)?;
        self.key_store = Some(store);
        self.session = Some(Session::new(SecretString::from(mnemonic.to_string())));

        debug!("key ring created");
        Ok(())
    }

    /// Drop the session (mnemonic and every cached derived key).
    pub fn lock(&mut self) -> Result<()> {
        self.guard("lock", &[KeyRingStatus::Unlocked])?;
        self.session = None;
        debug!("key ring locked");
        Ok(())
    }

    /// Decrypt the key store and install a fresh session. A wrong
    /// password propagates [`WardenError::AuthenticationFailed`] and
    /// leaves the state untouched.
    pub fn unlock(&mut self, password: &str) -> Result<()> {
        self.guard("unlock", &[KeyRingStatus::Locked])?;
        let store = self
            .key_store
            .as_ref()
            .ok_or(WardenError::KeyStoreMissing)?;

        let mnemonic = store.open(password)?;
        self.session = Some(Session::new(mnemonic));
        debug!("key ring unlocked");
        Ok(())
    }

    /// Check `password` against the stored key store. Never errors for
    /// a wrong password. On success the decrypted mnemonic is adopted
    /// as the current session.
    pub fn verify_password(&mut self, password: &str) -> Result<bool> {
        let store = self
            .key_store
            .as_ref()
            .ok_or(WardenError::KeyStoreMissing)?;

        match store.open(password) {
            Ok(mnemonic) => {
                self.session = Some(Session::new(mnemonic));
                Ok(true)
            }
            Err(WardenError::AuthenticationFailed) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Decrypt-and-adopt an external key file: on success its mnemonic
    /// becomes the current session. The stored key store is untouched.
    pub fn adopt_key_file(
        &mut self,
        key_file: &EncryptedKeyStore,
        password: &str,
    ) -> Result<bool> {
        match key_file.open(password) {
            Ok(mnemonic) => {
                self.session = Some(Session::new(mnemonic));
                Ok(true)
            }
            Err(WardenError::AuthenticationFailed) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Re-seal the mnemonic under `new`, replacing the key store and
    /// persisting it. Returns `Ok(false)` without changes when `old`
    /// is wrong.
    pub async fn update_password(&mut self, old: &str, new: &str) -> Result<bool> {
        self.guard("update-password", &[KeyRingStatus::Unlocked])?;
        if new.is_empty() {
            return Err(WardenError::InvalidInput("password must not be empty".into()));
        }

        let store = self
            .key_store
            .as_ref()
            .ok_or(WardenError::KeyStoreMissing)?;

        let mnemonic = match store.open(old) {
            Ok(m) => m,
            Err(WardenError::AuthenticationFailed) => return Ok(false),
            Err(e) => return Err(e),
        };

        let replacement =
            EncryptedKeyStore::seal(mnemonic.expose_secret(), new, self.kdf_params)?;
        self.key_store = Some(replacement);
        self.session = Some(Session::new(mnemonic));
        self.save().await?;

        debug!("key store password updated");
        Ok(true)
    }

    /// Persist the current key store (or its absence) under the fixed
    /// key.
    pub async fn save(&self) -> Result<()> {
        match &self.key_store {
            Some(store) => kv::set_json(self.kv.as_ref(), KEY_STORE_KEY, store).await,
            None => self.kv.remove(KEY_STORE_KEY).await,
        }
    }

    /// Load the key store from persistence. Marks the ring loaded even
    /// when nothing is stored (`Empty`).
    pub async fn restore(&mut self) -> Result<()> {
        self.guard("restore", &[KeyRingStatus::NotLoaded, KeyRingStatus::Empty])?;
        self.key_store = kv::get_json(self.kv.as_ref(), KEY_STORE_KEY).await?;
        self.loaded = true;
        debug!(status = %self.status(), "key ring restored");
        Ok(())
    }

    /// Destructive reset: no key store, no session, persisted
    /// immediately. Irreversible.
    pub async fn clear(&mut self) -> Result<()> {
        self.guard("clear", &[KeyRingStatus::Locked, KeyRingStatus::Unlocked])?;
        self.key_store = None;
        self.session = None;
        self.kv.remove(KEY_STORE_KEY).await?;
        debug!("key ring cleared");
        Ok(())
    }

    /// Public key and address for `path`. Requires `Unlocked`.
    pub fn get_key(&mut self, path: &str) -> Result<AccountKey> {
        self.guard("get-key", &[KeyRingStatus::Unlocked])?;
        let key = self.derived_key(path)?;
        Ok(keys::account_key(&key))
    }

    /// Sign `message` with the key for `path`. Requires `Unlocked`.
    pub fn sign(&mut self, path: &str, message: &[u8]) -> Result<[u8; 64]> {
        self.guard("sign", &[KeyRingStatus::Unlocked])?;
        let key = self.derived_key(path)?;
        keys::sign(&key, message)
    }

    /// Number of cached derived keys in the current session.
    pub fn cached_key_count(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.derived.len())
    }

    fn derived_key(&mut self, path: &str) -> Result<SigningKey> {
        let status = self.status();
        let session = self
            .session
            .as_mut()
            .ok_or(WardenError::InvalidState { op: "sign", status })?;

        if let Some(key) = session.derived.get(path) {
            return Ok(key.clone());
        }

        let seed = keys::seed_from_mnemonic(session.mnemonic.expose_secret())?;
        let key = keys::derive_signing_key(&seed, path)?;
        session.derived.insert(path.to_string(), key.clone());
        Ok(key)
    }

    fn guard(&self, op: &'static str, allowed: &[KeyRingStatus]) -> Result<()> {
        let status = self.status();
        if allowed.contains(&status) {
            Ok(())
        } else {
            Err(WardenError::InvalidState { op, status })
        }
    }
}
