//! In-memory key store with a durable mirror in the config file.
//!
//! Two maps keyed by the coordinator-assigned key id. Every mutation
//! rewrites the whole on-disk key section while still holding the store
//! lock, so memory and disk move together. When the disk write fails the
//! new in-memory state is kept; the caller surfaces the failure and the
//! coordinator recovers by reissuing the share.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use node_config::{Config, KeyEntry, SaveError};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Mutex,
};
use threshold_ecdsa::{EcdsaKeyMeta, EcdsaKeyShare};
use threshold_rsa::{RsaKeyMeta, RsaKeyShare};
use tracing::debug;

/// Share and meta of one RSA key. They only exist together.
#[derive(Clone)]
pub struct RsaMaterial {
    /// The private share.
    pub share: RsaKeyShare,
    /// The public meta.
    pub meta: RsaKeyMeta,
}

/// Share and meta of one ECDSA key.
///
/// Whether the key is usable for signing is carried by the share itself:
/// only a share that has absorbed the group init exchange is initialized,
/// and that state survives the round trip through the config file.
#[derive(Clone)]
pub struct EcdsaMaterial {
    /// The private share.
    pub share: EcdsaKeyShare,
    /// The public meta.
    pub meta: EcdsaKeyMeta,
}

struct Inner {
    config: Config,
    rsa: HashMap<String, Option<RsaMaterial>>,
    ecdsa: HashMap<String, Option<EcdsaMaterial>>,
}

/// The key store.
///
/// The node serves one request at a time, so the mutex sees no contention
/// today; it stays so a future background flush cannot race a handler.
pub struct KeyStore {
    inner: Mutex<Inner>,
    path: PathBuf,
}

/// A persisted key could not be restored. Fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum LoadKeysError {
    /// A blob is not valid base64.
    #[error("key {id}: invalid base64 in config: {source}")]
    Base64 {
        /// Offending key id.
        id: String,
        /// Decoder error.
        source: base64::DecodeError,
    },
    /// A blob does not decode into key material.
    #[error("key {id}: cannot decode persisted material: {source}")]
    Decode {
        /// Offending key id.
        id: String,
        /// Codec error.
        source: encoding::DecodeError,
    },
}

/// A mutation could not be mirrored to disk.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// Key material could not be encoded for the config file.
    #[error(transparent)]
    Encode(#[from] encoding::EncodeError),
    /// The config file could not be rewritten.
    #[error(transparent)]
    Save(#[from] SaveError),
}

impl KeyStore {
    /// Build the store from a loaded config, decoding all persisted keys.
    pub fn load(config: Config, path: PathBuf) -> Result<Self, LoadKeysError> {
        let mut rsa = HashMap::new();
        for entry in &config.coordinator.rsa_keys {
            let material = match decode_entry::<RsaKeyShare, RsaKeyMeta>(entry)? {
                Some((share, meta)) => Some(RsaMaterial { share, meta }),
                None => None,
            };
            rsa.insert(entry.id.clone(), material);
        }
        let mut ecdsa = HashMap::new();
        for entry in &config.coordinator.ecdsa_keys {
            let material = match decode_entry::<EcdsaKeyShare, EcdsaKeyMeta>(entry)? {
                Some((share, meta)) => Some(EcdsaMaterial { share, meta }),
                None => None,
            };
            ecdsa.insert(entry.id.clone(), material);
        }
        debug!(rsa_keys = rsa.len(), ecdsa_keys = ecdsa.len(), "key store loaded");
        Ok(Self { inner: Mutex::new(Inner { config, rsa, ecdsa }), path })
    }

    /// Path of the mirrored config file.
    pub fn config_path(&self) -> &Path {
        &self.path
    }

    /// The RSA material for a key id, if present and complete.
    pub fn rsa_material(&self, id: &str) -> Option<RsaMaterial> {
        self.lock().rsa.get(id).and_then(Clone::clone)
    }

    /// The ECDSA material for a key id, if present and complete.
    pub fn ecdsa_material(&self, id: &str) -> Option<EcdsaMaterial> {
        self.lock().ecdsa.get(id).and_then(Clone::clone)
    }

    /// Install or replace an RSA key and mirror the store to disk.
    pub fn put_rsa_key(&self, id: &str, share: RsaKeyShare, meta: RsaKeyMeta) -> Result<(), PersistError> {
        let mut inner = self.lock();
        inner.rsa.insert(id.to_string(), Some(RsaMaterial { share, meta }));
        inner.persist(&self.path)
    }

    /// Remove an RSA key (idempotent) and mirror the store to disk.
    pub fn delete_rsa_key(&self, id: &str) -> Result<(), PersistError> {
        let mut inner = self.lock();
        inner.rsa.remove(id);
        inner.persist(&self.path)
    }

    /// Install or replace an ECDSA key and mirror the store to disk.
    pub fn put_ecdsa_key(&self, id: &str, share: EcdsaKeyShare, meta: EcdsaKeyMeta) -> Result<(), PersistError> {
        let mut inner = self.lock();
        inner.ecdsa.insert(id.to_string(), Some(EcdsaMaterial { share, meta }));
        inner.persist(&self.path)
    }

    /// Remove an ECDSA key (idempotent) and mirror the store to disk.
    pub fn delete_ecdsa_key(&self, id: &str) -> Result<(), PersistError> {
        let mut inner = self.lock();
        inner.ecdsa.remove(id);
        inner.persist(&self.path)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned lock means a handler panicked mid-mutation; the store
        // contents are still structurally sound, so keep serving.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Inner {
    fn persist(&mut self, path: &Path) -> Result<(), PersistError> {
        let mut rsa_keys = Vec::with_capacity(self.rsa.len());
        for (id, material) in &self.rsa {
            rsa_keys.push(encode_entry(id, material.as_ref().map(|m| (&m.share, &m.meta)))?);
        }
        let mut ecdsa_keys = Vec::with_capacity(self.ecdsa.len());
        for (id, material) in &self.ecdsa {
            ecdsa_keys.push(encode_entry(id, material.as_ref().map(|m| (&m.share, &m.meta)))?);
        }
        // Stable file contents regardless of map iteration order.
        rsa_keys.sort_by(|a, b| a.id.cmp(&b.id));
        ecdsa_keys.sort_by(|a, b| a.id.cmp(&b.id));
        self.config.coordinator.rsa_keys = rsa_keys;
        self.config.coordinator.ecdsa_keys = ecdsa_keys;
        debug!(
            rsa_keys = self.config.coordinator.rsa_keys.len(),
            ecdsa_keys = self.config.coordinator.ecdsa_keys.len(),
            "persisting key store"
        );
        self.config.save(path)?;
        Ok(())
    }
}

fn decode_entry<S, M>(entry: &KeyEntry) -> Result<Option<(S, M)>, LoadKeysError>
where
    S: serde::de::DeserializeOwned,
    M: serde::de::DeserializeOwned,
{
    if entry.key_share.is_empty() || entry.key_meta_info.is_empty() {
        return Ok(None);
    }
    let share_bytes = BASE64
        .decode(&entry.key_share)
        .map_err(|source| LoadKeysError::Base64 { id: entry.id.clone(), source })?;
    let meta_bytes = BASE64
        .decode(&entry.key_meta_info)
        .map_err(|source| LoadKeysError::Base64 { id: entry.id.clone(), source })?;
    let share = encoding::decode(&share_bytes)
        .map_err(|source| LoadKeysError::Decode { id: entry.id.clone(), source })?;
    let meta = encoding::decode(&meta_bytes)
        .map_err(|source| LoadKeysError::Decode { id: entry.id.clone(), source })?;
    Ok(Some((share, meta)))
}

fn encode_entry<S, M>(id: &str, material: Option<(&S, &M)>) -> Result<KeyEntry, PersistError>
where
    S: serde::Serialize,
    M: serde::Serialize,
{
    let (key_share, key_meta_info) = match material {
        Some((share, meta)) => (BASE64.encode(encoding::encode(share)?), BASE64.encode(encoding::encode(meta)?)),
        None => (String::new(), String::new()),
    };
    Ok(KeyEntry { id: id.to_string(), key_share, key_meta_info })
}
