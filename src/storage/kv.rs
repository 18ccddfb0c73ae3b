//! Key-value storage capability.
//!
//! The durable file tier sits on any [`KvStore`]: a flat namespace of byte
//! blobs with batch reads/writes and ordered prefix listing. Values are
//! raw bytes; typed records are framed by the caller through
//! [`encode_value`]/[`decode_value`] (bincode, standard config).

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::KvError;

/// Flat byte-blob store with prefix listing.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Fetch one value.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError>;

    /// Fetch many values in one round trip; missing keys are omitted.
    async fn get_many(&self, keys: &[String]) -> Result<BTreeMap<String, Vec<u8>>, KvError>;

    /// Store one value.
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), KvError>;

    /// Store many values atomically.
    async fn put_many(&self, entries: Vec<(String, Vec<u8>)>) -> Result<(), KvError>;

    /// Delete one key; absent keys are a no-op.
    async fn delete(&self, key: &str) -> Result<(), KvError>;

    /// Delete many keys atomically.
    async fn delete_many(&self, keys: &[String]) -> Result<(), KvError>;

    /// Wipe the entire namespace.
    async fn delete_all(&self) -> Result<(), KvError>;

    /// List keys under `prefix`, mapped to their stored value sizes.
    async fn list(&self, prefix: &str) -> Result<BTreeMap<String, usize>, KvError>;
}

/// Frame a typed record for storage.
pub fn encode_value<T: Serialize>(value: &T) -> Result<Vec<u8>, KvError> {
    bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| KvError::Serialization(e.to_string()))
}

/// Decode a typed record fetched from storage.
pub fn decode_value<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, KvError> {
    let (value, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|e| KvError::Deserialization(e.to_string()))?;
    Ok(value)
}

/// In-memory [`KvStore`] over an ordered map.
///
/// Backs ephemeral volumes and tests. The ordered map makes prefix listing
/// a range scan.
#[derive(Debug, Default)]
pub struct MemKv {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemKv {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, BTreeMap<String, Vec<u8>>>, KvError> {
        self.entries
            .read()
            .map_err(|_| KvError::Unavailable("lock poisoned".into()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, BTreeMap<String, Vec<u8>>>, KvError> {
        self.entries
            .write()
            .map_err(|_| KvError::Unavailable("lock poisoned".into()))
    }
}

#[async_trait]
impl KvStore for MemKv {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        Ok(self.read()?.get(key).cloned())
    }

    async fn get_many(&self, keys: &[String]) -> Result<BTreeMap<String, Vec<u8>>, KvError> {
        let entries = self.read()?;
        Ok(keys
            .iter()
            .filter_map(|k| entries.get(k).map(|v| (k.clone(), v.clone())))
            .collect())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), KvError> {
        self.write()?.insert(key.to_string(), value);
        Ok(())
    }

    async fn put_many(&self, entries: Vec<(String, Vec<u8>)>) -> Result<(), KvError> {
        let mut map = self.write()?;
        for (key, value) in entries {
            map.insert(key, value);
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        self.write()?.remove(key);
        Ok(())
    }

    async fn delete_many(&self, keys: &[String]) -> Result<(), KvError> {
        let mut map = self.write()?;
        for key in keys {
            map.remove(key);
        }
        Ok(())
    }

    async fn delete_all(&self) -> Result<(), KvError> {
        self.write()?.clear();
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<BTreeMap<String, usize>, KvError> {
        let entries = self.read()?;
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.len()))
            .collect())
    }
}
