//! Durable file tier over a [`KvStore`].
//!
//! Each file is stored chunked so no single KV value exceeds the backend's
//! value-size limit:
//!
//! ```text
//! meta::<path>        → FileMeta { chunks: [chunk keys, in order] }
//! chunk::<path>::<i>  → ≤ 131 072 raw bytes of the UTF-8 encoding
//! ```
//!
//! A read fetches the meta record, batch-fetches every listed chunk, and
//! decodes the concatenation — chunk boundaries may fall inside a
//! multi-byte sequence, so decoding happens only after reassembly.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use std::sync::Arc;

use crate::error::FsError;
use crate::storage::kv::{decode_value, encode_value, KvStore};
use crate::storage::FileStore;

/// Upper bound on a single chunk value, from the KV value-size limit.
pub const CHUNK_SIZE: usize = 131_072;

const META_PREFIX: &str = "meta::";
const CHUNK_PREFIX: &str = "chunk::";

/// Meta record listing a file's chunk keys in read order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct FileMeta {
    chunks: Vec<String>,
}

/// Chunked durable file store.
pub struct DurableFs {
    kv: Arc<dyn KvStore>,
}

impl DurableFs {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    fn meta_key(path: &str) -> String {
        format!("{META_PREFIX}{path}")
    }

    fn chunk_key(path: &str, index: usize) -> String {
        format!("{CHUNK_PREFIX}{path}::{index}")
    }

    async fn load_meta(&self, path: &str) -> Result<Option<FileMeta>, FsError> {
        match self.kv.get(&Self::meta_key(path)).await? {
            Some(bytes) => Ok(Some(decode_value(&bytes)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl FileStore for DurableFs {
    async fn read_file(&self, path: &str) -> Result<String, FsError> {
        let meta = self
            .load_meta(path)
            .await?
            .ok_or_else(|| FsError::NotFound(path.to_string()))?;

        let fetched = self.kv.get_many(&meta.chunks).await?;
        let mut bytes = Vec::new();
        for key in &meta.chunks {
            let chunk = fetched
                .get(key)
                .ok_or_else(|| FsError::NotFound(path.to_string()))?;
            bytes.extend_from_slice(chunk);
        }
        String::from_utf8(bytes).map_err(|_| FsError::InvalidUtf8(path.to_string()))
    }

    async fn readdir(&self, prefix: &str) -> Result<Vec<String>, FsError> {
        let keys = self.kv.list(&Self::meta_key(prefix)).await?;
        Ok(keys
            .into_keys()
            .map(|key| key[META_PREFIX.len()..].to_string())
            .collect())
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<(), FsError> {
        let bytes = content.as_bytes();
        let previous = self.load_meta(path).await?;

        let mut entries = Vec::new();
        let mut chunk_keys = Vec::new();
        let mut offset = 0;
        // An empty file still gets one (empty) chunk so the layout is uniform.
        loop {
            let end = (offset + CHUNK_SIZE).min(bytes.len());
            let key = Self::chunk_key(path, chunk_keys.len());
            entries.push((key.clone(), bytes[offset..end].to_vec()));
            chunk_keys.push(key);
            offset = end;
            if offset >= bytes.len() {
                break;
            }
        }

        let chunk_count = chunk_keys.len();
        let meta = FileMeta { chunks: chunk_keys };
        entries.push((Self::meta_key(path), encode_value(&meta)?));
        self.kv.put_many(entries).await?;

        // A shrinking rewrite leaves old chunk keys past the new count;
        // drop them so the namespace only holds referenced chunks.
        if let Some(previous) = previous {
            let stale: Vec<String> = previous
                .chunks
                .into_iter()
                .skip(chunk_count)
                .collect();
            if !stale.is_empty() {
                self.kv.delete_many(&stale).await?;
            }
        }
        Ok(())
    }

    async fn unlink(&self, path: &str) -> Result<(), FsError> {
        let meta = match self.load_meta(path).await? {
            Some(meta) => meta,
            // Idempotent: nothing to remove.
            None => return Ok(()),
        };
        self.kv.delete(&Self::meta_key(path)).await?;
        self.kv.delete_many(&meta.chunks).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), FsError> {
        self.kv.delete_all().await?;
        Ok(())
    }
}
