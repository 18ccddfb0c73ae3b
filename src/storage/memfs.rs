//! In-memory file tier.
//!
//! Fast read path of the tiered store and the only tier of ephemeral
//! volumes. Paths are flat keys; `readdir` is a prefix scan.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::FsError;
use crate::storage::FileStore;

/// Path → bytes map with the five file operations.
#[derive(Debug, Default)]
pub struct MemFs {
    files: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of files currently held.
    pub fn len(&self) -> usize {
        self.files.read().map(|f| f.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_err() -> FsError {
        FsError::Storage(crate::error::KvError::Unavailable("lock poisoned".into()))
    }
}

#[async_trait]
impl FileStore for MemFs {
    async fn read_file(&self, path: &str) -> Result<String, FsError> {
        let files = self.files.read().map_err(|_| Self::lock_err())?;
        let bytes = files
            .get(path)
            .ok_or_else(|| FsError::NotFound(path.to_string()))?;
        String::from_utf8(bytes.clone()).map_err(|_| FsError::InvalidUtf8(path.to_string()))
    }

    async fn readdir(&self, prefix: &str) -> Result<Vec<String>, FsError> {
        let files = self.files.read().map_err(|_| Self::lock_err())?;
        Ok(files
            .range(prefix.to_string()..)
            .take_while(|(path, _)| path.starts_with(prefix))
            .map(|(path, _)| path.clone())
            .collect())
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<(), FsError> {
        let mut files = self.files.write().map_err(|_| Self::lock_err())?;
        files.insert(path.to_string(), content.as_bytes().to_vec());
        Ok(())
    }

    async fn unlink(&self, path: &str) -> Result<(), FsError> {
        // Idempotent: a missing file is already unlinked.
        let mut files = self.files.write().map_err(|_| Self::lock_err())?;
        files.remove(path);
        Ok(())
    }

    async fn clear(&self) -> Result<(), FsError> {
        let mut files = self.files.write().map_err(|_| Self::lock_err())?;
        files.clear();
        Ok(())
    }
}
