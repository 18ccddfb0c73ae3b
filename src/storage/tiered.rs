//! Write-through composite file store.
//!
//! Reads hit only the fastest tier; writes, unlinks, and clears fan out to
//! every tier concurrently and surface the first error. The volume actor
//! hydrates the fast tier from the slowest at boot, so after any fully
//! successful commit the tiers agree byte-for-byte.

use std::sync::Arc;

use futures_util::future;

use crate::error::FsError;
use crate::storage::FileStore;

/// Ordered tiers, fastest first.
pub struct TieredFs {
    tiers: Vec<Arc<dyn FileStore>>,
}

impl TieredFs {
    /// Build from tiers ordered fastest → slowest. At least one tier is
    /// required.
    pub fn new(tiers: Vec<Arc<dyn FileStore>>) -> Self {
        assert!(!tiers.is_empty(), "TieredFs requires at least one tier");
        Self { tiers }
    }

    fn fastest(&self) -> &dyn FileStore {
        self.tiers[0].as_ref()
    }
}

#[async_trait::async_trait]
impl FileStore for TieredFs {
    async fn read_file(&self, path: &str) -> Result<String, FsError> {
        self.fastest().read_file(path).await
    }

    async fn readdir(&self, prefix: &str) -> Result<Vec<String>, FsError> {
        self.fastest().readdir(prefix).await
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<(), FsError> {
        future::try_join_all(
            self.tiers
                .iter()
                .map(|tier| tier.write_file(path, content)),
        )
        .await?;
        Ok(())
    }

    async fn unlink(&self, path: &str) -> Result<(), FsError> {
        future::try_join_all(self.tiers.iter().map(|tier| tier.unlink(path))).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), FsError> {
        future::try_join_all(self.tiers.iter().map(|tier| tier.clear())).await?;
        Ok(())
    }
}
