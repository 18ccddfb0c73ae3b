//! Volume registry: one actor per volume id, created lazily on first touch.
//!
//! Ids carrying the `ephemeral:` prefix get a memory-only volume; every
//! other id opens (or reuses) a RocksDB directory under the registry's
//! data dir, so the volume hydrates from its previous life.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use log::info;
use tokio::sync::RwLock;

use crate::error::VolumeError;
use crate::storage::{KvConfig, KvStore, RocksKv};
use crate::volume::{is_ephemeral, Volume, VolumeConfig, VolumeHandle};

/// Registry-wide configuration.
#[derive(Debug, Clone, Default)]
pub struct RegistryConfig {
    /// Root directory for per-volume RocksDB databases. `None` makes every
    /// volume memory-only regardless of id.
    pub data_dir: Option<PathBuf>,
    /// Settings applied to each spawned volume.
    pub volume: VolumeConfig,
}

/// Map of live volume actors.
pub struct VolumeRegistry {
    config: RegistryConfig,
    volumes: RwLock<HashMap<String, VolumeHandle>>,
}

impl VolumeRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            volumes: RwLock::new(HashMap::new()),
        }
    }

    /// Memory-only registry (tests, ephemeral deployments).
    pub fn in_memory() -> Self {
        Self::new(RegistryConfig::default())
    }

    /// Get the volume named `id`, spawning its actor on first touch.
    pub async fn get_or_create(&self, id: &str) -> Result<VolumeHandle, VolumeError> {
        // Fast path: read lock.
        {
            let volumes = self.volumes.read().await;
            if let Some(handle) = volumes.get(id) {
                return Ok(handle.clone());
            }
        }

        // Slow path: write lock, re-check, then spawn.
        let mut volumes = self.volumes.write().await;
        if let Some(handle) = volumes.get(id) {
            return Ok(handle.clone());
        }

        let durable_kv = self.open_durable(id)?;
        let handle = Volume::spawn(id, self.config.volume.clone(), durable_kv).await?;
        volumes.insert(id.to_string(), handle.clone());
        info!("registry: volume {id} started ({} live)", volumes.len());
        Ok(handle)
    }

    /// Look up a volume without creating it.
    pub async fn get(&self, id: &str) -> Option<VolumeHandle> {
        self.volumes.read().await.get(id).cloned()
    }

    /// Number of live volume actors.
    pub async fn volume_count(&self) -> usize {
        self.volumes.read().await.len()
    }

    fn open_durable(&self, id: &str) -> Result<Option<Arc<dyn KvStore>>, VolumeError> {
        if is_ephemeral(id) {
            return Ok(None);
        }
        let Some(data_dir) = &self.config.data_dir else {
            return Ok(None);
        };
        let path = data_dir.join(sanitize_id(id));
        let kv = RocksKv::open(KvConfig::at(path))
            .map_err(|e| VolumeError::Internal(e.to_string()))?;
        Ok(Some(Arc::new(kv)))
    }
}

/// Volume ids appear in database directory names; keep them path-safe.
fn sanitize_id(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
