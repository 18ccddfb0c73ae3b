//! Two-tier file storage.
//!
//! ```text
//! ┌────────────────────────────────────────────┐
//! │                 TieredFs                   │
//! │                                            │
//! │   reads ──► MemFs (fastest tier)           │
//! │                                            │
//! │   writes ─► MemFs ──┬── DurableFs          │
//! │                     │      │               │
//! │                     │      ▼               │
//! │                     │   KvStore            │
//! │                     │   meta::/chunk::     │
//! │                     │   (RocksKv | MemKv)  │
//! └─────────────────────┴──────────────────────┘
//! ```
//!
//! Every tier speaks the same five-operation [`FileStore`] surface, so the
//! actor above is indifferent to how many tiers a volume carries.

use async_trait::async_trait;

use crate::error::FsError;

pub mod durable;
pub mod kv;
pub mod memfs;
pub mod rocks;
pub mod tiered;

pub use durable::{DurableFs, CHUNK_SIZE};
pub use kv::{KvStore, MemKv};
pub use memfs::MemFs;
pub use rocks::{KvConfig, RocksKv};
pub use tiered::TieredFs;

/// Uniform file store surface: flat string paths, whole-file UTF-8 values.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Read a file's full content. `NotFound` when absent.
    async fn read_file(&self, path: &str) -> Result<String, FsError>;

    /// Every file path starting with `prefix`, in lexical order.
    async fn readdir(&self, prefix: &str) -> Result<Vec<String>, FsError>;

    /// Create or replace a file.
    async fn write_file(&self, path: &str, content: &str) -> Result<(), FsError>;

    /// Remove a file; missing files are a silent no-op.
    async fn unlink(&self, path: &str) -> Result<(), FsError>;

    /// Remove every file.
    async fn clear(&self) -> Result<(), FsError>;
}
