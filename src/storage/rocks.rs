//! RocksDB-backed [`KvStore`].
//!
//! One database directory per volume, flat key namespace (`meta::` /
//! `chunk::` prefixes are applied by the durable file tier above). Tuned
//! the same way as any hot point-lookup store:
//!
//! - Block-based tables with bloom filters and an LRU block cache
//! - LZ4 compression at the table level, so stored value bytes stay raw
//! - `WriteBatch` for multi-key atomicity
//!
//! Reference: Kleppmann — DDIA, Chapter 3 (LSM Trees, SSTables)

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rocksdb::{
    BlockBasedOptions, Cache, DBCompressionType, DBWithThreadMode, Direction, IteratorMode,
    Options, SingleThreaded, WriteBatch, WriteOptions,
};

use crate::error::KvError;
use crate::storage::kv::KvStore;

/// RocksDB tuning knobs.
#[derive(Debug, Clone)]
pub struct KvConfig {
    /// Database directory path
    pub path: PathBuf,
    /// Block cache size in bytes (default: 64MB)
    pub block_cache_size: usize,
    /// Bloom filter bits per key (default: 10)
    pub bloom_filter_bits: f64,
    /// Enable fsync on every write (default: false)
    pub sync_writes: bool,
    /// Max open files for RocksDB (default: 256)
    pub max_open_files: i32,
    /// Memtable size (default: 32MB)
    pub write_buffer_size: usize,
}

impl Default for KvConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("driftfs_data"),
            block_cache_size: 64 * 1024 * 1024,
            bloom_filter_bits: 10.0,
            sync_writes: false,
            max_open_files: 256,
            write_buffer_size: 32 * 1024 * 1024,
        }
    }
}

impl KvConfig {
    /// Config rooted at `path` with production defaults.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), ..Self::default() }
    }

    /// Small-cache config for tests.
    pub fn for_testing(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            block_cache_size: 4 * 1024 * 1024,
            bloom_filter_bits: 10.0,
            sync_writes: false,
            max_open_files: 64,
            write_buffer_size: 2 * 1024 * 1024,
        }
    }
}

/// RocksDB-backed key-value store.
pub struct RocksKv {
    /// Single-threaded mode — request concurrency is serialised by the
    /// volume actor above.
    db: DBWithThreadMode<SingleThreaded>,
    config: KvConfig,
}

impl RocksKv {
    /// Open (creating if missing) the database at the configured path.
    pub fn open(config: KvConfig) -> Result<Self, KvError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_max_open_files(config.max_open_files);
        opts.set_keep_log_file_num(5);
        opts.set_write_buffer_size(config.write_buffer_size);
        opts.set_compression_type(DBCompressionType::Lz4);

        let mut block_opts = BlockBasedOptions::default();
        let cache = Cache::new_lru_cache(config.block_cache_size);
        block_opts.set_block_cache(&cache);
        block_opts.set_bloom_filter(config.bloom_filter_bits, false);
        block_opts.set_block_size(16 * 1024);
        opts.set_block_based_table_factory(&block_opts);

        let db = DBWithThreadMode::<SingleThreaded>::open(&opts, &config.path)?;
        Ok(Self { db, config })
    }

    /// The database directory.
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    fn write_opts(&self) -> WriteOptions {
        let mut opts = WriteOptions::default();
        opts.set_sync(self.config.sync_writes);
        opts
    }

    /// All keys under `prefix`, with value sizes.
    fn scan_prefix(&self, prefix: &str) -> Result<BTreeMap<String, usize>, KvError> {
        let mut found = BTreeMap::new();
        let iter = self
            .db
            .iterator(IteratorMode::From(prefix.as_bytes(), Direction::Forward));
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            let key = String::from_utf8_lossy(&key).into_owned();
            found.insert(key, value.len());
        }
        Ok(found)
    }
}

#[async_trait]
impl KvStore for RocksKv {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        Ok(self.db.get(key.as_bytes())?)
    }

    async fn get_many(&self, keys: &[String]) -> Result<BTreeMap<String, Vec<u8>>, KvError> {
        let mut found = BTreeMap::new();
        for (key, value) in keys.iter().zip(self.db.multi_get(keys.iter())) {
            if let Some(value) = value? {
                found.insert(key.clone(), value);
            }
        }
        Ok(found)
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), KvError> {
        Ok(self.db.put_opt(key.as_bytes(), value, &self.write_opts())?)
    }

    async fn put_many(&self, entries: Vec<(String, Vec<u8>)>) -> Result<(), KvError> {
        let mut batch = WriteBatch::default();
        for (key, value) in entries {
            batch.put(key.as_bytes(), value);
        }
        Ok(self.db.write_opt(batch, &self.write_opts())?)
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        Ok(self.db.delete_opt(key.as_bytes(), &self.write_opts())?)
    }

    async fn delete_many(&self, keys: &[String]) -> Result<(), KvError> {
        let mut batch = WriteBatch::default();
        for key in keys {
            batch.delete(key.as_bytes());
        }
        Ok(self.db.write_opt(batch, &self.write_opts())?)
    }

    async fn delete_all(&self) -> Result<(), KvError> {
        let keys: Vec<String> = self.scan_prefix("")?.into_keys().collect();
        let mut batch = WriteBatch::default();
        for key in &keys {
            batch.delete(key.as_bytes());
        }
        Ok(self.db.write_opt(batch, &self.write_opts())?)
    }

    async fn list(&self, prefix: &str) -> Result<BTreeMap<String, usize>, KvError> {
        self.scan_prefix(prefix)
    }
}
