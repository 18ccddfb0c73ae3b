//! Per-path mutex set.
//!
//! One fair FIFO mutex per file path, created lazily on first request and
//! retained. `lock_many` deduplicates its input before acquiring — the
//! same path twice in one batch would otherwise deadlock against itself —
//! and acquires across paths concurrently; paths are independent, and
//! batches are already serialised by the volume actor, so no global lock
//! order is needed.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures_util::future;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Lazily grown set of per-path mutexes.
#[derive(Debug, Default)]
pub struct FileLocker {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

/// Scoped guard over a batch's paths; dropping it releases every mutex.
#[derive(Debug)]
pub struct LockGuard {
    paths: Vec<String>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl LockGuard {
    /// The deduplicated paths held, in first-occurrence order.
    pub fn paths(&self) -> &[String] {
        &self.paths
    }
}

impl FileLocker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the mutex for every distinct path in `paths`.
    ///
    /// Duplicates are dropped preserving first occurrence.
    pub async fn lock_many<I, S>(&self, paths: I) -> LockGuard
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut deduped = Vec::new();
        for path in paths {
            let path = path.into();
            if seen.insert(path.clone()) {
                deduped.push(path);
            }
        }

        let mutexes: Vec<Arc<Mutex<()>>> = {
            let mut locks = self.locks.lock().await;
            deduped
                .iter()
                .map(|path| locks.entry(path.clone()).or_default().clone())
                .collect()
        };

        let guards = future::join_all(mutexes.into_iter().map(Mutex::lock_owned)).await;
        LockGuard { paths: deduped, _guards: guards }
    }

    /// Number of paths that have ever been locked.
    pub async fn tracked_paths(&self) -> usize {
        self.locks.lock().await.len()
    }
}
