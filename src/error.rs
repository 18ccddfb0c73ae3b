//! Error types shared across the storage tiers and the volume actor.

use thiserror::Error;

/// Key-value storage errors.
#[derive(Debug, Clone, Error)]
pub enum KvError {
    /// Backend database fault.
    #[error("database error: {0}")]
    Database(String),

    /// Typed value framing failed on encode.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Typed value framing failed on decode.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Store has been closed or its lock was poisoned.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<rocksdb::Error> for KvError {
    fn from(e: rocksdb::Error) -> Self {
        KvError::Database(e.to_string())
    }
}

/// File store errors.
///
/// The first five kinds mirror the errno family the file surface speaks.
/// Only `NotFound` is raised today; the rest are reserved for directory
/// semantics the flat-key namespace does not yet have.
#[derive(Debug, Error)]
pub enum FsError {
    /// ENOENT — read or unlink on a missing file.
    #[error("no such file: {0}")]
    NotFound(String),

    /// ENOTDIR.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// EEXIST.
    #[error("file exists: {0}")]
    AlreadyExists(String),

    /// ENOTEMPTY.
    #[error("directory not empty: {0}")]
    NotEmpty(String),

    /// ESTALE.
    #[error("stale file handle: {0}")]
    Stale(String),

    /// File bytes did not decode as UTF-8.
    #[error("invalid utf-8 in file: {0}")]
    InvalidUtf8(String),

    /// Underlying key-value fault.
    #[error(transparent)]
    Storage(#[from] KvError),
}

impl FsError {
    /// True when this is the swallowable missing-file case.
    pub fn is_not_found(&self) -> bool {
        matches!(self, FsError::NotFound(_))
    }
}

/// Volume-level errors surfaced at the request boundary.
///
/// Per-patch rejections are not errors — they travel as `accepted=false`
/// entries in the result vector. These kinds cover whole-request faults.
#[derive(Debug, Error)]
pub enum VolumeError {
    /// The whole request conflicts with volume state (409 equivalent).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Unexpected fault (500 equivalent).
    #[error("internal error: {0}")]
    Internal(String),

    /// The volume actor has shut down and can no longer answer.
    #[error("volume actor is gone")]
    ActorGone,

    /// File store fault.
    #[error(transparent)]
    Fs(#[from] FsError),
}
