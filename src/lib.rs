//! # driftfs — per-volume realtime collaborative filesystem
//!
//! Clients connect to a named volume, share a flat tree of text/JSON
//! files, mutate them through three patch families, and subscribe to an
//! ordered stream of change events.
//!
//! ## Architecture
//!
//! ```text
//! PATCH/LIST/PUT ──► VolumeHandle ──► Volume actor (single writer)
//!                                        │
//!                            ┌───────────┼──────────────┐
//!                            ▼           ▼              ▼
//!                       FileLocker   text_sessions   TieredFs
//!                       (per-path)   (BIT per base)  MemFs ─ DurableFs ─ KvStore
//!                                        │
//!                          commit ok     ▼
//!                            └────► SubscriberRegistry ──► WebSocket peers
//! ```
//!
//! Each volume is one actor: every request is serialised, so a batch can
//! stage its writes locally and commit all-or-nothing. Concurrent text
//! edits against the same baseline are merged positionally — a Fenwick
//! tree per session rebases client offsets through the drift of
//! previously accepted edits.
//!
//! ## Modules
//!
//! - [`bit`] — Fenwick tree used for positional rebasing
//! - [`text`] — text ops, session apply, LCS diff
//! - [`jsonpatch`] — RFC 6902 reducer
//! - [`patch`] — patch classification and per-patch results
//! - [`protocol`] — request/response/event wire types
//! - [`storage`] — MemFs / DurableFs / TieredFs over a KvStore
//! - [`locker`] — per-path mutex set
//! - [`volume`] — the volume actor
//! - [`registry`] — lazy volume creation, ephemeral volumes
//! - [`broadcast`] — subscriber registry and event fan-out
//! - [`server`] — WebSocket subscribe endpoint

pub mod bit;
pub mod broadcast;
pub mod error;
pub mod jsonpatch;
pub mod locker;
pub mod patch;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod storage;
pub mod text;
pub mod volume;

// Re-exports for convenience
pub use bit::Bit;
pub use broadcast::{BroadcastStats, SubscriberId, SubscriberRegistry};
pub use error::{FsError, KvError, VolumeError};
pub use jsonpatch::{apply_patch, JsonPatchError, JsonPatchOp};
pub use locker::{FileLocker, LockGuard};
pub use patch::{FilePatch, FilePatchResult};
pub use protocol::{
    ContentSelector, FileEntry, PutEntry, ServerEvent, VolumeListResponse, VolumePatchRequest,
    VolumePatchResponse,
};
pub use registry::{RegistryConfig, VolumeRegistry};
pub use server::{ServerConfig, ServerStats, VolumeServer};
pub use storage::{DurableFs, FileStore, KvConfig, KvStore, MemFs, MemKv, RocksKv, TieredFs};
pub use text::{diff, TextError, TextOp};
pub use volume::{
    is_ephemeral, Volume, VolumeConfig, VolumeHandle, VolumeStats, EPHEMERAL_PREFIX,
};
