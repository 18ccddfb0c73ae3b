//! The volume actor: a single-writer loop over one volume's state.
//!
//! ```text
//!              VolumeHandle (Clone)        mpsc         Volume (spawned task)
//!              ┌──────────────────┐    ──────────▶   ┌──────────────────────┐
//!              │ .patch()         │                  │ timestamp            │
//!              │ .list()          │    ◀──────────   │ text_sessions (BIT)  │
//!              │ .put()           │      oneshot     │ TieredFs             │
//!              │ .subscribe()     │                  │ FileLocker           │
//!              └──────────────────┘                  └──────────┬───────────┘
//!                                                               │ after commit
//!                                                               ▼
//!                                                    SubscriberRegistry
//! ```
//!
//! A PATCH batch walks a fixed pipeline:
//! `Idle → Locked → Applied → {Committed → Broadcast | Rejected} → Idle`.
//! The apply phase stages everything in local state — a concurrent LIST
//! can never observe a half-applied batch — and the commit gate writes
//! through the tiers only when every result was accepted.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use futures_util::future;
use log::{debug, error, info, warn};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::bit::Bit;
use crate::broadcast::{SubscriberId, SubscriberRegistry};
use crate::error::{FsError, VolumeError};
use crate::jsonpatch;
use crate::locker::FileLocker;
use crate::patch::{FilePatch, FilePatchResult};
use crate::protocol::{
    ContentSelector, FileEntry, PutEntry, ServerEvent, VolumeListResponse, VolumePatchRequest,
    VolumePatchResponse,
};
use crate::storage::{DurableFs, FileStore, KvStore, MemFs, TieredFs};
use crate::text;

/// Volume ids with this prefix never attach a durable tier.
pub const EPHEMERAL_PREFIX: &str = "ephemeral:";

/// True when `id` names a memory-only volume.
pub fn is_ephemeral(id: &str) -> bool {
    id.starts_with(EPHEMERAL_PREFIX)
}

/// Per-volume tuning.
#[derive(Debug, Clone)]
pub struct VolumeConfig {
    /// Text-edit sessions retained before the oldest is evicted.
    pub session_capacity: usize,
    /// Events buffered per subscriber before it starts lagging.
    pub broadcast_capacity: usize,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            session_capacity: 256,
            broadcast_capacity: 256,
        }
    }
}

/// Counters for one volume's lifetime.
#[derive(Debug, Clone, Default)]
pub struct VolumeStats {
    pub patch_batches: u64,
    pub patches_accepted: u64,
    pub patches_rejected: u64,
    pub events_broadcast: u64,
}

/// A file staged during the apply phase, visible only to later patches in
/// the same batch until the commit gate runs.
#[derive(Debug, Clone)]
struct StagedFile {
    content: String,
    deleted: bool,
}

enum VolumeCommand {
    Patch {
        request: VolumePatchRequest,
        reply: oneshot::Sender<Result<VolumePatchResponse, VolumeError>>,
    },
    List {
        prefix: String,
        selector: ContentSelector,
        reply: oneshot::Sender<Result<VolumeListResponse, VolumeError>>,
    },
    Put {
        entries: BTreeMap<String, PutEntry>,
        reply: oneshot::Sender<Result<(), VolumeError>>,
    },
    Timestamp {
        reply: oneshot::Sender<u64>,
    },
    Stats {
        reply: oneshot::Sender<VolumeStats>,
    },
}

/// Cloneable handle to a volume actor.
///
/// Every method enqueues a command and awaits the actor's reply, so all
/// callers observe the volume in strict arrival order.
#[derive(Clone)]
pub struct VolumeHandle {
    id: String,
    tx: mpsc::UnboundedSender<VolumeCommand>,
    subscribers: Arc<SubscriberRegistry>,
}

impl VolumeHandle {
    /// The volume's id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Apply a patch batch.
    pub async fn patch(
        &self,
        request: VolumePatchRequest,
    ) -> Result<VolumePatchResponse, VolumeError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(VolumeCommand::Patch { request, reply })
            .map_err(|_| VolumeError::ActorGone)?;
        rx.await.map_err(|_| VolumeError::ActorGone)?
    }

    /// Snapshot the namespace under `prefix`.
    pub async fn list(
        &self,
        prefix: &str,
        selector: ContentSelector,
    ) -> Result<VolumeListResponse, VolumeError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(VolumeCommand::List {
                prefix: prefix.to_string(),
                selector,
                reply,
            })
            .map_err(|_| VolumeError::ActorGone)?;
        rx.await.map_err(|_| VolumeError::ActorGone)?
    }

    /// Replace the whole namespace with `entries`.
    pub async fn put(&self, entries: BTreeMap<String, PutEntry>) -> Result<(), VolumeError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(VolumeCommand::Put { entries, reply })
            .map_err(|_| VolumeError::ActorGone)?;
        rx.await.map_err(|_| VolumeError::ActorGone)?
    }

    /// Register a message sink; events arrive JSON-encoded in commit order.
    pub async fn subscribe(&self) -> (SubscriberId, broadcast::Receiver<Arc<String>>) {
        self.subscribers.subscribe().await
    }

    /// Remove a sink on disconnect.
    pub async fn unsubscribe(&self, id: &SubscriberId) {
        self.subscribers.unsubscribe(id).await;
    }

    /// The current logical version.
    pub async fn timestamp(&self) -> Result<u64, VolumeError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(VolumeCommand::Timestamp { reply })
            .map_err(|_| VolumeError::ActorGone)?;
        rx.await.map_err(|_| VolumeError::ActorGone)
    }

    /// Lifetime counters.
    pub async fn stats(&self) -> Result<VolumeStats, VolumeError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(VolumeCommand::Stats { reply })
            .map_err(|_| VolumeError::ActorGone)?;
        rx.await.map_err(|_| VolumeError::ActorGone)
    }
}

/// Actor state; owned by the spawned task, never shared.
pub struct Volume {
    id: String,
    config: VolumeConfig,
    /// Logical version; strictly increases on every PATCH.
    timestamp: u64,
    /// One BIT per session baseline that has been handed to clients.
    text_sessions: BTreeMap<u64, Bit>,
    subscribers: Arc<SubscriberRegistry>,
    fs: TieredFs,
    locker: FileLocker,
    stats: VolumeStats,
}

impl Volume {
    /// Hydrate from the durable tier (when present) and start the actor.
    ///
    /// No command is processed until hydration completes, so requests can
    /// never race a half-loaded fast tier. Pass `None` for ephemeral
    /// volumes.
    pub async fn spawn(
        id: impl Into<String>,
        config: VolumeConfig,
        durable_kv: Option<Arc<dyn KvStore>>,
    ) -> Result<VolumeHandle, VolumeError> {
        let id = id.into();
        let mem = Arc::new(MemFs::new());
        let durable = durable_kv.map(|kv| Arc::new(DurableFs::new(kv)));

        let mut tiers: Vec<Arc<dyn FileStore>> = vec![mem.clone()];
        if let Some(durable) = &durable {
            tiers.push(durable.clone());
            let loaded = hydrate(mem.as_ref(), durable.as_ref()).await?;
            info!("volume {id}: hydrated {loaded} files from durable tier");
        } else {
            debug!("volume {id}: ephemeral, no durable tier");
        }

        let timestamp = now_millis();
        let mut text_sessions = BTreeMap::new();
        text_sessions.insert(timestamp, Bit::new());

        let subscribers = Arc::new(SubscriberRegistry::new(config.broadcast_capacity));
        let volume = Volume {
            id: id.clone(),
            config,
            timestamp,
            text_sessions,
            subscribers: subscribers.clone(),
            fs: TieredFs::new(tiers),
            locker: FileLocker::new(),
            stats: VolumeStats::default(),
        };

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(volume.run(rx));
        Ok(VolumeHandle { id, tx, subscribers })
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<VolumeCommand>) {
        info!("volume {}: actor started at version {}", self.id, self.timestamp);
        while let Some(command) = rx.recv().await {
            match command {
                VolumeCommand::Patch { request, reply } => {
                    let _ = reply.send(self.handle_patch(request).await);
                }
                VolumeCommand::List { prefix, selector, reply } => {
                    let _ = reply.send(self.handle_list(&prefix, &selector).await);
                }
                VolumeCommand::Put { entries, reply } => {
                    let _ = reply.send(self.handle_put(entries).await);
                }
                VolumeCommand::Timestamp { reply } => {
                    let _ = reply.send(self.timestamp);
                }
                VolumeCommand::Stats { reply } => {
                    let _ = reply.send(self.stats.clone());
                }
            }
        }
        info!("volume {}: actor stopped", self.id);
    }

    // ─── PATCH ────────────────────────────────────────────────────────

    async fn handle_patch(
        &mut self,
        request: VolumePatchRequest,
    ) -> Result<VolumePatchResponse, VolumeError> {
        // 1. Lock the batch's paths, deduped to first occurrence.
        let _guard = self
            .locker
            .lock_many(request.patches.iter().map(|p| p.path().to_string()))
            .await;

        // 2. Apply phase: all effects stay in `staged` and session BITs.
        //    Later patches in the batch read through the staged view.
        let mut staged: HashMap<String, StagedFile> = HashMap::new();
        let mut results = Vec::with_capacity(request.patches.len());
        for patch in &request.patches {
            results.push(self.apply_one(patch, &mut staged).await);
        }

        // 3. The logical version advances whether or not the batch lands,
        //    and a fresh session is installed at the new version.
        self.timestamp = next_timestamp(self.timestamp);
        self.text_sessions.insert(self.timestamp, Bit::new());
        while self.text_sessions.len() > self.config.session_capacity {
            self.text_sessions.pop_first();
        }
        let timestamp = self.timestamp;

        // 4. Commit gate: all-or-nothing across the batch.
        if results.iter().all(|r| r.accepted) {
            for result in &mut results {
                let outcome = if result.is_deleted() {
                    self.fs.unlink(&result.path).await
                } else {
                    self.fs
                        .write_file(&result.path, result.content.as_deref().unwrap_or(""))
                        .await
                };
                if let Err(e) = outcome {
                    error!("volume {}: commit of {} failed: {e}", self.id, result.path);
                    result.accepted = false;
                }
            }

            // 5. Broadcast gate: announce only a fully committed batch.
            if results.iter().all(|r| r.accepted) {
                for result in &results {
                    let event = if result.is_deleted() {
                        ServerEvent::deleted(request.message_id.clone(), &result.path, timestamp)
                    } else {
                        ServerEvent::written(request.message_id.clone(), &result.path, timestamp)
                    };
                    self.subscribers.broadcast(&event);
                    self.stats.events_broadcast += 1;
                }
            }
        } else {
            debug!(
                "volume {}: batch rejected, {} of {} patches refused",
                self.id,
                results.iter().filter(|r| !r.accepted).count(),
                results.len()
            );
        }

        self.stats.patch_batches += 1;
        for result in &results {
            if result.accepted {
                self.stats.patches_accepted += 1;
            } else {
                self.stats.patches_rejected += 1;
            }
        }

        Ok(VolumePatchResponse { timestamp, results })
    }

    /// Apply one patch against the staged view. Never touches the stores.
    async fn apply_one(
        &mut self,
        patch: &FilePatch,
        staged: &mut HashMap<String, StagedFile>,
    ) -> FilePatchResult {
        match patch {
            FilePatch::Json { path, patches } => {
                let old = match self.read_current(staged, path).await {
                    Ok(current) => current.unwrap_or_else(|| "{}".to_string()),
                    Err(e) => {
                        warn!("volume {}: read of {path} failed: {e}", self.id);
                        return FilePatchResult::rejected(path.clone(), None);
                    }
                };
                let document: Value = match serde_json::from_str(&old) {
                    Ok(document) => document,
                    Err(e) => {
                        debug!("volume {}: {path} is not JSON: {e}", self.id);
                        return FilePatchResult::rejected(path.clone(), Some(old));
                    }
                };
                match jsonpatch::apply_patch(document, patches) {
                    Ok(value) => {
                        let content = value.to_string();
                        let deleted = value.is_null();
                        staged.insert(
                            path.clone(),
                            StagedFile { content: content.clone(), deleted },
                        );
                        FilePatchResult {
                            path: path.clone(),
                            accepted: true,
                            content: Some(content),
                            deleted: deleted.then_some(true),
                        }
                    }
                    Err(e) => {
                        debug!("volume {}: json patch on {path} refused: {e}", self.id);
                        FilePatchResult::rejected(path.clone(), Some(old))
                    }
                }
            }

            FilePatch::Set { path, content } => {
                let content = content.clone().unwrap_or_default();
                staged.insert(
                    path.clone(),
                    StagedFile { content: content.clone(), deleted: false },
                );
                FilePatchResult::accepted(path.clone(), content)
            }

            FilePatch::Text { path, timestamp, operations } => {
                let old = match self.read_current(staged, path).await {
                    Ok(current) => current.unwrap_or_default(),
                    Err(e) => {
                        warn!("volume {}: read of {path} failed: {e}", self.id);
                        return FilePatchResult::rejected(path.clone(), None);
                    }
                };
                let Some(bit) = self.text_sessions.get_mut(timestamp) else {
                    debug!(
                        "volume {}: text patch on {path} refers to expired session {timestamp}",
                        self.id
                    );
                    return FilePatchResult::rejected(path.clone(), Some(old));
                };
                match text::apply_ops(&old, operations, bit) {
                    Ok(content) => {
                        staged.insert(
                            path.clone(),
                            StagedFile { content: content.clone(), deleted: false },
                        );
                        FilePatchResult::accepted(path.clone(), content)
                    }
                    Err(e) => {
                        // apply_ops already rolled its BIT mutations back.
                        debug!("volume {}: text patch on {path} refused: {e}", self.id);
                        FilePatchResult::rejected(path.clone(), Some(old))
                    }
                }
            }
        }
    }

    /// Current content of `path`: the staged view when the batch already
    /// touched it, otherwise the committed bytes. `None` means absent.
    async fn read_current(
        &self,
        staged: &HashMap<String, StagedFile>,
        path: &str,
    ) -> Result<Option<String>, FsError> {
        if let Some(entry) = staged.get(path) {
            return Ok(if entry.deleted {
                None
            } else {
                Some(entry.content.clone())
            });
        }
        match self.fs.read_file(path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    // ─── LIST / PUT ───────────────────────────────────────────────────

    async fn handle_list(
        &self,
        prefix: &str,
        selector: &ContentSelector,
    ) -> Result<VolumeListResponse, VolumeError> {
        let mut fs = BTreeMap::new();
        for path in self.fs.readdir(prefix).await? {
            let content = if selector.includes(&path) {
                Some(self.fs.read_file(&path).await?)
            } else {
                None
            };
            fs.insert(path, FileEntry { content });
        }
        Ok(VolumeListResponse {
            timestamp: self.timestamp,
            volume_id: self.id.clone(),
            fs,
        })
    }

    async fn handle_put(
        &mut self,
        entries: BTreeMap<String, PutEntry>,
    ) -> Result<(), VolumeError> {
        self.fs.clear().await?;
        let fs = &self.fs;
        future::try_join_all(
            entries
                .iter()
                .map(|(path, entry)| fs.write_file(path, &entry.content)),
        )
        .await?;
        info!("volume {}: namespace replaced with {} files", self.id, entries.len());

        for path in entries.keys() {
            self.subscribers
                .broadcast(&ServerEvent::written(None, path, self.timestamp));
            self.stats.events_broadcast += 1;
        }
        Ok(())
    }
}

/// Copy every durable file into the fast tier.
async fn hydrate(mem: &MemFs, durable: &DurableFs) -> Result<usize, FsError> {
    let paths = durable.readdir("/").await?;
    for path in &paths {
        let content = durable.read_file(path).await?;
        mem.write_file(path, &content).await?;
        debug!("hydrated {path}");
    }
    Ok(paths.len())
}

/// Wall clock in milliseconds.
fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Next logical version: wall clock, bumped past `prev` when the clock
/// has not advanced.
fn next_timestamp(prev: u64) -> u64 {
    now_millis().max(prev + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jsonpatch::JsonPatchOp;
    use crate::patch::FilePatch;
    use crate::storage::MemKv;
    use crate::text::TextOp;
    use serde_json::json;

    async fn ephemeral_volume() -> VolumeHandle {
        Volume::spawn("ephemeral:test", VolumeConfig::default(), None)
            .await
            .unwrap()
    }

    fn json_add_root(path: &str, value: serde_json::Value) -> FilePatch {
        FilePatch::Json {
            path: path.into(),
            patches: vec![JsonPatchOp::Add { path: "".into(), value }],
        }
    }

    fn request(patches: Vec<FilePatch>) -> VolumePatchRequest {
        VolumePatchRequest { message_id: None, patches }
    }

    #[tokio::test]
    async fn test_create_three_files_in_one_batch() {
        let volume = ephemeral_volume().await;
        let response = volume
            .patch(request(vec![
                json_add_root("/home.json", json!({"title": "home"})),
                json_add_root("/pdp.json", json!({"title": "pdp"})),
                FilePatch::Set {
                    path: "/sections/ProductShelf.tsx".into(),
                    content: Some("BC".into()),
                },
            ]))
            .await
            .unwrap();

        assert!(response.all_accepted());
        assert_eq!(response.results.len(), 3);

        let listing = volume.list("/", ContentSelector::All).await.unwrap();
        assert_eq!(
            listing.fs["/home.json"].content.as_deref(),
            Some(r#"{"title":"home"}"#)
        );
        assert_eq!(
            listing.fs["/pdp.json"].content.as_deref(),
            Some(r#"{"title":"pdp"}"#)
        );
        assert_eq!(
            listing.fs["/sections/ProductShelf.tsx"].content.as_deref(),
            Some("BC")
        );
    }

    #[tokio::test]
    async fn test_list_without_content() {
        let volume = ephemeral_volume().await;
        volume
            .patch(request(vec![FilePatch::Set {
                path: "/a.txt".into(),
                content: Some("x".into()),
            }]))
            .await
            .unwrap();

        let listing = volume.list("/", ContentSelector::None).await.unwrap();
        assert_eq!(listing.fs.len(), 1);
        assert!(listing.fs["/a.txt"].content.is_none());
        assert_eq!(listing.volume_id, "ephemeral:test");
    }

    #[tokio::test]
    async fn test_list_with_prefix_selector() {
        let volume = ephemeral_volume().await;
        volume
            .patch(request(vec![
                FilePatch::Set { path: "/sections/a.tsx".into(), content: Some("A".into()) },
                FilePatch::Set { path: "/home.json".into(), content: Some("{}".into()) },
            ]))
            .await
            .unwrap();

        let listing = volume
            .list("/", ContentSelector::Prefix("/sections/".into()))
            .await
            .unwrap();
        assert_eq!(listing.fs["/sections/a.tsx"].content.as_deref(), Some("A"));
        assert!(listing.fs["/home.json"].content.is_none());
    }

    #[tokio::test]
    async fn test_text_patch_insertion() {
        let volume = ephemeral_volume().await;
        let seeded = volume
            .patch(request(vec![FilePatch::Set {
                path: "/s.tsx".into(),
                content: Some("BC".into()),
            }]))
            .await
            .unwrap();

        let response = volume
            .patch(request(vec![FilePatch::Text {
                path: "/s.tsx".into(),
                timestamp: seeded.timestamp,
                operations: vec![TextOp::insert(0, "A")],
            }]))
            .await
            .unwrap();

        assert!(response.all_accepted());
        assert_eq!(response.results[0].content.as_deref(), Some("ABC"));

        let listing = volume.list("/s.tsx", ContentSelector::All).await.unwrap();
        assert_eq!(listing.fs["/s.tsx"].content.as_deref(), Some("ABC"));
    }

    #[tokio::test]
    async fn test_interleaved_sessions_rebase() {
        let volume = ephemeral_volume().await;
        let seeded = volume
            .patch(request(vec![FilePatch::Set {
                path: "/s.tsx".into(),
                content: Some("ABC".into()),
            }]))
            .await
            .unwrap();
        let base = seeded.timestamp;

        let first = volume
            .patch(request(vec![FilePatch::Text {
                path: "/s.tsx".into(),
                timestamp: base,
                operations: vec![TextOp::insert(0, "!"), TextOp::insert(0, "Z")],
            }]))
            .await
            .unwrap();
        assert_eq!(first.results[0].content.as_deref(), Some("!ZABC"));

        // Reusing the original baseline: positions rebase through the
        // drift the first patch left in the session.
        let second = volume
            .patch(request(vec![FilePatch::Text {
                path: "/s.tsx".into(),
                timestamp: base,
                operations: vec![TextOp::insert(3, "!"), TextOp::delete(2, 1)],
            }]))
            .await
            .unwrap();
        assert_eq!(second.results[0].content.as_deref(), Some("!ZAB!"));
    }

    #[tokio::test]
    async fn test_failing_test_op_rejects_and_preserves_file() {
        let volume = ephemeral_volume().await;
        volume
            .patch(request(vec![json_add_root("/home.json", json!({"title": "home"}))]))
            .await
            .unwrap();

        let response = volume
            .patch(request(vec![FilePatch::Json {
                path: "/home.json".into(),
                patches: vec![
                    JsonPatchOp::Test { path: "/title".into(), value: json!("not home") },
                    JsonPatchOp::Replace { path: "/title".into(), value: json!("home") },
                ],
            }]))
            .await
            .unwrap();

        let result = &response.results[0];
        assert!(!result.accepted);
        assert_eq!(result.path, "/home.json");
        assert_eq!(result.content.as_deref(), Some(r#"{"title":"home"}"#));

        let listing = volume.list("/", ContentSelector::All).await.unwrap();
        assert_eq!(
            listing.fs["/home.json"].content.as_deref(),
            Some(r#"{"title":"home"}"#)
        );
    }

    #[tokio::test]
    async fn test_one_rejection_aborts_whole_batch() {
        let volume = ephemeral_volume().await;

        let response = volume
            .patch(request(vec![
                FilePatch::Set { path: "/ok.txt".into(), content: Some("fine".into()) },
                FilePatch::Text {
                    path: "/other.txt".into(),
                    timestamp: 1, // no such session
                    operations: vec![TextOp::insert(0, "x")],
                },
            ]))
            .await
            .unwrap();

        assert!(response.results[0].accepted);
        assert!(!response.results[1].accepted);

        // Atomicity: the accepted patch was not committed either.
        let listing = volume.list("/", ContentSelector::All).await.unwrap();
        assert!(listing.fs.is_empty());
    }

    #[tokio::test]
    async fn test_delete_via_json_remove() {
        let volume = ephemeral_volume().await;
        volume
            .patch(request(vec![json_add_root("/home/home.json", json!({"a": 1}))]))
            .await
            .unwrap();

        let (_, mut events) = volume.subscribe().await;
        let response = volume
            .patch(request(vec![FilePatch::Json {
                path: "/home/home.json".into(),
                patches: vec![JsonPatchOp::Remove { path: "".into() }],
            }]))
            .await
            .unwrap();

        let result = &response.results[0];
        assert!(result.accepted);
        assert_eq!(result.deleted, Some(true));

        let listing = volume.list("/", ContentSelector::All).await.unwrap();
        assert!(!listing.fs.contains_key("/home/home.json"));

        let event = ServerEvent::decode(&events.recv().await.unwrap()).unwrap();
        assert_eq!(event.path, "/home/home.json");
        assert_eq!(event.timestamp, response.timestamp);
        assert_eq!(event.deleted, Some(true));
    }

    #[tokio::test]
    async fn test_missing_json_file_starts_from_empty_object() {
        let volume = ephemeral_volume().await;
        let response = volume
            .patch(request(vec![FilePatch::Json {
                path: "/fresh.json".into(),
                patches: vec![JsonPatchOp::Add { path: "/k".into(), value: json!(1) }],
            }]))
            .await
            .unwrap();
        assert_eq!(response.results[0].content.as_deref(), Some(r#"{"k":1}"#));
    }

    #[tokio::test]
    async fn test_timestamps_strictly_increase() {
        let volume = ephemeral_volume().await;
        let mut previous = volume.timestamp().await.unwrap();
        for _ in 0..5 {
            // Rejected batches advance the version too.
            let response = volume
                .patch(request(vec![FilePatch::Text {
                    path: "/x".into(),
                    timestamp: 1,
                    operations: vec![],
                }]))
                .await
                .unwrap();
            assert!(response.timestamp > previous);
            previous = response.timestamp;
        }
    }

    #[tokio::test]
    async fn test_stale_session_rejected_with_current_content() {
        let volume = Volume::spawn(
            "ephemeral:tiny-sessions",
            VolumeConfig { session_capacity: 1, ..VolumeConfig::default() },
            None,
        )
        .await
        .unwrap();

        let seeded = volume
            .patch(request(vec![FilePatch::Set {
                path: "/f".into(),
                content: Some("body".into()),
            }]))
            .await
            .unwrap();
        let base = seeded.timestamp;

        // The next patch evicts the old session (capacity 1).
        volume
            .patch(request(vec![FilePatch::Set {
                path: "/g".into(),
                content: Some("other".into()),
            }]))
            .await
            .unwrap();

        let response = volume
            .patch(request(vec![FilePatch::Text {
                path: "/f".into(),
                timestamp: base,
                operations: vec![TextOp::insert(0, "x")],
            }]))
            .await
            .unwrap();

        let result = &response.results[0];
        assert!(!result.accepted);
        assert_eq!(result.content.as_deref(), Some("body"));
    }

    #[tokio::test]
    async fn test_later_patches_see_earlier_staged_effects() {
        let volume = ephemeral_volume().await;
        let response = volume
            .patch(request(vec![
                json_add_root("/doc.json", json!({"n": 1})),
                FilePatch::Json {
                    path: "/doc.json".into(),
                    patches: vec![JsonPatchOp::Replace { path: "/n".into(), value: json!(2) }],
                },
            ]))
            .await
            .unwrap();

        assert!(response.all_accepted());
        assert_eq!(response.results[1].content.as_deref(), Some(r#"{"n":2}"#));
    }

    #[tokio::test]
    async fn test_durable_volume_hydrates_on_restart() {
        let kv = Arc::new(MemKv::new());

        let volume = Volume::spawn("site", VolumeConfig::default(), Some(kv.clone()))
            .await
            .unwrap();
        volume
            .patch(request(vec![FilePatch::Set {
                path: "/persisted.txt".into(),
                content: Some("still here".into()),
            }]))
            .await
            .unwrap();

        // A second actor over the same KV sees the committed file.
        let restarted = Volume::spawn("site", VolumeConfig::default(), Some(kv))
            .await
            .unwrap();
        let listing = restarted.list("/", ContentSelector::All).await.unwrap();
        assert_eq!(
            listing.fs["/persisted.txt"].content.as_deref(),
            Some("still here")
        );
    }

    #[tokio::test]
    async fn test_tiers_agree_after_commit() {
        let kv = Arc::new(MemKv::new());
        let volume = Volume::spawn("site", VolumeConfig::default(), Some(kv.clone()))
            .await
            .unwrap();
        volume
            .patch(request(vec![
                FilePatch::Set { path: "/a".into(), content: Some("1".into()) },
                json_add_root("/b.json", json!({"x": true})),
            ]))
            .await
            .unwrap();

        // Read the durable tier directly and compare with the fast path.
        let durable = DurableFs::new(kv);
        for path in ["/a", "/b.json"] {
            let fast = volume.list(path, ContentSelector::All).await.unwrap();
            assert_eq!(
                fast.fs[path].content.as_deref().unwrap(),
                durable.read_file(path).await.unwrap()
            );
        }
    }

    #[tokio::test]
    async fn test_put_replaces_namespace_and_broadcasts() {
        let volume = ephemeral_volume().await;
        volume
            .patch(request(vec![FilePatch::Set {
                path: "/old.txt".into(),
                content: Some("gone soon".into()),
            }]))
            .await
            .unwrap();

        let (_, mut events) = volume.subscribe().await;
        let mut entries = BTreeMap::new();
        entries.insert("/new.txt".to_string(), PutEntry { content: "fresh".into() });
        volume.put(entries).await.unwrap();

        let listing = volume.list("/", ContentSelector::All).await.unwrap();
        assert!(!listing.fs.contains_key("/old.txt"));
        assert_eq!(listing.fs["/new.txt"].content.as_deref(), Some("fresh"));

        let event = ServerEvent::decode(&events.recv().await.unwrap()).unwrap();
        assert_eq!(event.path, "/new.txt");
    }

    #[tokio::test]
    async fn test_no_broadcast_for_rejected_batch() {
        let volume = ephemeral_volume().await;
        let (_, mut events) = volume.subscribe().await;

        volume
            .patch(request(vec![FilePatch::Text {
                path: "/x".into(),
                timestamp: 1,
                operations: vec![],
            }]))
            .await
            .unwrap();

        // Commit something afterwards; the first event must be for it.
        let committed = volume
            .patch(request(vec![FilePatch::Set {
                path: "/y".into(),
                content: Some("z".into()),
            }]))
            .await
            .unwrap();

        let event = ServerEvent::decode(&events.recv().await.unwrap()).unwrap();
        assert_eq!(event.path, "/y");
        assert_eq!(event.timestamp, committed.timestamp);
    }

    #[tokio::test]
    async fn test_message_id_echoed_on_events() {
        let volume = ephemeral_volume().await;
        let (_, mut events) = volume.subscribe().await;

        volume
            .patch(VolumePatchRequest {
                message_id: Some("req-9".into()),
                patches: vec![FilePatch::Set {
                    path: "/tracked".into(),
                    content: Some("v".into()),
                }],
            })
            .await
            .unwrap();

        let event = ServerEvent::decode(&events.recv().await.unwrap()).unwrap();
        assert_eq!(event.message_id.as_deref(), Some("req-9"));
    }

    #[tokio::test]
    async fn test_stats_track_outcomes() {
        let volume = ephemeral_volume().await;
        volume
            .patch(request(vec![FilePatch::Set {
                path: "/a".into(),
                content: Some("1".into()),
            }]))
            .await
            .unwrap();
        volume
            .patch(request(vec![FilePatch::Text {
                path: "/a".into(),
                timestamp: 1,
                operations: vec![],
            }]))
            .await
            .unwrap();

        let stats = volume.stats().await.unwrap();
        assert_eq!(stats.patch_batches, 2);
        assert_eq!(stats.patches_accepted, 1);
        assert_eq!(stats.patches_rejected, 1);
    }

    #[test]
    fn test_ephemeral_prefix() {
        assert!(is_ephemeral("ephemeral:scratch"));
        assert!(!is_ephemeral("site"));
    }
}
