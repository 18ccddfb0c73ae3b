//! JSON wire types at the volume boundary.
//!
//! Requests:
//! - PATCH — [`VolumePatchRequest`] → [`VolumePatchResponse`]
//! - LIST  — prefix + [`ContentSelector`] → [`VolumeListResponse`]
//! - PUT   — path → [`PutEntry`] map
//!
//! Subscribers receive [`ServerEvent`]s, JSON-serialised, one per committed
//! file in broadcast order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::patch::{FilePatch, FilePatchResult};

/// A batch of file patches applied as one transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumePatchRequest {
    /// Client correlation id echoed on every broadcast event.
    #[serde(rename = "messageId", skip_serializing_if = "Option::is_none", default)]
    pub message_id: Option<String>,
    pub patches: Vec<FilePatch>,
}

/// PATCH response: the new logical version plus one result per input patch,
/// in input order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumePatchResponse {
    pub timestamp: u64,
    pub results: Vec<FilePatchResult>,
}

impl VolumePatchResponse {
    /// True when every patch in the batch was committed.
    pub fn all_accepted(&self) -> bool {
        self.results.iter().all(|r| r.accepted)
    }
}

/// Which listed files carry their content in a LIST response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentSelector {
    /// `content=true` — every file.
    All,
    /// `content=false` or absent — none.
    None,
    /// Any other value — only files whose path starts with it.
    Prefix(String),
}

impl ContentSelector {
    /// Parse the query-string form.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("true") => ContentSelector::All,
            Some("false") | None => ContentSelector::None,
            Some(prefix) => ContentSelector::Prefix(prefix.to_string()),
        }
    }

    /// Should `path`'s content be included?
    pub fn includes(&self, path: &str) -> bool {
        match self {
            ContentSelector::All => true,
            ContentSelector::None => false,
            ContentSelector::Prefix(prefix) => path.starts_with(prefix.as_str()),
        }
    }
}

/// One file entry in a LIST response; `content` is null when not selected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub content: Option<String>,
}

/// LIST response: a snapshot of the namespace under the requested prefix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeListResponse {
    pub timestamp: u64,
    #[serde(rename = "volumeId")]
    pub volume_id: String,
    pub fs: BTreeMap<String, FileEntry>,
}

/// One entry of a PUT bulk-replace body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutEntry {
    pub content: String,
}

/// Change notification fanned out to subscribers after a commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerEvent {
    #[serde(rename = "messageId", skip_serializing_if = "Option::is_none", default)]
    pub message_id: Option<String>,
    pub path: String,
    pub timestamp: u64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub deleted: Option<bool>,
}

impl ServerEvent {
    /// Event for a written file.
    pub fn written(message_id: Option<String>, path: impl Into<String>, timestamp: u64) -> Self {
        Self {
            message_id,
            path: path.into(),
            timestamp,
            deleted: None,
        }
    }

    /// Event for a deleted file.
    pub fn deleted(message_id: Option<String>, path: impl Into<String>, timestamp: u64) -> Self {
        Self {
            message_id,
            path: path.into(),
            timestamp,
            deleted: Some(true),
        }
    }

    /// Serialise for the wire.
    pub fn encode(&self) -> String {
        // ServerEvent has no map keys that can fail to serialise.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Parse from the wire.
    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}
