//! File patch variants and their classification.
//!
//! A patch arrives as unstructured JSON and is classified by shape, in
//! this order:
//!
//! 1. `patches` present            → JSON patch
//! 2. `content` present (or null)  → whole-file set
//! 3. `timestamp` + `operations`   → positional text patch
//!
//! The predicates run in a hand-written `Deserialize` impl so the
//! discriminator is explicit rather than left to untagged trial-and-error
//! (a text patch body would otherwise satisfy the set shape too, since a
//! missing `content` reads as null).

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::jsonpatch::JsonPatchOp;
use crate::text::TextOp;

/// One mutation against a single file, classified by shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FilePatch {
    /// RFC 6902 sequence against the parsed JSON content of `path`.
    Json {
        path: String,
        patches: Vec<JsonPatchOp>,
    },
    /// Positional text ops against the session baseline `timestamp`.
    Text {
        path: String,
        timestamp: u64,
        operations: Vec<TextOp>,
    },
    /// Whole-file replace; `None` creates the file empty.
    Set {
        path: String,
        content: Option<String>,
    },
}

impl FilePatch {
    /// The file this patch addresses.
    pub fn path(&self) -> &str {
        match self {
            FilePatch::Json { path, .. }
            | FilePatch::Text { path, .. }
            | FilePatch::Set { path, .. } => path,
        }
    }
}

impl<'de> Deserialize<'de> for FilePatch {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        let obj = value
            .as_object()
            .ok_or_else(|| D::Error::custom("file patch must be a JSON object"))?;

        let path = obj
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| D::Error::custom("file patch requires a string `path`"))?
            .to_string();

        if let Some(patches) = obj.get("patches") {
            let patches = serde_json::from_value(patches.clone()).map_err(D::Error::custom)?;
            return Ok(FilePatch::Json { path, patches });
        }

        if let Some(content) = obj.get("content") {
            let content = match content {
                Value::Null => None,
                Value::String(s) => Some(s.clone()),
                _ => return Err(D::Error::custom("`content` must be a string or null")),
            };
            return Ok(FilePatch::Set { path, content });
        }

        match (obj.get("timestamp"), obj.get("operations")) {
            (Some(ts), Some(ops)) if ops.is_array() => {
                let timestamp = ts
                    .as_u64()
                    .ok_or_else(|| D::Error::custom("`timestamp` must be an integer"))?;
                let operations =
                    serde_json::from_value(ops.clone()).map_err(D::Error::custom)?;
                Ok(FilePatch::Text {
                    path,
                    timestamp,
                    operations,
                })
            }
            _ => Err(D::Error::custom(
                "unclassifiable file patch: expected `patches`, `content`, \
                 or `timestamp` + `operations`",
            )),
        }
    }
}

/// Outcome of one patch, in input order.
///
/// A rejected patch carries the pre-patch content so the client can rebase;
/// an accepted one carries the content that was (or would be) committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilePatchResult {
    pub path: String,
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted: Option<bool>,
}

impl FilePatchResult {
    /// An accepted result staging `content`.
    pub fn accepted(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            accepted: true,
            content: Some(content.into()),
            deleted: None,
        }
    }

    /// A rejected result echoing the pre-patch content.
    pub fn rejected(path: impl Into<String>, content: Option<String>) -> Self {
        Self {
            path: path.into(),
            accepted: false,
            content,
            deleted: None,
        }
    }

    /// True when a successful commit removes the file.
    pub fn is_deleted(&self) -> bool {
        self.deleted.unwrap_or(false)
    }
}
