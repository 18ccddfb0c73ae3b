//! RFC 6902 JSON Patch reducer over `serde_json::Value`.
//!
//! A patch is a sequence of ops folded over the document left to right;
//! the first failing op aborts the fold and the caller keeps the original
//! document. Pointers follow RFC 6901, including the `~0`/`~1` escapes and
//! the `-` append index for arrays.
//!
//! Root-pointer semantics: `add`/`replace` at `""` swap the whole document,
//! `remove` at `""` leaves JSON `null` — the dispatcher treats a document
//! that reduced to `null` as a file deletion.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// One RFC 6902 operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum JsonPatchOp {
    Add { path: String, value: Value },
    Remove { path: String },
    Replace { path: String, value: Value },
    Move { from: String, path: String },
    Copy { from: String, path: String },
    Test { path: String, value: Value },
}

/// Failure applying a JSON patch sequence.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JsonPatchError {
    #[error("invalid pointer: {0}")]
    InvalidPointer(String),

    #[error("path not found: {0}")]
    PathNotFound(String),

    #[error("array index out of bounds in {0}")]
    IndexOutOfBounds(String),

    #[error("test failed at {0}")]
    TestFailed(String),

    #[error("cannot move {from} into its own child {path}")]
    MoveIntoSelf { from: String, path: String },
}

/// Fold `ops` over `doc`, returning the reduced document.
pub fn apply_patch(doc: Value, ops: &[JsonPatchOp]) -> Result<Value, JsonPatchError> {
    let mut doc = doc;
    for op in ops {
        doc = apply_op(doc, op)?;
    }
    Ok(doc)
}

fn apply_op(doc: Value, op: &JsonPatchOp) -> Result<Value, JsonPatchError> {
    match op {
        JsonPatchOp::Add { path, value } => add(doc, path, value.clone()),
        JsonPatchOp::Remove { path } => Ok(remove(doc, path)?.0),
        JsonPatchOp::Replace { path, value } => {
            // Replace requires the target to exist.
            let (doc, _) = remove(doc, path)?;
            add(doc, path, value.clone())
        }
        JsonPatchOp::Move { from, path } => {
            if path != from && path.starts_with(&format!("{from}/")) {
                return Err(JsonPatchError::MoveIntoSelf {
                    from: from.clone(),
                    path: path.clone(),
                });
            }
            let (doc, taken) = remove(doc, from)?;
            add(doc, path, taken)
        }
        JsonPatchOp::Copy { from, path } => {
            let taken = resolve(&doc, from)?.clone();
            add(doc, path, taken)
        }
        JsonPatchOp::Test { path, value } => {
            let found = resolve(&doc, path)?;
            if found == value {
                Ok(doc)
            } else {
                Err(JsonPatchError::TestFailed(path.clone()))
            }
        }
    }
}

/// Split an RFC 6901 pointer into unescaped reference tokens.
fn tokens(pointer: &str) -> Result<Vec<String>, JsonPatchError> {
    if pointer.is_empty() {
        return Ok(Vec::new());
    }
    if !pointer.starts_with('/') {
        return Err(JsonPatchError::InvalidPointer(pointer.to_string()));
    }
    Ok(pointer[1..]
        .split('/')
        .map(|t| t.replace("~1", "/").replace("~0", "~"))
        .collect())
}

/// Resolve a pointer to a reference inside `doc`.
fn resolve<'a>(doc: &'a Value, pointer: &str) -> Result<&'a Value, JsonPatchError> {
    let mut current = doc;
    for token in tokens(pointer)? {
        current = match current {
            Value::Object(map) => map
                .get(&token)
                .ok_or_else(|| JsonPatchError::PathNotFound(pointer.to_string()))?,
            Value::Array(items) => {
                let idx = parse_index(&token, pointer)?;
                items
                    .get(idx)
                    .ok_or_else(|| JsonPatchError::IndexOutOfBounds(pointer.to_string()))?
            }
            _ => return Err(JsonPatchError::PathNotFound(pointer.to_string())),
        };
    }
    Ok(current)
}

/// Resolve a pointer to a mutable reference to the parent container,
/// returning it with the final token.
fn resolve_parent<'a>(
    doc: &'a mut Value,
    pointer: &str,
) -> Result<(&'a mut Value, String), JsonPatchError> {
    let mut toks = tokens(pointer)?;
    let last = toks
        .pop()
        .ok_or_else(|| JsonPatchError::InvalidPointer(pointer.to_string()))?;

    let mut current = doc;
    for token in toks {
        current = match current {
            Value::Object(map) => map
                .get_mut(&token)
                .ok_or_else(|| JsonPatchError::PathNotFound(pointer.to_string()))?,
            Value::Array(items) => {
                let idx = parse_index(&token, pointer)?;
                items
                    .get_mut(idx)
                    .ok_or_else(|| JsonPatchError::IndexOutOfBounds(pointer.to_string()))?
            }
            _ => return Err(JsonPatchError::PathNotFound(pointer.to_string())),
        };
    }
    Ok((current, last))
}

fn parse_index(token: &str, pointer: &str) -> Result<usize, JsonPatchError> {
    // RFC 6901 forbids leading zeros.
    if token != "0" && token.starts_with('0') {
        return Err(JsonPatchError::InvalidPointer(pointer.to_string()));
    }
    token
        .parse()
        .map_err(|_| JsonPatchError::InvalidPointer(pointer.to_string()))
}

/// `add` per RFC 6902: insert into arrays, upsert into objects, replace at
/// the root.
fn add(mut doc: Value, pointer: &str, value: Value) -> Result<Value, JsonPatchError> {
    if pointer.is_empty() {
        return Ok(value);
    }
    let (parent, last) = resolve_parent(&mut doc, pointer)?;
    match parent {
        Value::Object(map) => {
            map.insert(last, value);
        }
        Value::Array(items) => {
            let idx = if last == "-" {
                items.len()
            } else {
                parse_index(&last, pointer)?
            };
            if idx > items.len() {
                return Err(JsonPatchError::IndexOutOfBounds(pointer.to_string()));
            }
            items.insert(idx, value);
        }
        _ => return Err(JsonPatchError::PathNotFound(pointer.to_string())),
    }
    Ok(doc)
}

/// `remove` per RFC 6902, returning the removed value. Removing the root
/// yields `null` as the new document.
fn remove(mut doc: Value, pointer: &str) -> Result<(Value, Value), JsonPatchError> {
    if pointer.is_empty() {
        return Ok((Value::Null, doc));
    }
    let (parent, last) = resolve_parent(&mut doc, pointer)?;
    let taken = match parent {
        Value::Object(map) => map
            .remove(&last)
            .ok_or_else(|| JsonPatchError::PathNotFound(pointer.to_string()))?,
        Value::Array(items) => {
            let idx = parse_index(&last, pointer)?;
            if idx >= items.len() {
                return Err(JsonPatchError::IndexOutOfBounds(pointer.to_string()));
            }
            items.remove(idx)
        }
        _ => return Err(JsonPatchError::PathNotFound(pointer.to_string())),
    };
    Ok((doc, taken))
}
