//! Positional text operations and the session-rebase merge.
//!
//! A client edits against the document it saw at some session timestamp.
//! By the time the edit arrives, other accepted edits against the same
//! baseline may have shifted every position. The session's [`Bit`] records
//! that drift per client-side index, so each incoming position is rebased
//! with one prefix sum:
//!
//! ```text
//! physical = bit.range_query(0, at) + at
//! ```
//!
//! Positions count Unicode scalar values; splices operate on a char view so
//! multi-byte content can never be torn.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bit::Bit;

/// A single positional edit, in the coordinates of the client's baseline.
///
/// Wire shape discriminates on the second field: `{at, text}` inserts,
/// `{at, length}` deletes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TextOp {
    /// Insert `text` at client position `at`.
    Insert { at: usize, text: String },
    /// Delete `length` scalar values starting at client position `at`.
    Delete { at: usize, length: usize },
}

impl TextOp {
    /// Insert constructor.
    pub fn insert(at: usize, text: impl Into<String>) -> Self {
        TextOp::Insert { at, text: text.into() }
    }

    /// Delete constructor.
    pub fn delete(at: usize, length: usize) -> Self {
        TextOp::Delete { at, length }
    }
}

/// Failure applying a text op sequence.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TextError {
    /// Rebasing produced a physical offset before the start of the file.
    #[error("operation {index} rebases to negative offset {offset}")]
    NegativeOffset { index: usize, offset: i64 },
}

/// Apply `ops` to `content`, rebasing positions through `bit`.
///
/// On success the drift from these ops is retained in `bit`, so later
/// patches against the same session see it. On failure every BIT mutation
/// made here is rolled back in reverse and the error is returned; the
/// caller keeps the original content.
pub fn apply_ops(content: &str, ops: &[TextOp], bit: &mut Bit) -> Result<String, TextError> {
    let mut chars: Vec<char> = content.chars().collect();
    // (index, delta) pairs to undo if a later op fails.
    let mut applied: Vec<(usize, i64)> = Vec::with_capacity(ops.len());

    for (index, op) in ops.iter().enumerate() {
        let at = match op {
            TextOp::Insert { at, .. } | TextOp::Delete { at, .. } => *at,
        };
        let offset = bit.range_query(0, at) + at as i64;
        if offset < 0 {
            for &(idx, delta) in applied.iter().rev() {
                bit.update(idx, -delta);
            }
            return Err(TextError::NegativeOffset { index, offset });
        }
        let offset = (offset as usize).min(chars.len());

        match op {
            TextOp::Insert { at, text } => {
                let inserted: Vec<char> = text.chars().collect();
                let delta = inserted.len() as i64;
                chars.splice(offset..offset, inserted);
                bit.update(*at, delta);
                applied.push((*at, delta));
            }
            TextOp::Delete { at, length } => {
                let end = (offset + length).min(chars.len());
                let removed = (end - offset) as i64;
                chars.drain(offset..end);
                bit.update(*at, -removed);
                applied.push((*at, -removed));
            }
        }
    }

    Ok(chars.into_iter().collect())
}

/// Compute a minimal edit script turning `old` into `new`.
///
/// Classic LCS dynamic program over scalar values with a trace-back that
/// emits per-character ops, followed by a coalescing pass merging adjacent
/// runs of the same kind. Positions are `old`-side coordinates, so the
/// script replays through [`apply_ops`] with a fresh session BIT.
pub fn diff(old: &str, new: &str) -> Vec<TextOp> {
    let a: Vec<char> = old.chars().collect();
    let b: Vec<char> = new.chars().collect();
    let (m, n) = (a.len(), b.len());

    // lcs[i][j] = LCS length of a[i..] and b[j..].
    let mut lcs = vec![vec![0usize; n + 1]; m + 1];
    for i in (0..m).rev() {
        for j in (0..n).rev() {
            lcs[i][j] = if a[i] == b[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut ops = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < m || j < n {
        if i < m && j < n && a[i] == b[j] {
            i += 1;
            j += 1;
        } else if j < n && (i == m || lcs[i][j + 1] >= lcs[i + 1][j]) {
            push_insert(&mut ops, i, b[j]);
            j += 1;
        } else {
            push_delete(&mut ops, i);
            i += 1;
        }
    }
    ops
}

/// Append an inserted char, extending the previous insert run when it is
/// anchored at the same old-side index.
fn push_insert(ops: &mut Vec<TextOp>, at: usize, c: char) {
    if let Some(TextOp::Insert { at: prev, text }) = ops.last_mut() {
        if *prev == at {
            text.push(c);
            return;
        }
    }
    ops.push(TextOp::Insert { at, text: c.to_string() });
}

/// Append a deleted char, extending the previous delete run when the runs
/// are adjacent in old-side coordinates.
fn push_delete(ops: &mut Vec<TextOp>, at: usize) {
    if let Some(TextOp::Delete { at: prev, length }) = ops.last_mut() {
        if *prev + *length == at {
            *length += 1;
            return;
        }
    }
    ops.push(TextOp::Delete { at, length: 1 });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply_fresh(content: &str, ops: &[TextOp]) -> String {
        let mut bit = Bit::new();
        apply_ops(content, ops, &mut bit).unwrap()
    }

    #[test]
    fn test_insert_at_start() {
        let out = apply_fresh("BC", &[TextOp::insert(0, "A")]);
        assert_eq!(out, "ABC");
    }

    #[test]
    fn test_two_inserts_same_position_stack() {
        // Second insert at 0 lands after the first: drift pushes it right.
        let out = apply_fresh("ABC", &[TextOp::insert(0, "!"), TextOp::insert(0, "Z")]);
        assert_eq!(out, "!ZABC");
    }

    #[test]
    fn test_delete_range() {
        let out = apply_fresh("ABCDE", &[TextOp::delete(1, 3)]);
        assert_eq!(out, "AE");
    }

    #[test]
    fn test_session_drift_across_batches() {
        // Mirrors two edits submitted against the same baseline in turn.
        let mut bit = Bit::new();
        let v1 = apply_ops("ABC", &[TextOp::insert(0, "!"), TextOp::insert(0, "Z")], &mut bit)
            .unwrap();
        assert_eq!(v1, "!ZABC");

        let v2 = apply_ops(&v1, &[TextOp::insert(3, "!"), TextOp::delete(2, 1)], &mut bit)
            .unwrap();
        assert_eq!(v2, "!ZAB!");
    }

    #[test]
    fn test_negative_offset_fails_and_rolls_back() {
        let mut bit = Bit::new();
        // Simulate prior committed deletes dragging position 1 below zero.
        bit.update(1, -5);

        let before: Vec<i64> = (0..8).map(|r| bit.query(r)).collect();
        let err = apply_ops("hello", &[TextOp::insert(0, "x"), TextOp::insert(1, "y")], &mut bit);
        assert!(matches!(err, Err(TextError::NegativeOffset { index: 1, .. })));

        // The first op's BIT update was rolled back.
        let after: Vec<i64> = (0..8).map(|r| bit.query(r)).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_offsets_clamp_to_document_end() {
        let out = apply_fresh("ab", &[TextOp::insert(10, "c"), TextOp::delete(0, 99)]);
        assert_eq!(out, "");
    }

    #[test]
    fn test_multibyte_positions() {
        let out = apply_fresh("héllo", &[TextOp::insert(1, "ø"), TextOp::delete(4, 1)]);
        assert_eq!(out, "høéll");
    }

    #[test]
    fn test_diff_pure_insert() {
        let ops = diff("AC", "ABC");
        assert_eq!(ops, vec![TextOp::insert(1, "B")]);
    }

    #[test]
    fn test_diff_pure_delete() {
        let ops = diff("ABCD", "AD");
        assert_eq!(ops, vec![TextOp::delete(1, 2)]);
    }

    #[test]
    fn test_diff_coalesces_runs() {
        let ops = diff("A", "AXYZ");
        assert_eq!(ops, vec![TextOp::insert(1, "XYZ")]);
    }

    #[test]
    fn test_diff_apply_round_trip() {
        let cases = [
            ("", ""),
            ("", "hello"),
            ("hello", ""),
            ("hello", "hello"),
            ("ABC", "BD"),
            ("kitten", "sitting"),
            ("the quick brown fox", "the slow brown ox"),
            ("héllo wörld", "hello world"),
            ("aaaa", "aabaa"),
        ];
        for (old, new) in cases {
            let ops = diff(old, new);
            assert_eq!(apply_fresh(old, &ops), new, "diff failed for {old:?} -> {new:?}");
        }
    }

    #[test]
    fn test_text_op_wire_shape() {
        let insert: TextOp = serde_json::from_str(r#"{"at":3,"text":"hi"}"#).unwrap();
        assert_eq!(insert, TextOp::insert(3, "hi"));

        let delete: TextOp = serde_json::from_str(r#"{"at":2,"length":1}"#).unwrap();
        assert_eq!(delete, TextOp::delete(2, 1));

        let json = serde_json::to_string(&TextOp::insert(0, "A")).unwrap();
        assert_eq!(json, r#"{"at":0,"text":"A"}"#);
    }
}
