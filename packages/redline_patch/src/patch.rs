//! Patch descriptors and the verifier that folds them into document text.
//!
//! Line numbers are 1-based and inclusive. A `replace` or `delete` only takes
//! effect when the text currently at its line range matches `old_text` after
//! trailing whitespace is trimmed from every line on both sides.

use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchKind {
    Replace,
    Insert,
    Delete,
}

impl fmt::Display for PatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::Replace => "replace",
            Self::Insert => "insert",
            Self::Delete => "delete",
        })
    }
}

/// A server-proposed edit against the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patch {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: PatchKind,
    pub start_line: usize,
    pub end_line: usize,
    #[serde(default)]
    pub old_text: String,
    #[serde(default)]
    pub new_text: Option<String>,
    #[serde(default)]
    pub reason: String,
}

impl Patch {
    /// Human-readable line span, e.g. `3` or `3-5`.
    pub fn line_label(&self) -> String {
        if self.start_line == self.end_line {
            self.start_line.to_string()
        } else {
            format!("{}-{}", self.start_line, self.end_line)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatchError {
    #[error("lines {start_line}-{end_line} are outside the document ({line_count} lines)")]
    OutOfRange {
        start_line: usize,
        end_line: usize,
        line_count: usize,
    },

    #[error("text at lines {start_line}-{end_line} no longer matches the proposed edit")]
    TextMismatch {
        start_line: usize,
        end_line: usize,
        expected: String,
        found: String,
    },
}

/// Apply one patch to `text`, returning the new text.
///
/// Verification failures never mutate anything; the caller keeps its text.
pub fn apply_patch(text: &str, patch: &Patch) -> Result<String, PatchError> {
    let mut lines: Vec<&str> = text.split('\n').collect();
    let line_count = lines.len();

    match patch.kind {
        PatchKind::Insert => {
            let index = patch
                .start_line
                .checked_sub(1)
                .filter(|index| *index < line_count)
                .ok_or_else(|| out_of_range(patch, line_count))?;
            let inserted = replacement_lines(patch.new_text.as_deref());
            lines.splice(index + 1..index + 1, inserted);
        }
        PatchKind::Replace | PatchKind::Delete => {
            let range = line_range(patch, line_count)?;
            let found = lines[range.clone()].join("\n");
            if normalize(&found) != normalize(&patch.old_text) {
                return Err(PatchError::TextMismatch {
                    start_line: patch.start_line,
                    end_line: patch.end_line,
                    expected: patch.old_text.clone(),
                    found,
                });
            }
            if patch.kind == PatchKind::Replace {
                let replacement = replacement_lines(patch.new_text.as_deref());
                lines.splice(range, replacement);
            } else {
                lines.drain(range);
            }
        }
    }

    Ok(lines.join("\n"))
}

/// Fold `patches` onto `original` in order.
pub fn replay<'a, I>(original: &str, patches: I) -> Result<String, PatchError>
where
    I: IntoIterator<Item = &'a Patch>,
{
    patches
        .into_iter()
        .try_fold(original.to_string(), |text, patch| apply_patch(&text, patch))
}

/// 0-based index range for a replace/delete, checked against the line count.
fn line_range(patch: &Patch, line_count: usize) -> Result<Range<usize>, PatchError> {
    let start = patch.start_line.checked_sub(1);
    let end = patch.end_line.checked_sub(1);
    match (start, end) {
        (Some(start), Some(end)) if start <= end && end < line_count => Ok(start..end + 1),
        _ => Err(out_of_range(patch, line_count)),
    }
}

fn out_of_range(patch: &Patch, line_count: usize) -> PatchError {
    PatchError::OutOfRange {
        start_line: patch.start_line,
        end_line: patch.end_line,
        line_count,
    }
}

fn replacement_lines(new_text: Option<&str>) -> Vec<&str> {
    match new_text {
        Some(text) => text.split('\n').collect(),
        None => vec![""],
    }
}

fn normalize(text: &str) -> String {
    text.split('\n')
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}
