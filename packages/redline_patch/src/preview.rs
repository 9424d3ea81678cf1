//! Inline preview layout for draft patches.
//!
//! Each draft is anchored to a byte range of a base text: `replace` and
//! `delete` by locating `old_text`, `insert` at the end of `start_line`. The
//! current text is the primary base. A draft whose target no longer exists
//! there falls back to the original text. Each base gets its own ordered run
//! of unchanged / removed / added spans whose unchanged and removed parts
//! cover that base exactly once. Drafts that anchor in neither text, or that
//! overlap an earlier draft, are listed separately.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::patch::{Patch, PatchKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PreviewSpan {
    Unchanged { text: String },
    Removed { patch_id: String, text: String },
    Added { patch_id: String, text: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolutionIssue {
    /// The patch's target is in neither the current nor the original text.
    Unanchored,
    /// The target overlaps an earlier anchored patch on the same base.
    Overlapping { with: String },
}

/// A draft that needs manual resolution instead of an inline preview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnresolvedPatch {
    pub patch_id: String,
    pub issue: ResolutionIssue,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preview {
    /// Layout over the current text.
    pub spans: Vec<PreviewSpan>,
    /// Layout over the original text for drafts that only anchor there.
    /// Empty when every anchored draft anchors in the current text.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub original_spans: Vec<PreviewSpan>,
    pub needs_resolution: Vec<UnresolvedPatch>,
}

impl Preview {
    /// The current text the main layout was built from.
    pub fn base_text(&self) -> String {
        covered_text(&self.spans)
    }

    /// The original text covered by `original_spans` (empty if unused).
    pub fn original_base_text(&self) -> String {
        covered_text(&self.original_spans)
    }
}

/// Unchanged and removed spans concatenated.
fn covered_text(spans: &[PreviewSpan]) -> String {
    spans
        .iter()
        .filter_map(|span| match span {
            PreviewSpan::Unchanged { text } | PreviewSpan::Removed { text, .. } => {
                Some(text.as_str())
            }
            PreviewSpan::Added { .. } => None,
        })
        .collect()
}

/// Byte range `patch` targets in `text`, or `None` if it cannot be found.
///
/// When `old_text` occurs more than once, the occurrence starting closest to
/// `start_line` wins.
pub fn locate(text: &str, patch: &Patch) -> Option<Range<usize>> {
    let line_starts = build_line_starts(text);
    match patch.kind {
        PatchKind::Insert => {
            let end = line_end(text, &line_starts, patch.start_line)?;
            Some(end..end)
        }
        PatchKind::Replace | PatchKind::Delete => {
            if patch.old_text.is_empty() {
                return None;
            }
            text.match_indices(patch.old_text.as_str())
                .map(|(offset, _)| offset)
                .min_by_key(|offset| {
                    let line = line_starts.partition_point(|start| start <= offset);
                    line.abs_diff(patch.start_line)
                })
                .map(|offset| offset..offset + patch.old_text.len())
        }
    }
}

/// Lay out `patches` over `current`, anchoring drafts that are missing
/// from it against `original` instead.
pub fn build_preview(current: &str, original: &str, patches: &[Patch]) -> Preview {
    let mut needs_resolution = Vec::new();
    let mut in_current = Vec::new();
    let mut in_original = Vec::new();

    for patch in patches {
        if let Some(range) = locate(current, patch) {
            in_current.push((range, patch));
        } else if let Some(range) = locate(original, patch) {
            in_original.push((range, patch));
        } else {
            needs_resolution.push(UnresolvedPatch {
                patch_id: patch.id.clone(),
                issue: ResolutionIssue::Unanchored,
            });
        }
    }

    let spans = layout(current, in_current, &mut needs_resolution);
    let original_spans = if in_original.is_empty() {
        Vec::new()
    } else {
        layout(original, in_original, &mut needs_resolution)
    };

    Preview {
        spans,
        original_spans,
        needs_resolution,
    }
}

/// Ordered spans covering `base` once. Overlapping drafts are moved to
/// `needs_resolution`.
fn layout(
    base: &str,
    mut anchored: Vec<(Range<usize>, &Patch)>,
    needs_resolution: &mut Vec<UnresolvedPatch>,
) -> Vec<PreviewSpan> {
    anchored.sort_by_key(|(range, _)| (range.start, range.end));

    let mut spans = Vec::new();
    let mut cursor = 0;
    let mut last_id: Option<&str> = None;

    for (range, patch) in anchored {
        if range.start < cursor {
            needs_resolution.push(UnresolvedPatch {
                patch_id: patch.id.clone(),
                issue: ResolutionIssue::Overlapping {
                    with: last_id.unwrap_or_default().to_string(),
                },
            });
            continue;
        }
        if range.start > cursor {
            spans.push(PreviewSpan::Unchanged {
                text: base[cursor..range.start].to_string(),
            });
        }
        if !range.is_empty() {
            spans.push(PreviewSpan::Removed {
                patch_id: patch.id.clone(),
                text: base[range.clone()].to_string(),
            });
        }
        let added = match patch.kind {
            PatchKind::Insert => Some(format!("\n{}", patch.new_text.as_deref().unwrap_or(""))),
            PatchKind::Replace => patch.new_text.clone().filter(|text| !text.is_empty()),
            PatchKind::Delete => None,
        };
        if let Some(text) = added {
            spans.push(PreviewSpan::Added {
                patch_id: patch.id.clone(),
                text,
            });
        }
        cursor = range.end;
        last_id = Some(patch.id.as_str());
    }

    if cursor < base.len() {
        spans.push(PreviewSpan::Unchanged {
            text: base[cursor..].to_string(),
        });
    }
    spans
}

/// Byte offsets of each line start in `text`.
fn build_line_starts(text: &str) -> Vec<usize> {
    let mut starts = vec![0usize];
    for (i, b) in text.bytes().enumerate() {
        if b == b'\n' {
            starts.push(i + 1);
        }
    }
    starts
}

/// Byte offset just past the content of 1-based `line` (before its newline).
fn line_end(text: &str, line_starts: &[usize], line: usize) -> Option<usize> {
    if line == 0 || line > line_starts.len() {
        return None;
    }
    Some(match line_starts.get(line) {
        Some(next_start) => next_start - 1,
        None => text.len(),
    })
}
