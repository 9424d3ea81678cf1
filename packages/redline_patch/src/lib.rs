//! Line-anchored edit proposals for AI-assisted document editing.
//!
//! Everything in this crate is a pure function over text and patch
//! descriptors: verification and application of a single patch, merging of
//! incoming patch batches, narration of plan progress, and the inline preview
//! layout used to render proposed edits.

pub mod merge;
pub mod patch;
pub mod plan;
pub mod preview;

pub use merge::{MergeOutcome, merge_draft_patches};
pub use patch::{Patch, PatchError, PatchKind, apply_patch, replay};
pub use plan::{PlanTask, TaskStatus, narrate, regressed_tasks};
pub use preview::{Preview, PreviewSpan, ResolutionIssue, UnresolvedPatch, build_preview};
