//! Merging of incoming patch batches into the draft list.

use crate::patch::Patch;

/// Result of folding a batch into the existing drafts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub patches: Vec<Patch>,
    pub added: usize,
    pub updated: usize,
}

impl MergeOutcome {
    pub fn changed(&self) -> bool {
        self.added > 0 || self.updated > 0
    }
}

/// Merge `incoming` into `existing`, keyed by patch id.
///
/// New ids are appended in arrival order. Known ids with different content
/// are replaced in place. Drafts missing from the batch are kept.
pub fn merge_draft_patches(existing: &[Patch], incoming: Vec<Patch>) -> MergeOutcome {
    let mut patches = existing.to_vec();
    let mut added = 0;
    let mut updated = 0;

    for patch in incoming {
        match patches.iter_mut().find(|p| p.id == patch.id) {
            Some(slot) if *slot != patch => {
                *slot = patch;
                updated += 1;
            }
            Some(_) => {}
            None => {
                patches.push(patch);
                added += 1;
            }
        }
    }

    MergeOutcome {
        patches,
        added,
        updated,
    }
}
