use proptest::prelude::*;

use redline_patch::merge::merge_draft_patches;
use redline_patch::patch::{Patch, PatchError, PatchKind, apply_patch, replay};
use redline_patch::preview::build_preview;

fn arb_line() -> impl Strategy<Value = String> {
    "[a-z ]{0,8}"
}

fn arb_lines() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(arb_line(), 1..12)
}

/// Simple line-vector model of what a patch should do.
#[derive(Debug, Clone)]
enum Edit {
    Replace {
        start: usize,
        len: usize,
        new: Vec<String>,
    },
    Insert {
        after: usize,
        new: Vec<String>,
    },
    Delete {
        start: usize,
        len: usize,
    },
}

fn arb_edit() -> impl Strategy<Value = Edit> {
    prop_oneof![
        (any::<usize>(), 1usize..4, prop::collection::vec(arb_line(), 1..4))
            .prop_map(|(start, len, new)| Edit::Replace { start, len, new }),
        (any::<usize>(), prop::collection::vec(arb_line(), 1..4))
            .prop_map(|(after, new)| Edit::Insert { after, new }),
        (any::<usize>(), 1usize..3).prop_map(|(start, len)| Edit::Delete { start, len }),
    ]
}

/// Turn an abstract edit into a concrete, in-range patch against `lines`,
/// applying it to the model as a side effect.
fn realize(edit: &Edit, lines: &mut Vec<String>, id: usize) -> Patch {
    let count = lines.len();
    let id = format!("p{id}");
    match edit {
        Edit::Replace { start, len, new } => {
            let start = start % count;
            let end = (start + len).min(count) - 1;
            let old = lines[start..=end].join("\n");
            lines.splice(start..=end, new.iter().cloned());
            Patch {
                id,
                kind: PatchKind::Replace,
                start_line: start + 1,
                end_line: end + 1,
                old_text: old,
                new_text: Some(new.join("\n")),
                reason: String::new(),
            }
        }
        Edit::Insert { after, new } => {
            let after = after % count;
            lines.splice(after + 1..after + 1, new.iter().cloned());
            Patch {
                id,
                kind: PatchKind::Insert,
                start_line: after + 1,
                end_line: after + 1,
                old_text: String::new(),
                new_text: Some(new.join("\n")),
                reason: String::new(),
            }
        }
        Edit::Delete { start, len } => {
            let start = start % count;
            let end = (start + len).min(count) - 1;
            let old = lines[start..=end].join("\n");
            lines.drain(start..=end);
            if lines.is_empty() {
                lines.push(String::new());
            }
            Patch {
                id,
                kind: PatchKind::Delete,
                start_line: start + 1,
                end_line: end + 1,
                old_text: old,
                new_text: None,
                reason: String::new(),
            }
        }
    }
}

proptest! {
    #[test]
    fn replay_matches_line_model(
        lines in arb_lines(),
        edits in prop::collection::vec(arb_edit(), 0..8),
    ) {
        let original = lines.join("\n");
        let mut model = lines.clone();
        let mut patches = Vec::new();
        for (i, edit) in edits.iter().enumerate() {
            patches.push(realize(edit, &mut model, i));
        }

        let mut current = original.clone();
        for patch in &patches {
            current = apply_patch(&current, patch).expect("realized patch must apply");
        }

        prop_assert_eq!(&current, &model.join("\n"));
        prop_assert_eq!(replay(&original, &patches).unwrap(), current);
    }

    #[test]
    fn merging_the_same_batch_twice_is_a_no_op(
        lines in arb_lines(),
        edits in prop::collection::vec(arb_edit(), 0..6),
    ) {
        let mut model = lines;
        let batch: Vec<Patch> = edits
            .iter()
            .enumerate()
            .map(|(i, edit)| realize(edit, &mut model, i))
            .collect();

        let first = merge_draft_patches(&[], batch.clone());
        let second = merge_draft_patches(&first.patches, batch);
        prop_assert_eq!(second.added, 0);
        prop_assert_eq!(second.updated, 0);
        prop_assert_eq!(second.patches, first.patches);
    }

    #[test]
    fn mismatched_old_text_never_applies(
        lines in arb_lines(),
        start in any::<usize>(),
        bogus in "[A-Z]{1,6}",
    ) {
        let text = lines.join("\n");
        let start = start % lines.len();
        let patch = Patch {
            id: "p".to_string(),
            kind: PatchKind::Replace,
            start_line: start + 1,
            end_line: start + 1,
            // Generated lines are lowercase, so this can never match.
            old_text: bogus,
            new_text: Some("x".to_string()),
            reason: String::new(),
        };
        let is_mismatch = matches!(
            apply_patch(&text, &patch),
            Err(PatchError::TextMismatch { .. })
        );
        prop_assert!(is_mismatch);
    }

    #[test]
    fn out_of_range_is_an_error_not_a_panic(
        lines in arb_lines(),
        start in 0usize..40,
        len in 0usize..40,
        kind in prop_oneof![
            Just(PatchKind::Replace),
            Just(PatchKind::Insert),
            Just(PatchKind::Delete),
        ],
    ) {
        let text = lines.join("\n");
        let patch = Patch {
            id: "p".to_string(),
            kind,
            start_line: start,
            end_line: start + len,
            old_text: String::new(),
            new_text: None,
            reason: String::new(),
        };
        let _ = apply_patch(&text, &patch);
    }

    #[test]
    fn preview_covers_current_text_once(
        lines in arb_lines(),
        edits in prop::collection::vec(arb_edit(), 0..6),
    ) {
        let text = lines.join("\n");
        let mut model = lines;
        let drafts: Vec<Patch> = edits
            .iter()
            .enumerate()
            .map(|(i, edit)| realize(edit, &mut model, i))
            .collect();

        let preview = build_preview(&text, &text, &drafts);
        prop_assert_eq!(preview.base_text(), text);
    }
}
