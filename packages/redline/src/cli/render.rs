//! Plain-text rendering of session state for the terminal.

use redline_patch::{PlanTask, Preview, PreviewSpan, ResolutionIssue, TaskStatus};

use crate::connection::ConnectionState;
use crate::session::{ChatEntry, ChatKind, SessionState};

pub fn entry(entry: &ChatEntry) -> String {
    let label = match entry.kind {
        ChatKind::User => "you",
        ChatKind::Assistant => "assistant",
        ChatKind::Question => "question",
        ChatKind::System => "system",
        ChatKind::Checkpoint => "*",
    };
    match &entry.question_id {
        Some(id) => format!("[{label} {id}] {}", entry.content),
        None => format!("[{label}] {}", entry.content),
    }
}

pub fn connection(state: ConnectionState) -> String {
    match state {
        ConnectionState::Disconnected => "disconnected".to_string(),
        ConnectionState::Connecting => "connecting".to_string(),
        ConnectionState::Connected => "connected".to_string(),
        ConnectionState::Abandoned { attempts } => {
            format!("connection lost after {attempts} reconnect attempts; use /reconnect")
        }
    }
}

pub fn patches(state: &SessionState) -> String {
    if state.draft_patches.is_empty() {
        return format!("No draft patches ({} applied).", state.applied_patches.len());
    }
    let mut out = format!(
        "{} draft, {} applied:",
        state.draft_patches.len(),
        state.applied_patches.len()
    );
    for patch in &state.draft_patches {
        out.push_str(&format!(
            "\n  {:<12} {:<8} lines {:<8} {}",
            patch.id,
            patch.kind,
            patch.line_label(),
            patch.reason
        ));
    }
    out
}

pub fn plan(tasks: &[PlanTask]) -> String {
    if tasks.is_empty() {
        return "No plan yet.".to_string();
    }
    tasks
        .iter()
        .map(|task| {
            let mark = match task.status {
                TaskStatus::Completed => "[x]",
                TaskStatus::InProgress => "[>]",
                TaskStatus::Pending => "[ ]",
            };
            format!("{mark} {}", task.title)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn questions(state: &SessionState) -> String {
    if state.pending_questions.is_empty() {
        return "No pending questions.".to_string();
    }
    let mut lines = Vec::new();
    for question in &state.pending_questions {
        let required = if question.required { " (required)" } else { "" };
        lines.push(format!("{}{}: {}", question.id, required, question.text));
        if !question.suggested_answers.is_empty() {
            lines.push(format!("    suggestions: {}", question.suggested_answers.join(" / ")));
        }
    }
    lines.join("\n")
}

/// Removed text is shown as `[-...-]`, added text as `{+...+}`.
pub fn preview(preview: &Preview) -> String {
    let mut out = markup(&preview.spans);
    if !preview.original_spans.is_empty() {
        out.push_str("\n--- against the original text ---\n");
        out.push_str(&markup(&preview.original_spans));
    }
    for unresolved in &preview.needs_resolution {
        let why = match &unresolved.issue {
            ResolutionIssue::Unanchored => "target text not found".to_string(),
            ResolutionIssue::Overlapping { with } => format!("overlaps patch {with}"),
        };
        out.push_str(&format!(
            "\n! {} needs manual resolution: {why}",
            unresolved.patch_id
        ));
    }
    out
}

fn markup(spans: &[PreviewSpan]) -> String {
    let mut out = String::new();
    for span in spans {
        match span {
            PreviewSpan::Unchanged { text } => out.push_str(text),
            PreviewSpan::Removed { text, .. } => {
                out.push_str("[-");
                out.push_str(text);
                out.push_str("-]");
            }
            PreviewSpan::Added { text, .. } => {
                out.push_str("{+");
                out.push_str(text);
                out.push_str("+}");
            }
        }
    }
    out
}
