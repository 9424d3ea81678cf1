//! Session state types.

use chrono::{DateTime, Utc};
use redline_patch::{Patch, PlanTask, Preview, TaskStatus, build_preview};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::protocol::Question;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    User,
    Assistant,
    Question,
    System,
    /// Synthesized narration of a state change.
    Checkpoint,
}

/// One line of the chat log. Never mutated after insertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEntry {
    pub id: Uuid,
    pub kind: ChatKind,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ChatEntry {
    pub fn new(kind: ChatKind, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            content: content.into(),
            question_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn question(question: &Question) -> Self {
        Self {
            question_id: Some(question.id.clone()),
            ..Self::new(ChatKind::Question, question.text.clone())
        }
    }
}

/// Everything the UI renders for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionState {
    pub document_id: Option<String>,
    pub original_text: String,
    /// `original_text` with `applied_patches` replayed in order.
    pub current_text: String,
    pub messages: Vec<ChatEntry>,
    /// Scratch buffer for streamed assistant output.
    pub streaming: String,
    /// Set while a user-initiated turn is outstanding.
    pub processing: bool,
    pub pending_questions: Vec<Question>,
    pub plan: Vec<PlanTask>,
    pub draft_patches: Vec<Patch>,
    pub applied_patches: Vec<Patch>,
}

impl SessionState {
    pub fn new(document_id: &str, original_text: String) -> Self {
        Self {
            document_id: Some(document_id.to_string()),
            current_text: original_text.clone(),
            original_text,
            ..Self::default()
        }
    }

    pub fn push(&mut self, kind: ChatKind, content: impl Into<String>) {
        self.messages.push(ChatEntry::new(kind, content));
    }

    pub fn draft(&self, patch_id: &str) -> Option<&Patch> {
        self.draft_patches.iter().find(|p| p.id == patch_id)
    }

    pub fn is_applied(&self, patch_id: &str) -> bool {
        self.applied_patches.iter().any(|p| p.id == patch_id)
    }

    pub fn current_task(&self) -> Option<&PlanTask> {
        self.plan
            .iter()
            .find(|task| task.status == TaskStatus::InProgress)
    }

    /// Inline layout of the draft patches over the current text.
    pub fn preview(&self) -> Preview {
        build_preview(&self.current_text, &self.original_text, &self.draft_patches)
    }
}
