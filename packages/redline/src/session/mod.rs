//! Session Store
//!
//! Single owner of a session's chat log, questions, plan, and patch lists.
//! State lives in a `watch` channel so front ends can subscribe to snapshots;
//! every mutation goes through this type.
//!
//! User-initiated turns (`send_message`, `answer_question`,
//! `answer_all_questions`) are admitted one at a time via the `processing`
//! flag. A second turn while one is outstanding is refused, not queued.

mod reducer;
mod state;

pub use reducer::reduce;
pub use state::{ChatEntry, ChatKind, SessionState};

use redline_patch::{PatchError, apply_patch, replay};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::connection::{ConnectionManager, ConnectionState};
use crate::drafts::DraftSnapshot;
use crate::protocol::{ClientMessage, QuestionAnswer, ServerEvent};

/// What the session store needs from the connection.
pub trait SessionLink: Send + Sync + 'static {
    fn connect(&self, document_id: &str);
    fn disconnect(&self);
    /// Returns false if the message could not be handed to the transport.
    fn send(&self, message: ClientMessage) -> bool;
    fn connection_state(&self) -> ConnectionState;
}

impl SessionLink for ConnectionManager {
    fn connect(&self, document_id: &str) {
        ConnectionManager::connect(self, document_id);
    }

    fn disconnect(&self) {
        ConnectionManager::disconnect(self);
    }

    fn send(&self, message: ClientMessage) -> bool {
        ConnectionManager::send(self, &message)
    }

    fn connection_state(&self) -> ConnectionState {
        self.state()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("a request is already in progress")]
    Busy,

    #[error("session has not been initialized")]
    NotInitialized,

    #[error("not connected; the request was not sent")]
    NotConnected,

    #[error("nothing to send")]
    EmptyInput,

    #[error("no pending question with id {0}")]
    UnknownQuestion(String),

    #[error("draft belongs to document {found}, session is {expected}")]
    DraftDocument { expected: String, found: String },

    #[error("draft patches do not replay: {0}")]
    DraftReplay(#[from] PatchError),

    #[error("draft patches do not reproduce the saved text")]
    DraftMismatch,
}

/// Result of accepting a draft patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// No draft with that id.
    NotFound,
    /// Verification failed; nothing changed.
    Rejected(PatchError),
}

pub struct SessionStore<L> {
    link: L,
    state: watch::Sender<SessionState>,
}

impl<L: SessionLink> SessionStore<L> {
    pub fn new(link: L) -> Self {
        Self {
            link,
            state: watch::Sender::new(SessionState::default()),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Run `f` against the current state without cloning it.
    pub fn read<R>(&self, f: impl FnOnce(&SessionState) -> R) -> R {
        f(&self.state.borrow())
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.link.connection_state()
    }

    /// Reset to a fresh session over `original_text` and open the connection.
    pub fn initialize(&self, document_id: &str, original_text: String) {
        self.link.disconnect();
        info!(document_id, bytes = original_text.len(), "initializing session");
        self.state
            .send_replace(SessionState::new(document_id, original_text));
        self.link.connect(document_id);
    }

    /// Reopen the connection for the current document, keeping chat, plan,
    /// questions and patches as they are.
    pub fn reconnect(&self) -> Result<(), SessionError> {
        let document_id = self
            .read(|state| state.document_id.clone())
            .ok_or(SessionError::NotInitialized)?;
        info!(%document_id, "manual reconnect");
        self.link.connect(&document_id);
        Ok(())
    }

    /// Apply one inbound server event.
    pub fn handle_event(&self, event: &ServerEvent) {
        debug!(event = %event.kind(), "applying server event");
        self.state.send_modify(|state| reduce(state, event));
    }

    pub fn send_message(&self, text: &str) -> Result<(), SessionError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::EmptyInput);
        }
        self.begin_turn(|state| {
            state.push(ChatKind::User, text);
            Ok(ClientMessage::UserMessage {
                message: text.to_string(),
                document_text: state.current_text.clone(),
            })
        })
    }

    /// Answer one pending question. The question leaves the pending list
    /// once the answer is handed to the connection.
    pub fn answer_question(&self, question_id: &str, answer: &str) -> Result<(), SessionError> {
        let answer = answer.trim();
        if answer.is_empty() {
            return Err(SessionError::EmptyInput);
        }
        self.begin_turn(|state| {
            let index = state
                .pending_questions
                .iter()
                .position(|q| q.id == question_id)
                .ok_or_else(|| SessionError::UnknownQuestion(question_id.to_string()))?;
            let question = state.pending_questions.remove(index);
            state.push(ChatKind::User, format!("{}\n{}", question.text, answer));
            Ok(ClientMessage::AnswerQuestion {
                question_id: question.id,
                answer: answer.to_string(),
                document_text: state.current_text.clone(),
            })
        })
    }

    pub fn answer_all_questions(&self, answers: Vec<QuestionAnswer>) -> Result<(), SessionError> {
        if answers.is_empty() {
            return Err(SessionError::EmptyInput);
        }
        self.begin_turn(|state| {
            let mut lines = Vec::with_capacity(answers.len());
            for answer in &answers {
                let question = state
                    .pending_questions
                    .iter()
                    .find(|q| q.id == answer.question_id)
                    .ok_or_else(|| SessionError::UnknownQuestion(answer.question_id.clone()))?;
                lines.push(format!("{}: {}", question.text, answer.answer));
            }
            state
                .pending_questions
                .retain(|q| !answers.iter().any(|a| a.question_id == q.id));
            state.push(
                ChatKind::User,
                format!("Answered {} questions:\n{}", answers.len(), lines.join("\n")),
            );
            Ok(ClientMessage::AnswerAllQuestions {
                answers: answers.clone(),
                document_text: state.current_text.clone(),
            })
        })
    }

    /// Ask the server to stop generating. Local state is left alone until
    /// the server answers.
    pub fn stop_generation(&self) -> Result<(), SessionError> {
        if self.link.send(ClientMessage::StopGeneration) {
            Ok(())
        } else {
            Err(SessionError::NotConnected)
        }
    }

    /// Verify and fold a draft patch into the current text.
    pub fn apply_patch(&self, patch_id: &str) -> ApplyOutcome {
        let mut outcome = ApplyOutcome::NotFound;
        self.state.send_if_modified(|state| {
            let Some(index) = state.draft_patches.iter().position(|p| p.id == patch_id) else {
                debug!(patch_id, "apply requested for unknown draft");
                return false;
            };
            let patch = &state.draft_patches[index];
            match apply_patch(&state.current_text, patch) {
                Ok(text) => {
                    let label =
                        format!("Applied patch {} (lines {}).", patch.id, patch.line_label());
                    state.current_text = text;
                    let patch = state.draft_patches.remove(index);
                    state.applied_patches.push(patch);
                    state.push(ChatKind::Checkpoint, label);
                    outcome = ApplyOutcome::Applied;
                }
                Err(e) => {
                    warn!(patch_id, error = %e, "patch verification failed");
                    let message = format!("Could not apply patch {}: {e}", patch.id);
                    state.push(ChatKind::System, message);
                    outcome = ApplyOutcome::Rejected(e);
                }
            }
            true
        });

        if outcome == ApplyOutcome::Applied {
            info!(patch_id, "patch applied");
            self.link.send(ClientMessage::ApplyPatch {
                patch_id: patch_id.to_string(),
            });
        }
        outcome
    }

    /// Drop a draft without touching the text. Returns false if unknown.
    pub fn reject_patch(&self, patch_id: &str) -> bool {
        self.state.send_if_modified(|state| {
            let before = state.draft_patches.len();
            state.draft_patches.retain(|p| p.id != patch_id);
            state.draft_patches.len() != before
        })
    }

    /// Back to the original text with no drafts or applied patches. Chat and
    /// plan are kept.
    pub fn reset_all(&self) {
        self.state.send_modify(|state| {
            state.current_text = state.original_text.clone();
            state.applied_patches.clear();
            state.draft_patches.clear();
        });
    }

    pub fn disconnect(&self) {
        self.link.disconnect();
    }

    pub fn draft_snapshot(&self) -> Option<DraftSnapshot> {
        self.read(|state| {
            state.document_id.as_ref().map(|document_id| DraftSnapshot {
                document_id: document_id.clone(),
                current_text: state.current_text.clone(),
                applied_patches: state.applied_patches.clone(),
                saved_at: chrono::Utc::now(),
            })
        })
    }

    /// Restore applied patches from a saved draft.
    ///
    /// The saved patches are replayed onto the original text; a snapshot whose
    /// replay does not reproduce its saved text is refused.
    pub fn restore_draft(&self, snapshot: DraftSnapshot) -> Result<(), SessionError> {
        let mut result = Ok(());
        self.state.send_if_modified(|state| {
            result = restore_into(state, snapshot);
            result.is_ok()
        });
        result
    }

    /// Admit a user-initiated turn and send the message `build` produces.
    ///
    /// `build` must validate before mutating; its error leaves state as is.
    /// If the connection refuses the message, pending questions `build`
    /// removed are put back.
    fn begin_turn<F>(&self, build: F) -> Result<(), SessionError>
    where
        F: FnOnce(&mut SessionState) -> Result<ClientMessage, SessionError>,
    {
        let mut admitted = Err(SessionError::Busy);
        let mut questions_before = Vec::new();
        self.state.send_if_modified(|state| {
            if state.document_id.is_none() {
                admitted = Err(SessionError::NotInitialized);
                return false;
            }
            if state.processing {
                return false;
            }
            let questions = state.pending_questions.clone();
            match build(state) {
                Ok(message) => {
                    questions_before = questions;
                    state.processing = true;
                    admitted = Ok(message);
                    true
                }
                Err(e) => {
                    admitted = Err(e);
                    false
                }
            }
        });

        let message = admitted.inspect_err(|e| debug!(error = %e, "turn refused"))?;
        let kind = message.kind();
        if self.link.send(message) {
            debug!(kind, "turn started");
            return Ok(());
        }
        self.state.send_modify(|state| {
            state.processing = false;
            state.pending_questions = questions_before;
            state.push(ChatKind::System, "Not connected; the request was not sent.");
        });
        Err(SessionError::NotConnected)
    }
}

fn restore_into(state: &mut SessionState, snapshot: DraftSnapshot) -> Result<(), SessionError> {
    let Some(document_id) = state.document_id.as_deref() else {
        return Err(SessionError::NotInitialized);
    };
    if document_id != snapshot.document_id {
        return Err(SessionError::DraftDocument {
            expected: document_id.to_string(),
            found: snapshot.document_id,
        });
    }
    let replayed = replay(&state.original_text, &snapshot.applied_patches)?;
    if replayed != snapshot.current_text {
        return Err(SessionError::DraftMismatch);
    }

    let count = snapshot.applied_patches.len();
    state
        .draft_patches
        .retain(|draft| !snapshot.applied_patches.iter().any(|p| p.id == draft.id));
    state.current_text = replayed;
    state.applied_patches = snapshot.applied_patches;
    state.push(
        ChatKind::Checkpoint,
        format!(
            "Restored draft saved {} with {count} applied {}.",
            snapshot.saved_at.format("%Y-%m-%d %H:%M UTC"),
            if count == 1 { "patch" } else { "patches" }
        ),
    );
    Ok(())
}
