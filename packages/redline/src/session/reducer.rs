//! Inbound event reducers.
//!
//! Each server event kind maps to exactly one state transition. Reducers only
//! look at the event and the state they are handed; they never talk to the
//! connection.

use redline_patch::{merge_draft_patches, narrate, regressed_tasks};
use tracing::{debug, warn};

use super::state::{ChatEntry, ChatKind, SessionState};
use crate::protocol::{
    AssistantMessage, PatchAck, PatchBatch, PlanSnapshot, QuestionBatch, ServerError, ServerEvent,
    StreamChunk, Warnings,
};

pub fn reduce(state: &mut SessionState, event: &ServerEvent) {
    match event {
        ServerEvent::AssistantMessage(msg) => assistant_message(state, msg),
        ServerEvent::Questions(batch) => questions(state, batch),
        ServerEvent::Patches(batch) => patches(state, batch),
        ServerEvent::Plan(snapshot) => plan(state, snapshot),
        ServerEvent::Streaming(chunk) => streaming(state, chunk),
        ServerEvent::Error(err) => error(state, err),
        ServerEvent::Warnings(warnings) => warnings_received(state, warnings),
        ServerEvent::PatchApplied(ack) => patch_applied(state, ack),
    }
}

fn assistant_message(state: &mut SessionState, msg: &AssistantMessage) {
    state.push(ChatKind::Assistant, msg.content.clone());
    state.streaming.clear();
    state.processing = false;
}

fn questions(state: &mut SessionState, batch: &QuestionBatch) {
    state.pending_questions = batch.questions.clone();
    state
        .messages
        .extend(batch.questions.iter().map(ChatEntry::question));
}

fn patches(state: &mut SessionState, batch: &PatchBatch) {
    let incoming: Vec<_> = batch
        .patches
        .iter()
        .filter(|patch| {
            let applied = state.is_applied(&patch.id);
            if applied {
                debug!(patch_id = %patch.id, "ignoring re-sent patch that is already applied");
            }
            !applied
        })
        .cloned()
        .collect();

    let outcome = merge_draft_patches(&state.draft_patches, incoming);
    if !outcome.changed() {
        return;
    }
    state.draft_patches = outcome.patches;
    state.push(
        ChatKind::Checkpoint,
        format!(
            "Received {} new and {} updated {}; {} awaiting review.",
            outcome.added,
            outcome.updated,
            plural(outcome.added + outcome.updated, "patch", "patches"),
            state.draft_patches.len()
        ),
    );
}

fn plan(state: &mut SessionState, snapshot: &PlanSnapshot) {
    let previous = std::mem::replace(&mut state.plan, snapshot.tasks.clone());
    for task in regressed_tasks(&previous, &state.plan) {
        warn!(task_id = %task.id, title = %task.title, "plan step went back to pending");
    }
    for message in narrate(&previous, &state.plan) {
        state.push(ChatKind::Checkpoint, message);
    }
}

fn streaming(state: &mut SessionState, chunk: &StreamChunk) {
    if chunk.complete {
        state.streaming.clear();
    } else {
        state.streaming.push_str(&chunk.chunk);
    }
}

fn error(state: &mut SessionState, err: &ServerError) {
    state.push(ChatKind::System, format!("Error: {}", err.message));
    state.processing = false;
}

fn warnings_received(state: &mut SessionState, warnings: &Warnings) {
    for warning in &warnings.warnings {
        state.push(ChatKind::System, format!("Warning: {warning}"));
    }
}

fn patch_applied(state: &mut SessionState, ack: &PatchAck) {
    let content = match &ack.message {
        Some(message) => message.clone(),
        None => format!("Server confirmed patch {}.", ack.patch_id),
    };
    state.push(ChatKind::Checkpoint, content);
}

fn plural(count: usize, one: &'static str, many: &'static str) -> &'static str {
    if count == 1 { one } else { many }
}
