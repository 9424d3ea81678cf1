//! Wire Protocol Types
//!
//! Both directions use the envelope `{ "type": ..., "data": ... }`. Inbound
//! frames are decoded into a closed [`ServerEvent`] union; anything that does
//! not fit becomes a [`ParseError`] instead of an untyped value.

use std::fmt;

use redline_patch::{Patch, PlanTask};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A clarifying question asked by the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub suggested_answers: Vec<String>,
    #[serde(default)]
    pub allow_multiple: bool,
}

/// Inbound event kinds, one per `type` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    AssistantMessage,
    Questions,
    Patches,
    Plan,
    Streaming,
    Error,
    Warnings,
    PatchApplied,
}

impl EventKind {
    pub const ALL: [EventKind; 8] = [
        EventKind::AssistantMessage,
        EventKind::Questions,
        EventKind::Patches,
        EventKind::Plan,
        EventKind::Streaming,
        EventKind::Error,
        EventKind::Warnings,
        EventKind::PatchApplied,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AssistantMessage => "assistant_message",
            Self::Questions => "questions",
            Self::Patches => "patches",
            Self::Plan => "plan",
            Self::Streaming => "streaming",
            Self::Error => "error",
            Self::Warnings => "warnings",
            Self::PatchApplied => "patch_applied",
        }
    }

    fn parse(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == tag)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssistantMessage {
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionBatch {
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchBatch {
    pub patches: Vec<Patch>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSnapshot {
    pub tasks: Vec<PlanTask>,
}

/// One piece of streamed assistant output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamChunk {
    #[serde(default)]
    pub chunk: String,
    #[serde(default)]
    pub complete: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerError {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warnings {
    pub warnings: Vec<String>,
}

/// Server acknowledgement of an accepted patch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchAck {
    pub patch_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Events sent FROM the server TO the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    AssistantMessage(AssistantMessage),
    Questions(QuestionBatch),
    Patches(PatchBatch),
    Plan(PlanSnapshot),
    Streaming(StreamChunk),
    Error(ServerError),
    Warnings(Warnings),
    PatchApplied(PatchAck),
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("malformed envelope: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("unknown event type: {0}")]
    UnknownType(String),

    #[error("invalid {kind} payload: {source}")]
    InvalidPayload {
        kind: EventKind,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

impl ServerEvent {
    /// Decode one text frame.
    pub fn decode(frame: &str) -> Result<Self, ParseError> {
        let envelope: RawEnvelope = serde_json::from_str(frame).map_err(ParseError::Malformed)?;
        let kind =
            EventKind::parse(&envelope.kind).ok_or(ParseError::UnknownType(envelope.kind))?;
        let data = envelope.data;

        Ok(match kind {
            EventKind::AssistantMessage => Self::AssistantMessage(payload(kind, data)?),
            EventKind::Questions => Self::Questions(payload(kind, data)?),
            EventKind::Patches => Self::Patches(payload(kind, data)?),
            EventKind::Plan => Self::Plan(payload(kind, data)?),
            EventKind::Streaming => Self::Streaming(payload(kind, data)?),
            EventKind::Error => Self::Error(payload(kind, data)?),
            EventKind::Warnings => Self::Warnings(payload(kind, data)?),
            EventKind::PatchApplied => Self::PatchApplied(payload(kind, data)?),
        })
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Self::AssistantMessage(_) => EventKind::AssistantMessage,
            Self::Questions(_) => EventKind::Questions,
            Self::Patches(_) => EventKind::Patches,
            Self::Plan(_) => EventKind::Plan,
            Self::Streaming(_) => EventKind::Streaming,
            Self::Error(_) => EventKind::Error,
            Self::Warnings(_) => EventKind::Warnings,
            Self::PatchApplied(_) => EventKind::PatchApplied,
        }
    }
}

fn payload<T: DeserializeOwned>(kind: EventKind, data: Value) -> Result<T, ParseError> {
    serde_json::from_value(data).map_err(|source| ParseError::InvalidPayload { kind, source })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionAnswer {
    pub question_id: String,
    pub answer: String,
}

/// Messages sent FROM the client TO the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    /// A user turn, with the document as the user currently sees it.
    UserMessage {
        message: String,
        document_text: String,
    },
    AnswerQuestion {
        question_id: String,
        answer: String,
        document_text: String,
    },
    AnswerAllQuestions {
        answers: Vec<QuestionAnswer>,
        document_text: String,
    },
    /// The user accepted a draft locally.
    ApplyPatch { patch_id: String },
    /// Ask the server to halt the current generation.
    StopGeneration,
}

impl ClientMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UserMessage { .. } => "user_message",
            Self::AnswerQuestion { .. } => "answer_question",
            Self::AnswerAllQuestions { .. } => "answer_all_questions",
            Self::ApplyPatch { .. } => "apply_patch",
            Self::StopGeneration => "stop_generation",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redline_patch::{PatchKind, TaskStatus};

    #[test]
    fn test_decode_assistant_message() {
        let json = r#"{"type":"assistant_message","data":{"content":"Done."}}"#;
        let event = ServerEvent::decode(json).unwrap();
        assert_eq!(
            event,
            ServerEvent::AssistantMessage(AssistantMessage {
                content: "Done.".to_string()
            })
        );
        assert_eq!(event.kind(), EventKind::AssistantMessage);
    }

    #[test]
    fn test_decode_patches() {
        let json = r#"{"type":"patches","data":{"patches":[
            {"id":"p1","type":"replace","start_line":2,"end_line":2,"old_text":"Line2","new_text":"Line2x","reason":"typo"}
        ]}}"#;
        match ServerEvent::decode(json).unwrap() {
            ServerEvent::Patches(batch) => {
                assert_eq!(batch.patches.len(), 1);
                assert_eq!(batch.patches[0].kind, PatchKind::Replace);
                assert_eq!(batch.patches[0].reason, "typo");
            }
            other => panic!("Expected Patches, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_plan_and_questions() {
        let plan = r#"{"type":"plan","data":{"tasks":[{"id":"t1","title":"Outline","status":"in_progress"}]}}"#;
        match ServerEvent::decode(plan).unwrap() {
            ServerEvent::Plan(snapshot) => {
                assert_eq!(snapshot.tasks[0].status, TaskStatus::InProgress)
            }
            other => panic!("Expected Plan, got {other:?}"),
        }

        let questions = r#"{"type":"questions","data":{"questions":[{"id":"q1","text":"Tone?","suggested_answers":["formal","casual"]}]}}"#;
        match ServerEvent::decode(questions).unwrap() {
            ServerEvent::Questions(batch) => {
                let q = &batch.questions[0];
                assert!(!q.required);
                assert!(!q.allow_multiple);
                assert_eq!(q.suggested_answers, ["formal", "casual"]);
            }
            other => panic!("Expected Questions, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_streaming_defaults() {
        let json = r#"{"type":"streaming","data":{"complete":true}}"#;
        assert_eq!(
            ServerEvent::decode(json).unwrap(),
            ServerEvent::Streaming(StreamChunk {
                chunk: String::new(),
                complete: true
            })
        );
    }

    #[test]
    fn test_decode_malformed() {
        assert!(matches!(
            ServerEvent::decode("not json"),
            Err(ParseError::Malformed(_))
        ));
        assert!(matches!(
            ServerEvent::decode(r#"{"data":{}}"#),
            Err(ParseError::Malformed(_))
        ));
    }

    #[test]
    fn test_decode_unknown_type() {
        match ServerEvent::decode(r#"{"type":"telemetry","data":{}}"#) {
            Err(ParseError::UnknownType(t)) => assert_eq!(t, "telemetry"),
            other => panic!("Expected UnknownType, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_invalid_payload() {
        let json = r#"{"type":"error","data":{"msg":"wrong field"}}"#;
        match ServerEvent::decode(json) {
            Err(ParseError::InvalidPayload { kind, .. }) => assert_eq!(kind, EventKind::Error),
            other => panic!("Expected InvalidPayload, got {other:?}"),
        }
    }

    #[test]
    fn test_server_event_roundtrips_through_envelope() {
        let event = ServerEvent::PatchApplied(PatchAck {
            patch_id: "p1".to_string(),
            message: None,
        });
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"type":"patch_applied","data":{"patch_id":"p1"}}"#);
        assert_eq!(ServerEvent::decode(&json).unwrap(), event);
    }

    #[test]
    fn test_client_message_envelope() {
        let msg = ClientMessage::UserMessage {
            message: "Tighten the intro".to_string(),
            document_text: "Intro".to_string(),
        };
        let value: Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "user_message");
        assert_eq!(value["data"]["message"], "Tighten the intro");
        assert_eq!(value["data"]["document_text"], "Intro");
        assert_eq!(msg.kind(), "user_message");
    }

    #[test]
    fn test_client_message_answer_all() {
        let msg = ClientMessage::AnswerAllQuestions {
            answers: vec![QuestionAnswer {
                question_id: "q1".to_string(),
                answer: "formal".to_string(),
            }],
            document_text: String::new(),
        };
        let value: Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "answer_all_questions");
        assert_eq!(value["data"]["answers"][0]["question_id"], "q1");
    }

    #[test]
    fn test_stop_generation_has_no_data() {
        let json = serde_json::to_string(&ClientMessage::StopGeneration).unwrap();
        assert_eq!(json, r#"{"type":"stop_generation"}"#);
    }

    #[test]
    fn test_event_kind_tags_match_serde() {
        for kind in EventKind::ALL {
            let tag = serde_json::to_value(kind).unwrap();
            assert_eq!(tag, kind.as_str());
        }
    }
}
