//! Protocol events and the decoder that produces them.
//!
//! Each frame payload is one JSON object. Its `type` field selects one of a
//! closed set of event kinds; the spelling of the discriminant is normalized
//! so `RUN_STARTED`, `run-started` and `run_started` are the same kind.
//! Objects with an unrecognized `type` are kept as [`CustomEvent`]s named
//! after that type, so new server-side kinds surface instead of vanishing.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::error::DecodeError;
use crate::payload::Payload;

/// The kinds of event the engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    RunStarted,
    TextMessageStart,
    TextMessageContent,
    TextMessageEnd,
    ToolCallStart,
    ToolCallArgs,
    ToolCallEnd,
    ToolCallResult,
    StepStarted,
    StepFinished,
    RunFinished,
    RunError,
    Custom,
}

impl EventKind {
    /// Every kind, in protocol order.
    pub const ALL: [EventKind; 13] = [
        EventKind::RunStarted,
        EventKind::TextMessageStart,
        EventKind::TextMessageContent,
        EventKind::TextMessageEnd,
        EventKind::ToolCallStart,
        EventKind::ToolCallArgs,
        EventKind::ToolCallEnd,
        EventKind::ToolCallResult,
        EventKind::StepStarted,
        EventKind::StepFinished,
        EventKind::RunFinished,
        EventKind::RunError,
        EventKind::Custom,
    ];

    /// Canonical wire name (AG-UI SCREAMING_SNAKE_CASE).
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::RunStarted => "RUN_STARTED",
            EventKind::TextMessageStart => "TEXT_MESSAGE_START",
            EventKind::TextMessageContent => "TEXT_MESSAGE_CONTENT",
            EventKind::TextMessageEnd => "TEXT_MESSAGE_END",
            EventKind::ToolCallStart => "TOOL_CALL_START",
            EventKind::ToolCallArgs => "TOOL_CALL_ARGS",
            EventKind::ToolCallEnd => "TOOL_CALL_END",
            EventKind::ToolCallResult => "TOOL_CALL_RESULT",
            EventKind::StepStarted => "STEP_STARTED",
            EventKind::StepFinished => "STEP_FINISHED",
            EventKind::RunFinished => "RUN_FINISHED",
            EventKind::RunError => "RUN_ERROR",
            EventKind::Custom => "CUSTOM",
        }
    }

    /// Parse a discriminant, ignoring case and treating `-` as `_`.
    pub fn parse(discriminant: &str) -> Option<Self> {
        let normalized = discriminant.trim().replace('-', "_").to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
    }

    /// Tool-call and step kinds, which a subscriber may opt out of.
    pub fn is_tool_activity(self) -> bool {
        matches!(
            self,
            EventKind::ToolCallStart
                | EventKind::ToolCallArgs
                | EventKind::ToolCallEnd
                | EventKind::ToolCallResult
                | EventKind::StepStarted
                | EventKind::StepFinished
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded protocol event.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolEvent {
    RunStarted(RunStarted),
    TextMessageStart(TextMessageStart),
    TextMessageContent(TextMessageContent),
    TextMessageEnd(TextMessageEnd),
    ToolCallStart(ToolCallStart),
    ToolCallArgs(ToolCallArgs),
    ToolCallEnd(ToolCallEnd),
    ToolCallResult(ToolCallResult),
    StepStarted(StepStarted),
    StepFinished(StepFinished),
    RunFinished(RunFinished),
    RunError(RunError),
    Custom(CustomEvent),
}

impl ProtocolEvent {
    /// The kind of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            ProtocolEvent::RunStarted(_) => EventKind::RunStarted,
            ProtocolEvent::TextMessageStart(_) => EventKind::TextMessageStart,
            ProtocolEvent::TextMessageContent(_) => EventKind::TextMessageContent,
            ProtocolEvent::TextMessageEnd(_) => EventKind::TextMessageEnd,
            ProtocolEvent::ToolCallStart(_) => EventKind::ToolCallStart,
            ProtocolEvent::ToolCallArgs(_) => EventKind::ToolCallArgs,
            ProtocolEvent::ToolCallEnd(_) => EventKind::ToolCallEnd,
            ProtocolEvent::ToolCallResult(_) => EventKind::ToolCallResult,
            ProtocolEvent::StepStarted(_) => EventKind::StepStarted,
            ProtocolEvent::StepFinished(_) => EventKind::StepFinished,
            ProtocolEvent::RunFinished(_) => EventKind::RunFinished,
            ProtocolEvent::RunError(_) => EventKind::RunError,
            ProtocolEvent::Custom(_) => EventKind::Custom,
        }
    }

    /// Whether this event ends a run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProtocolEvent::RunFinished(_) | ProtocolEvent::RunError(_))
    }
}

// ===== Lifecycle =====

/// A run started.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStarted {
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub run_id: Option<String>,
}

/// A run finished successfully.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunFinished {
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub run_id: Option<String>,
}

/// The far end reported that the run failed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunError {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub code: Option<String>,
}

impl RunError {
    /// Build an error event that did not come from the wire.
    pub fn local(message: impl Into<String>, code: &str) -> Self {
        Self {
            message: message.into(),
            code: Some(code.to_string()),
        }
    }

    /// The message to show a user, never empty.
    pub fn display_message(&self) -> &str {
        if self.message.trim().is_empty() {
            "Unknown error occurred"
        } else {
            &self.message
        }
    }
}

/// A named step began.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepStarted {
    #[serde(default)]
    pub step_name: Option<String>,
}

/// A named step ended.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepFinished {
    #[serde(default)]
    pub step_name: Option<String>,
}

// ===== Text messages =====

/// An assistant text message opened.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextMessageStart {
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// A fragment of the open text message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextMessageContent {
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub delta: String,
}

/// The open text message is complete.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextMessageEnd {
    #[serde(default)]
    pub message_id: Option<String>,
}

// ===== Tool calls =====

/// A tool call opened.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallStart {
    pub tool_call_id: String,
    pub tool_call_name: String,
    #[serde(default)]
    pub parent_message_id: Option<String>,
}

/// A fragment of a tool call's JSON arguments.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallArgs {
    pub tool_call_id: String,
    #[serde(default)]
    pub delta: String,
}

/// A tool call's arguments are complete.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallEnd {
    pub tool_call_id: String,
}

/// The output of a tool call.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    pub tool_call_id: String,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub content: Payload,
}

// ===== Extension point =====

/// A named, opaque signal.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CustomEvent {
    pub name: String,
    #[serde(default)]
    pub value: Payload,
}

/// Decode one frame payload.
///
/// # Example
///
/// ```
/// use agentwire_core::event::{decode, ProtocolEvent};
///
/// let event = decode(r#"{"type":"text-message-content","delta":"Hi"}"#).unwrap();
/// match event {
///     ProtocolEvent::TextMessageContent(content) => assert_eq!(content.delta, "Hi"),
///     other => panic!("unexpected {:?}", other),
/// }
/// ```
pub fn decode(payload: &str) -> Result<ProtocolEvent, DecodeError> {
    let value: Value = serde_json::from_str(payload).map_err(DecodeError::InvalidJson)?;
    decode_value(value)
}

/// Classify an already-parsed JSON value.
pub fn decode_value(value: Value) -> Result<ProtocolEvent, DecodeError> {
    let Some(object) = value.as_object() else {
        return Err(DecodeError::NotAnObject);
    };

    let discriminant = match object.get("type").and_then(Value::as_str) {
        Some(discriminant) => discriminant.to_string(),
        None if object.get("name").and_then(Value::as_str).is_some() => {
            EventKind::Custom.as_str().to_string()
        }
        None => return Err(DecodeError::MissingDiscriminant),
    };

    let Some(kind) = EventKind::parse(&discriminant) else {
        log::debug!("routing unknown event type {:?} to custom handling", discriminant);
        return Ok(ProtocolEvent::Custom(CustomEvent {
            name: discriminant,
            value: Payload::from_value(value),
        }));
    };

    let event = match kind {
        EventKind::RunStarted => ProtocolEvent::RunStarted(fields(value, kind)?),
        EventKind::TextMessageStart => ProtocolEvent::TextMessageStart(fields(value, kind)?),
        EventKind::TextMessageContent => ProtocolEvent::TextMessageContent(fields(value, kind)?),
        EventKind::TextMessageEnd => ProtocolEvent::TextMessageEnd(fields(value, kind)?),
        EventKind::ToolCallStart => ProtocolEvent::ToolCallStart(fields(value, kind)?),
        EventKind::ToolCallArgs => ProtocolEvent::ToolCallArgs(fields(value, kind)?),
        EventKind::ToolCallEnd => ProtocolEvent::ToolCallEnd(fields(value, kind)?),
        EventKind::ToolCallResult => ProtocolEvent::ToolCallResult(fields(value, kind)?),
        EventKind::StepStarted => ProtocolEvent::StepStarted(fields(value, kind)?),
        EventKind::StepFinished => ProtocolEvent::StepFinished(fields(value, kind)?),
        EventKind::RunFinished => ProtocolEvent::RunFinished(fields(value, kind)?),
        EventKind::RunError => ProtocolEvent::RunError(fields(value, kind)?),
        EventKind::Custom => ProtocolEvent::Custom(fields(value, kind)?),
    };
    Ok(event)
}

fn fields<T: DeserializeOwned>(value: Value, kind: EventKind) -> Result<T, DecodeError> {
    serde_json::from_value(value).map_err(|source| DecodeError::InvalidEvent { kind, source })
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
