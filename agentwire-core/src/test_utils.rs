//! Test utilities for agentwire-core.
//!
//! Enable with the `test-utils` feature:
//!
//! ```toml
//! [dev-dependencies]
//! agentwire-core = { version = "...", features = ["test-utils"] }
//! ```
//!
//! # Example
//!
//! ```rust
//! use agentwire_core::test_utils::{EventLog, RecordingSubscriber};
//! use agentwire_core::Session;
//!
//! let recorder = RecordingSubscriber::new();
//! let mut session = Session::new();
//! session.subscribe(recorder.clone());
//!
//! let log = EventLog::new()
//!     .run_started("r1")
//!     .text("m1", &["Hi", " there"])
//!     .run_finished();
//! session.feed(log.to_sse().as_bytes());
//!
//! assert_eq!(session.conversation().messages()[0].content, "Hi there");
//! assert_eq!(recorder.count("TEXT_MESSAGE_CONTENT"), 2);
//! ```

use std::sync::{Arc, Mutex};

use serde_json::{json, Value};

use crate::error::DecodeError;
use crate::event::ProtocolEvent;
use crate::frame::DATA_PREFIX;
use crate::subscriber::{EventContext, RunSubscriber};

/// Format one payload as a complete frame.
pub fn sse_frame(payload: &str) -> String {
    format!("{}{}\n\n", DATA_PREFIX, payload)
}

/// Builds a captured event log, one JSON event per frame.
///
/// Discriminants use the kebab-case spelling the reference server emits.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<Value>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append any JSON value as-is.
    pub fn raw(mut self, value: Value) -> Self {
        self.events.push(value);
        self
    }

    pub fn run_started(self, run_id: &str) -> Self {
        self.raw(json!({"type": "run-started", "runId": run_id}))
    }

    /// A complete text message: start, one content event per delta, end.
    pub fn text(mut self, message_id: &str, deltas: &[&str]) -> Self {
        self = self.raw(json!({"type": "text-message-start"}));
        for delta in deltas {
            self = self.raw(json!({"type": "text-message-content", "delta": delta}));
        }
        self.raw(json!({"type": "text-message-end", "messageId": message_id}))
    }

    pub fn tool_start(self, id: &str, name: &str) -> Self {
        self.raw(json!({"type": "tool-call-start", "toolCallId": id, "toolCallName": name}))
    }

    pub fn tool_args(self, id: &str, delta: &str) -> Self {
        self.raw(json!({"type": "tool-call-args", "toolCallId": id, "delta": delta}))
    }

    pub fn tool_end(self, id: &str) -> Self {
        self.raw(json!({"type": "tool-call-end", "toolCallId": id}))
    }

    /// A complete tool call: start, one args event per delta, end.
    pub fn tool_call(mut self, id: &str, name: &str, deltas: &[&str]) -> Self {
        self = self.tool_start(id, name);
        for delta in deltas {
            self = self.tool_args(id, delta);
        }
        self.tool_end(id)
    }

    pub fn tool_result(self, id: &str, content: Value) -> Self {
        self.raw(json!({
            "type": "tool-call-result",
            "toolCallId": id,
            "messageId": format!("result-{}", id),
            "content": content,
        }))
    }

    pub fn custom(self, name: &str, value: Value) -> Self {
        self.raw(json!({"type": "custom", "name": name, "value": value}))
    }

    /// A `deferred_tool_requests` event for `(call_id, tool_name, args)`.
    pub fn deferred(self, requests: &[(&str, &str, Value)]) -> Self {
        let value: serde_json::Map<String, Value> = requests
            .iter()
            .map(|(id, tool, args)| (id.to_string(), json!({"tool_name": tool, "args": args})))
            .collect();
        self.custom(crate::custom::DEFERRED_TOOL_REQUESTS, Value::Object(value))
    }

    pub fn run_finished(self) -> Self {
        self.raw(json!({"type": "run-finished"}))
    }

    pub fn run_error(self, message: &str) -> Self {
        self.raw(json!({"type": "run-error", "message": message}))
    }

    pub fn events(&self) -> &[Value] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// The log as one `text/event-stream` body.
    pub fn to_sse(&self) -> String {
        self.events
            .iter()
            .map(|event| sse_frame(&event.to_string()))
            .collect()
    }
}

/// What a [`RecordingSubscriber`] saw.
#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    Event(ProtocolEvent),
    DecodeError { message: String, payload: String },
}

/// A subscriber that records every delivered event.
///
/// Clones share the same record, so keep one clone for assertions.
#[derive(Debug, Clone, Default)]
pub struct RecordingSubscriber {
    records: Arc<Mutex<Vec<Recorded>>>,
}

impl RecordingSubscriber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<Recorded> {
        self.records.lock().unwrap().clone()
    }

    /// Delivered events, without decode errors.
    pub fn events(&self) -> Vec<ProtocolEvent> {
        self.records()
            .into_iter()
            .filter_map(|record| match record {
                Recorded::Event(event) => Some(event),
                Recorded::DecodeError { .. } => None,
            })
            .collect()
    }

    /// Wire names of delivered events, e.g. `"RUN_STARTED"`.
    pub fn kinds(&self) -> Vec<&'static str> {
        self.events().iter().map(|e| e.kind().as_str()).collect()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.kinds().into_iter().filter(|k| *k == kind).count()
    }

    pub fn decode_errors(&self) -> usize {
        self.records()
            .iter()
            .filter(|record| matches!(record, Recorded::DecodeError { .. }))
            .count()
    }

    pub fn clear(&self) {
        self.records.lock().unwrap().clear();
    }
}

impl RunSubscriber for RecordingSubscriber {
    fn on_event(&mut self, event: &ProtocolEvent, _ctx: &EventContext<'_>) {
        self.records
            .lock()
            .unwrap()
            .push(Recorded::Event(event.clone()));
    }

    fn on_decode_error(&mut self, error: &DecodeError, payload: &str) {
        self.records.lock().unwrap().push(Recorded::DecodeError {
            message: error.to_string(),
            payload: payload.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_log_renders_frames() {
        let log = EventLog::new().run_started("r1").run_finished();
        let sse = log.to_sse();

        assert_eq!(log.len(), 2);
        assert_eq!(sse.matches("\n\n").count(), 2);
        assert!(sse.starts_with("data: {"));
        assert!(sse.ends_with("data: {\"type\":\"run-finished\"}\n\n"));
    }

    #[test]
    fn test_tool_call_expands_to_start_args_end() {
        let log = EventLog::new().tool_call("c1", "calc", &["{\"a\":", "1}"]);
        let types: Vec<&str> = log
            .events()
            .iter()
            .map(|e| e["type"].as_str().unwrap())
            .collect();
        assert_eq!(
            types,
            vec!["tool-call-start", "tool-call-args", "tool-call-args", "tool-call-end"]
        );
    }
}
