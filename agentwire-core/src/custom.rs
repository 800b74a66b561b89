//! Reserved custom event names.
//!
//! A few custom events carry conversation-level meaning and are handled
//! ahead of the generic fallback. The list is not assumed to be exhaustive:
//! any other name is classified as [`CustomSignal::Other`].

use std::collections::BTreeMap;

use serde_json::Value;

use crate::event::CustomEvent;
use crate::payload::Payload;

/// System instructions the run was started with.
pub const INSTRUCTIONS: &str = "instructions";

/// Files attached to the turn, keyed by filename.
pub const ATTACHMENTS: &str = "attachments";

/// Tool calls the server will only execute after a human decision.
pub const DEFERRED_TOOL_REQUESTS: &str = "deferred_tool_requests";

/// Conversation-state key that carries approval decisions on resumption.
pub const DEFERRED_TOOL_APPROVALS: &str = "deferred_tool_approvals";

/// One tool call awaiting approval.
#[derive(Debug, Clone, PartialEq)]
pub struct DeferredToolRequest {
    pub call_id: String,
    pub tool_name: String,
    pub args: Payload,
}

/// A custom event classified by its reserved name.
#[derive(Debug, Clone, PartialEq)]
pub enum CustomSignal {
    /// Text shown at the head of the visible history.
    Instructions(String),
    /// Attachments to merge into the conversation, filename → data URL.
    Attachments(BTreeMap<String, String>),
    /// Tool calls that need approval. May be empty.
    DeferredToolRequests(Vec<DeferredToolRequest>),
    /// Anything else, displayed generically.
    Other { name: String, value: Payload },
}

impl CustomSignal {
    /// Classify a custom event, in priority order instructions → attachments
    /// → deferred tool requests → other.
    pub fn classify(event: &CustomEvent) -> Self {
        match event.name.as_str() {
            INSTRUCTIONS => CustomSignal::Instructions(event.value.display()),
            ATTACHMENTS => CustomSignal::Attachments(attachments(&event.value)),
            DEFERRED_TOOL_REQUESTS => {
                CustomSignal::DeferredToolRequests(deferred_requests(&event.value))
            }
            _ => CustomSignal::Other {
                name: event.name.clone(),
                value: event.value.clone(),
            },
        }
    }
}

fn attachments(value: &Payload) -> BTreeMap<String, String> {
    let Some(object) = value.as_object() else {
        if !value.is_empty() {
            log::warn!("attachments payload is not an object; ignoring");
        }
        return BTreeMap::new();
    };

    object
        .iter()
        .filter_map(|(filename, data)| match data.as_str() {
            Some(data) => Some((filename.clone(), data.to_string())),
            None => {
                log::warn!("attachment {:?} has a non-string payload; ignoring", filename);
                None
            }
        })
        .collect()
}

fn deferred_requests(value: &Payload) -> Vec<DeferredToolRequest> {
    let Some(object) = value.as_object() else {
        if !value.is_empty() {
            log::warn!("deferred tool request payload is not an object; ignoring");
        }
        return Vec::new();
    };

    object
        .iter()
        .map(|(call_id, info)| DeferredToolRequest {
            call_id: call_id.clone(),
            tool_name: info
                .get("tool_name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            args: Payload::from_value(info.get("args").cloned().unwrap_or(Value::Null)),
        })
        .collect()
}
