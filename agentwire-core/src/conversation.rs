//! Conversation history and the visible transcript.
//!
//! [`Conversation::messages`] is the protocol history: finalized user and
//! assistant messages, sent back to the server with every run request.
//! [`Transcript`] is the ordered, visible history a presentation layer
//! renders. It also holds tool activity, notices and errors, and an entry
//! may be inserted at the head rather than appended.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::custom::DeferredToolRequest;
use crate::payload::Payload;

/// Author of a conversational turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One finalized conversational turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Assigned at creation and never changed.
    pub id: String,
    pub role: Role,
    pub content: String,
}

impl Message {
    /// A user message with a freshly generated ID.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role: Role::User,
            content: content.into(),
        }
    }

    /// An assistant message with a server-assigned ID.
    pub fn assistant(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// One item of the visible history.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    User {
        message_id: String,
        text: String,
    },
    /// Assistant text, open while `complete` is false.
    Assistant {
        message_id: Option<String>,
        text: String,
        complete: bool,
    },
    ToolCall {
        tool_call_id: String,
        name: String,
        args: String,
        complete: bool,
    },
    ToolResult {
        tool_call_id: String,
        content: Payload,
    },
    Instructions(String),
    Attachment {
        filename: String,
        data_url: String,
    },
    ApprovalRequest(Vec<DeferredToolRequest>),
    /// Generic display for custom events without reserved meaning.
    Notice {
        name: String,
        value: Payload,
    },
    Error(String),
}

/// Ordered visible history.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transcript {
    entries: VecDeque<Entry>,
}

impl Transcript {
    /// Append at the tail.
    pub fn push(&mut self, entry: Entry) {
        self.entries.push_back(entry);
    }

    /// Insert at the head.
    pub fn push_front(&mut self, entry: Entry) {
        self.entries.push_front(entry);
    }

    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&Entry> {
        self.entries.back()
    }

    /// The most recent assistant entry that has not been completed.
    pub(crate) fn open_assistant_mut(&mut self) -> Option<&mut Entry> {
        self.entries
            .iter_mut()
            .rev()
            .find(|entry| matches!(entry, Entry::Assistant { complete: false, .. }))
    }

    /// The most recent tool-call entry with the given ID.
    pub(crate) fn tool_call_mut(&mut self, id: &str) -> Option<&mut Entry> {
        self.entries.iter_mut().rev().find(
            |entry| matches!(entry, Entry::ToolCall { tool_call_id, .. } if tool_call_id == id),
        )
    }
}

/// Conversation state that persists across runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conversation {
    messages: Vec<Message>,
    attachments: BTreeMap<String, String>,
    deferred_tool_approvals: Option<BTreeMap<String, bool>>,
    transcript: Transcript,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Finalized messages in order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Find a finalized message by ID.
    pub fn message(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub(crate) fn push_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Attachments for the next run, filename → data URL.
    pub fn attachments(&self) -> &BTreeMap<String, String> {
        &self.attachments
    }

    /// Attach a file, replacing any previous attachment with the same name.
    pub fn add_attachment(&mut self, filename: impl Into<String>, data_url: impl Into<String>) {
        self.attachments.insert(filename.into(), data_url.into());
    }

    /// Remove an attachment, returning its data URL.
    pub fn remove_attachment(&mut self, filename: &str) -> Option<String> {
        self.attachments.remove(filename)
    }

    pub(crate) fn merge_attachments(&mut self, attachments: &BTreeMap<String, String>) {
        for (filename, data_url) in attachments {
            self.attachments.insert(filename.clone(), data_url.clone());
        }
    }

    pub(crate) fn clear_attachments(&mut self) {
        self.attachments.clear();
    }

    /// Approval decisions awaiting delivery on a resumption run.
    pub fn deferred_tool_approvals(&self) -> Option<&BTreeMap<String, bool>> {
        self.deferred_tool_approvals.as_ref()
    }

    pub(crate) fn set_deferred_tool_approvals(&mut self, approvals: BTreeMap<String, bool>) {
        self.deferred_tool_approvals = Some(approvals);
    }

    /// Drop the resumption payload.
    pub fn clear_deferred_tool_approvals(&mut self) {
        self.deferred_tool_approvals = None;
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub(crate) fn transcript_mut(&mut self) -> &mut Transcript {
        &mut self.transcript
    }
}
