//! The per-run state machine.
//!
//! A [`RunContext`] moves `Idle → Started → Streaming → Finished | Errored`.
//! It folds text and tool-call deltas into complete records, writes finalized
//! messages and transcript entries into the [`Conversation`], and owns the
//! lookup tables (tool calls, pending approvals) for exactly one run.
//!
//! Events that arrive in the wrong phase or reference unknown IDs are
//! protocol violations: they are logged at `warn` and ignored, and
//! [`RunContext::apply`] reports them as not accepted.

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

use crate::approval::ApprovalBarrier;
use crate::conversation::{Conversation, Entry, Message};
use crate::custom::CustomSignal;
use crate::event::{ProtocolEvent, RunError};
use crate::payload::Payload;
use crate::subscriber::{Interest, RunSubscriber};

/// Called once when a run finishes successfully.
pub type FinishCallback = Box<dyn FnOnce(&mut Conversation) + Send>;

/// Lifecycle phase of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Started,
    Streaming,
    Finished,
    Errored,
}

impl RunPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunPhase::Finished | RunPhase::Errored)
    }
}

/// One tool invocation within a run.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub parent_message_id: Option<String>,
    args: String,
    ended: bool,
    result: Option<Payload>,
}

impl ToolCall {
    fn new(id: String, name: String, parent_message_id: Option<String>) -> Self {
        Self {
            id,
            name,
            parent_message_id,
            args: String::new(),
            ended: false,
            result: None,
        }
    }

    /// Argument deltas concatenated in arrival order.
    pub fn args(&self) -> &str {
        &self.args
    }

    /// The arguments parsed as JSON, once they form a complete document.
    pub fn parsed_args(&self) -> Option<Value> {
        serde_json::from_str(&self.args).ok()
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    pub fn result(&self) -> Option<&Payload> {
        self.result.as_ref()
    }
}

/// The assistant message currently receiving deltas.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveMessage {
    pub message_id: Option<String>,
    pub content: String,
    // The last delta ended in `\r`, so a leading `\n` completes that break.
    pending_cr: bool,
}

impl ActiveMessage {
    fn new(message_id: Option<String>) -> Self {
        Self {
            message_id,
            content: String::new(),
            pending_cr: false,
        }
    }

    /// Normalize a delta, treating a `\r\n` split across deltas as one break.
    fn normalize_delta(&mut self, delta: &str) -> String {
        let mut delta = delta;
        if self.pending_cr && !delta.is_empty() {
            self.pending_cr = false;
            delta = delta.strip_prefix('\n').unwrap_or(delta);
        }
        if delta.ends_with('\r') {
            self.pending_cr = true;
        }
        normalize_line_breaks(delta)
    }
}

/// Per-run configuration supplied when a run begins.
#[derive(Default)]
pub struct RunOptions {
    pub(crate) label: String,
    pub(crate) interest: Interest,
    pub(crate) subscriber: Option<Box<dyn RunSubscriber>>,
    pub(crate) on_finished: Option<FinishCallback>,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Suffix appended to lifecycle log lines, e.g. `" (with approvals)"`.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Restrict which handlers run for this run.
    pub fn interest(mut self, interest: Interest) -> Self {
        self.interest = interest;
        self
    }

    /// A subscriber that only lives for this run.
    pub fn subscriber(mut self, subscriber: impl RunSubscriber + 'static) -> Self {
        self.subscriber = Some(Box::new(subscriber));
        self
    }

    /// Invoked once when the run finishes successfully.
    pub fn on_finished(mut self, callback: impl FnOnce(&mut Conversation) + Send + 'static) -> Self {
        self.on_finished = Some(Box::new(callback));
        self
    }

    /// Options for the follow-up run that delivers approval decisions.
    ///
    /// The decisions are removed from conversation state once it finishes.
    pub fn resumption() -> Self {
        Self::new()
            .label(" (with approvals)")
            .on_finished(Conversation::clear_deferred_tool_approvals)
    }
}

impl fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunOptions")
            .field("label", &self.label)
            .field("interest", &self.interest)
            .field("subscriber", &self.subscriber.is_some())
            .field("on_finished", &self.on_finished.is_some())
            .finish()
    }
}

/// Ephemeral state of one streaming turn.
pub struct RunContext {
    run_id: String,
    label: String,
    phase: RunPhase,
    interest: Interest,
    active_message: Option<ActiveMessage>,
    tool_calls: HashMap<String, ToolCall>,
    tool_call_order: Vec<String>,
    current_tool_call: Option<String>,
    approvals: Option<ApprovalBarrier>,
    error: Option<String>,
    on_finished: Option<FinishCallback>,
}

impl RunContext {
    /// A fresh run in the `Idle` phase.
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            label: String::new(),
            phase: RunPhase::Idle,
            interest: Interest::default(),
            active_message: None,
            tool_calls: HashMap::new(),
            tool_call_order: Vec::new(),
            current_tool_call: None,
            approvals: None,
            error: None,
            on_finished: None,
        }
    }

    /// Apply the per-run parts of `options`. The subscriber is not kept here.
    pub(crate) fn configure(
        &mut self,
        label: String,
        interest: Interest,
        on_finished: Option<FinishCallback>,
    ) {
        self.label = label;
        self.interest = interest;
        self.on_finished = on_finished;
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn interest(&self) -> Interest {
        self.interest
    }

    pub fn active_message(&self) -> Option<&ActiveMessage> {
        self.active_message.as_ref()
    }

    pub fn tool_call(&self, id: &str) -> Option<&ToolCall> {
        self.tool_calls.get(id)
    }

    /// Tool calls opened during this run, in the order they started.
    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolCall> {
        self.tool_call_order
            .iter()
            .filter_map(|id| self.tool_calls.get(id))
    }

    /// The call whose arguments are currently streaming.
    pub fn current_tool_call(&self) -> Option<&ToolCall> {
        self.current_tool_call
            .as_deref()
            .and_then(|id| self.tool_calls.get(id))
    }

    pub fn approvals(&self) -> Option<&ApprovalBarrier> {
        self.approvals.as_ref()
    }

    pub(crate) fn approvals_mut(&mut self) -> Option<&mut ApprovalBarrier> {
        self.approvals.as_mut()
    }

    /// Decisions are still outstanding.
    pub fn awaiting_approval(&self) -> bool {
        self.approvals
            .as_ref()
            .is_some_and(|barrier| !barrier.is_released())
    }

    /// The error message, once the run has errored.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Apply one event, mutating `conversation` as needed.
    ///
    /// Returns `false` when the event was ignored as a protocol violation.
    pub fn apply(&mut self, event: &ProtocolEvent, conversation: &mut Conversation) -> bool {
        if let ProtocolEvent::RunError(error) = event {
            return self.error_run(error, conversation);
        }

        match (self.phase, event) {
            (RunPhase::Idle, ProtocolEvent::RunStarted(started)) => {
                if let Some(run_id) = &started.run_id {
                    if *run_id != self.run_id {
                        log::debug!("Server assigned run ID {} (was {})", run_id, self.run_id);
                        self.run_id = run_id.clone();
                    }
                }
                self.reset_tables();
                self.phase = RunPhase::Started;
                log::info!("Run started{}", self.label);
                return true;
            }
            (phase, _) if phase.is_terminal() => {
                log::warn!(
                    "Ignoring {} after the run ended{}",
                    event.kind(),
                    self.label
                );
                return false;
            }
            (RunPhase::Idle, _) => {
                log::warn!("Ignoring {} before run-started{}", event.kind(), self.label);
                return false;
            }
            (_, ProtocolEvent::RunStarted(_)) => {
                log::warn!("Ignoring run-started while a run is active{}", self.label);
                return false;
            }
            _ => {}
        }

        let accepted = match event {
            ProtocolEvent::RunFinished(_) => {
                self.finish_run(conversation);
                return true;
            }
            ProtocolEvent::TextMessageStart(start) => {
                if self.active_message.is_some() {
                    log::warn!("Ignoring text-message-start while a message is open");
                    false
                } else {
                    log::debug!("Starting assistant message");
                    self.active_message = Some(ActiveMessage::new(start.message_id.clone()));
                    conversation.transcript_mut().push(Entry::Assistant {
                        message_id: start.message_id.clone(),
                        text: String::new(),
                        complete: false,
                    });
                    true
                }
            }
            ProtocolEvent::TextMessageContent(content) => {
                match self.active_message.as_mut() {
                    Some(active) => {
                        let delta = active.normalize_delta(&content.delta);
                        active.content.push_str(&delta);
                        if let Some(Entry::Assistant { text, .. }) =
                            conversation.transcript_mut().open_assistant_mut()
                        {
                            text.push_str(&delta);
                        }
                        true
                    }
                    None => {
                        log::warn!("Ignoring text delta without an open message");
                        false
                    }
                }
            }
            ProtocolEvent::TextMessageEnd(end) => match self.active_message.take() {
                Some(active) => {
                    let id = end
                        .message_id
                        .clone()
                        .or(active.message_id)
                        .unwrap_or_else(|| {
                            let id = fallback_message_id(conversation);
                            log::warn!("text-message-end without a message ID; using {}", id);
                            id
                        });
                    close_assistant_entry(conversation, &id);
                    conversation.push_message(Message::assistant(id, active.content));
                    log::debug!("Message ended");
                    true
                }
                None => {
                    log::warn!("Ignoring text-message-end without an open message");
                    false
                }
            },
            ProtocolEvent::ToolCallStart(start) => {
                if self.tool_calls.contains_key(&start.tool_call_id) {
                    log::warn!("Ignoring duplicate start for tool call {}", start.tool_call_id);
                    false
                } else {
                    log::debug!("Tool call started: {}", start.tool_call_name);
                    let call = ToolCall::new(
                        start.tool_call_id.clone(),
                        start.tool_call_name.clone(),
                        start.parent_message_id.clone(),
                    );
                    conversation.transcript_mut().push(Entry::ToolCall {
                        tool_call_id: call.id.clone(),
                        name: call.name.clone(),
                        args: String::new(),
                        complete: false,
                    });
                    self.tool_call_order.push(call.id.clone());
                    self.current_tool_call = Some(call.id.clone());
                    self.tool_calls.insert(call.id.clone(), call);
                    true
                }
            }
            ProtocolEvent::ToolCallArgs(args) => match self.tool_calls.get_mut(&args.tool_call_id) {
                Some(call) if !call.ended => {
                    call.args.push_str(&args.delta);
                    if let Some(Entry::ToolCall { args: shown, .. }) =
                        conversation.transcript_mut().tool_call_mut(&call.id)
                    {
                        shown.push_str(&args.delta);
                    }
                    true
                }
                Some(_) => {
                    log::warn!("Ignoring args for ended tool call {}", args.tool_call_id);
                    false
                }
                None => {
                    log::warn!("Ignoring args for unknown tool call {}", args.tool_call_id);
                    false
                }
            },
            ProtocolEvent::ToolCallEnd(end) => match self.tool_calls.get_mut(&end.tool_call_id) {
                Some(call) if !call.ended => {
                    call.ended = true;
                    if let Some(Entry::ToolCall { complete, .. }) =
                        conversation.transcript_mut().tool_call_mut(&call.id)
                    {
                        *complete = true;
                    }
                    if self.current_tool_call.as_deref() == Some(end.tool_call_id.as_str()) {
                        self.current_tool_call = None;
                    }
                    log::debug!("Tool call ended: {}", end.tool_call_id);
                    true
                }
                Some(_) => {
                    log::warn!("Ignoring repeated end for tool call {}", end.tool_call_id);
                    false
                }
                None => {
                    log::warn!("Ignoring end for unknown tool call {}", end.tool_call_id);
                    false
                }
            },
            ProtocolEvent::ToolCallResult(result) => {
                // Results for calls from an earlier run (deferred tools) are
                // rendered even though the lookup table no longer has them.
                match self.tool_calls.get_mut(&result.tool_call_id) {
                    Some(call) if call.result.is_some() => {
                        log::warn!("Ignoring second result for tool call {}", call.id);
                        false
                    }
                    Some(call) => {
                        call.result = Some(result.content.clone());
                        push_result(conversation, &result.tool_call_id, &result.content);
                        true
                    }
                    None => {
                        push_result(conversation, &result.tool_call_id, &result.content);
                        true
                    }
                }
            }
            ProtocolEvent::StepStarted(step) => {
                log::debug!("Step started: {}", step.step_name.as_deref().unwrap_or("-"));
                true
            }
            ProtocolEvent::StepFinished(_) => {
                log::debug!("Step finished");
                true
            }
            ProtocolEvent::Custom(custom) => self.apply_custom(CustomSignal::classify(custom), conversation),
            ProtocolEvent::RunStarted(_) | ProtocolEvent::RunError(_) => false,
        };

        if accepted && self.phase == RunPhase::Started {
            self.phase = RunPhase::Streaming;
        }
        accepted
    }

    fn apply_custom(&mut self, signal: CustomSignal, conversation: &mut Conversation) -> bool {
        match signal {
            CustomSignal::Instructions(text) => {
                conversation
                    .transcript_mut()
                    .push_front(Entry::Instructions(text));
            }
            CustomSignal::Attachments(attachments) => {
                conversation.merge_attachments(&attachments);
                for (filename, data_url) in attachments {
                    conversation
                        .transcript_mut()
                        .push(Entry::Attachment { filename, data_url });
                }
            }
            CustomSignal::DeferredToolRequests(requests) => {
                if self.awaiting_approval() {
                    log::warn!("Ignoring deferred tool requests while approvals are pending");
                    return false;
                }
                match ApprovalBarrier::new(requests.clone()) {
                    Some(barrier) => {
                        log::info!(
                            "{} tool call(s) awaiting approval{}",
                            barrier.total_expected(),
                            self.label
                        );
                        conversation
                            .transcript_mut()
                            .push(Entry::ApprovalRequest(requests));
                        self.approvals = Some(barrier);
                    }
                    None => log::debug!("Empty deferred tool request; nothing to approve"),
                }
            }
            CustomSignal::Other { name, value } => {
                log::debug!("Custom event: {}", name);
                conversation
                    .transcript_mut()
                    .push(Entry::Notice { name, value });
            }
        }
        true
    }

    fn finish_run(&mut self, conversation: &mut Conversation) {
        if let Some(active) = self.active_message.take() {
            let id = active
                .message_id
                .unwrap_or_else(|| fallback_message_id(conversation));
            log::warn!("Run finished with message {} still open; closing it", id);
            close_assistant_entry(conversation, &id);
            conversation.push_message(Message::assistant(id, active.content));
        }
        self.current_tool_call = None;
        self.phase = RunPhase::Finished;
        conversation.clear_attachments();
        if let Some(callback) = self.on_finished.take() {
            callback(conversation);
        }
        log::info!("Run finished{}", self.label);
    }

    fn error_run(&mut self, error: &RunError, conversation: &mut Conversation) -> bool {
        if self.phase.is_terminal() {
            log::warn!("Ignoring run-error after the run ended{}", self.label);
            return false;
        }

        let message = error.display_message().to_string();
        log::error!("Run error{}: {}", self.label, message);
        conversation
            .transcript_mut()
            .push(Entry::Error(format!("Agent error: {}", message)));
        self.active_message = None;
        self.current_tool_call = None;
        self.approvals = None;
        self.error = Some(message);
        self.phase = RunPhase::Errored;
        true
    }

    fn reset_tables(&mut self) {
        self.active_message = None;
        self.tool_calls.clear();
        self.tool_call_order.clear();
        self.current_tool_call = None;
        self.approvals = None;
    }
}

impl fmt::Debug for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("run_id", &self.run_id)
            .field("phase", &self.phase)
            .field("active_message", &self.active_message)
            .field("tool_calls", &self.tool_call_order)
            .field("approvals", &self.approvals)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

fn push_result(conversation: &mut Conversation, id: &str, content: &Payload) {
    log::debug!("Tool call result: {}", id);
    conversation.transcript_mut().push(Entry::ToolResult {
        tool_call_id: id.to_string(),
        content: content.clone(),
    });
}

/// Position-derived ID for a message the server sent without one, so that
/// replaying a log yields the same conversation.
fn fallback_message_id(conversation: &Conversation) -> String {
    format!("message-{}", conversation.messages().len() + 1)
}

fn close_assistant_entry(conversation: &mut Conversation, id: &str) {
    if let Some(Entry::Assistant {
        message_id,
        complete,
        ..
    }) = conversation.transcript_mut().open_assistant_mut()
    {
        *message_id = Some(id.to_string());
        *complete = true;
    }
}

/// Normalize `\r\n` and lone `\r` to `\n`.
pub fn normalize_line_breaks(text: &str) -> String {
    if !text.contains('\r') {
        return text.to_string();
    }
    text.replace("\r\n", "\n").replace('\r', "\n")
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
