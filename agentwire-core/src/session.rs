//! The session: one conversation and the run currently streaming into it.
//!
//! A [`Session`] wires the pipeline together. Bytes go through the
//! [`FrameReader`], each frame through [`decode`], each event through the
//! [`RunContext`] and then out to subscribers. It holds no global state, so
//! any number of sessions can live in one process.

use std::collections::BTreeMap;
use std::fmt;

use futures::{Stream, StreamExt};
use serde::Serialize;
use serde_json::Value;

use crate::conversation::{Conversation, Entry, Message};
use crate::custom::DeferredToolRequest;
use crate::error::SessionError;
use crate::event::{decode, ProtocolEvent, RunError};
use crate::frame::FrameReader;
use crate::run::{RunContext, RunOptions, RunPhase};
use crate::subscriber::{EventContext, Interest, RunSubscriber, SubscriberId, SubscriberRegistry};

/// What a consumer may do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// A message can be submitted.
    Ready,
    /// A run is streaming.
    Processing,
    /// Deferred tool calls need decisions.
    AwaitingApproval,
}

/// How the last run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Finished,
    /// Finished, but these tool calls still need decisions.
    AwaitingApproval { requests: Vec<DeferredToolRequest> },
    Errored { message: String },
}

/// Conversation-scoped state sent with a run request.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunState {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub attachments: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deferred_tool_approvals: Option<BTreeMap<String, bool>>,
}

/// Body of a run request (AG-UI `RunAgentInput`).
///
/// The presence of `state.deferred_tool_approvals` tells the server to
/// resume instead of starting a new turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub thread_id: String,
    pub run_id: String,
    pub messages: Vec<Message>,
    pub state: RunState,
    pub tools: Vec<Value>,
    pub context: Vec<Value>,
    pub forwarded_props: Value,
}

impl RunRequest {
    /// Whether this request resumes a run after approvals.
    pub fn is_resumption(&self) -> bool {
        self.state.deferred_tool_approvals.is_some()
    }
}

/// An explicit protocol session.
pub struct Session {
    thread_id: String,
    conversation: Conversation,
    reader: FrameReader,
    run: Option<RunContext>,
    // Bumped every time a run begins.
    generation: u64,
    subscribers: SubscriberRegistry,
}

impl Session {
    /// A session with a generated thread ID.
    pub fn new() -> Self {
        Self::with_thread_id(uuid::Uuid::new_v4().to_string())
    }

    pub fn with_thread_id(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            conversation: Conversation::new(),
            reader: FrameReader::new(),
            run: None,
            generation: 0,
            subscribers: SubscriberRegistry::new(),
        }
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// The current run, or the last one if it has ended.
    pub fn run(&self) -> Option<&RunContext> {
        self.run.as_ref()
    }

    /// Register a persistent subscriber for every handler group.
    pub fn subscribe(&mut self, subscriber: impl RunSubscriber + 'static) -> SubscriberId {
        self.subscribe_with(subscriber, Interest::ALL)
    }

    /// Register a persistent subscriber for some handler groups.
    pub fn subscribe_with(
        &mut self,
        subscriber: impl RunSubscriber + 'static,
        interest: Interest,
    ) -> SubscriberId {
        self.subscribers.add(Box::new(subscriber), interest)
    }

    /// Returns `true` if the subscriber was registered.
    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        self.subscribers.remove(id)
    }

    pub fn add_attachment(&mut self, filename: impl Into<String>, data_url: impl Into<String>) {
        self.conversation.add_attachment(filename, data_url);
    }

    pub fn remove_attachment(&mut self, filename: &str) -> Option<String> {
        self.conversation.remove_attachment(filename)
    }

    /// Whether a run is active and has not reached a terminal phase.
    pub fn is_processing(&self) -> bool {
        self.run
            .as_ref()
            .is_some_and(|run| !run.phase().is_terminal())
    }

    pub fn status(&self) -> SessionStatus {
        match &self.run {
            Some(run) if !run.phase().is_terminal() => SessionStatus::Processing,
            Some(run) if run.awaiting_approval() => SessionStatus::AwaitingApproval,
            _ => SessionStatus::Ready,
        }
    }

    /// How the last run ended, if it has.
    pub fn outcome(&self) -> Option<RunOutcome> {
        let run = self.run.as_ref()?;
        match run.phase() {
            RunPhase::Finished => Some(match run.approvals() {
                Some(barrier) if !barrier.is_released() => RunOutcome::AwaitingApproval {
                    requests: barrier.pending(),
                },
                _ => RunOutcome::Finished,
            }),
            RunPhase::Errored => Some(RunOutcome::Errored {
                message: run.error().unwrap_or_default().to_string(),
            }),
            _ => None,
        }
    }

    /// Submit a user message and start a run.
    pub fn submit(&mut self, text: &str) -> Result<RunRequest, SessionError> {
        self.submit_with(text, RunOptions::default())
    }

    /// Submit a user message and start a run with per-run options.
    pub fn submit_with(&mut self, text: &str, options: RunOptions) -> Result<RunRequest, SessionError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::EmptyMessage);
        }
        self.ensure_idle()?;

        if self.conversation.deferred_tool_approvals().is_some() {
            log::debug!("Dropping undelivered approval decisions before a new turn");
            self.conversation.clear_deferred_tool_approvals();
        }

        let message = Message::user(text);
        self.conversation.transcript_mut().push(Entry::User {
            message_id: message.id.clone(),
            text: message.content.clone(),
        });
        self.conversation.push_message(message);

        Ok(self.begin_run(options))
    }

    /// Record a human decision for a deferred tool call.
    ///
    /// Returns the resumption request once every pending call has a
    /// decision. The resumption run has already begun at that point.
    pub fn record_approval(
        &mut self,
        call_id: &str,
        approved: bool,
    ) -> Result<Option<RunRequest>, SessionError> {
        let run = self.run.as_mut().ok_or(SessionError::NoPendingApproval)?;
        if !run.phase().is_terminal() {
            return Err(SessionError::RunInProgress);
        }
        let barrier = run.approvals_mut().ok_or(SessionError::NoPendingApproval)?;

        let Some(snapshot) = barrier.record(call_id, approved)? else {
            return Ok(None);
        };

        log::info!("All tools processed, approvals: {:?}", snapshot);
        self.conversation.set_deferred_tool_approvals(snapshot);
        Ok(Some(self.begin_run(RunOptions::resumption())))
    }

    /// Process a chunk of bytes from the transport.
    pub fn feed(&mut self, bytes: &[u8]) {
        for frame in self.reader.push(bytes) {
            self.process_payload(&frame.data);
        }
    }

    /// Process one frame payload (the text after `data: `).
    pub fn process_payload(&mut self, payload: &str) {
        match decode(payload) {
            Ok(event) => {
                self.apply(event);
            }
            Err(err) => {
                log::warn!("Dropping undecodable frame: {}", err);
                self.subscribers.decode_error(&err, payload);
            }
        }
    }

    /// Apply an already-decoded event.
    ///
    /// A `run-started` with no active run opens a run implicitly, so
    /// server-pushed runs and captured logs can be applied directly.
    /// Returns `false` if the event was ignored.
    pub fn apply(&mut self, event: ProtocolEvent) -> bool {
        if matches!(event, ProtocolEvent::RunStarted(_)) && !self.is_processing() {
            if self.status() == SessionStatus::AwaitingApproval {
                log::warn!("Ignoring run-started while approvals are pending");
                return false;
            }
            self.begin_run(RunOptions::default());
        }

        let Some(run) = self.run.as_mut() else {
            log::warn!("Ignoring {} with no active run", event.kind());
            return false;
        };

        if !run.apply(&event, &mut self.conversation) {
            return false;
        }

        let ctx = EventContext {
            conversation: &self.conversation,
            run,
        };
        self.subscribers.dispatch(&event, &ctx, run.interest());

        if event.is_terminal() {
            self.subscribers.clear_transient();
        }
        true
    }

    /// The transport reached end of stream.
    ///
    /// A partial trailing frame is discarded. A run that has not reached a
    /// terminal phase errors implicitly.
    pub fn end_of_stream(&mut self) {
        self.reader.finish();
        if self.is_processing() {
            self.apply(ProtocolEvent::RunError(RunError::local(
                "connection closed before the run finished",
                "stream_closed",
            )));
        }
    }

    /// Surface a transport failure (connection drop, non-2xx response).
    pub fn fail_transport(&mut self, message: impl Into<String>) {
        self.terminate(message.into(), "transport");
    }

    /// The consumer closed the connection.
    pub fn cancel(&mut self) {
        self.terminate("run cancelled".to_string(), "cancelled");
    }

    /// Drive the session from a byte stream until the run ends or the
    /// stream is exhausted.
    ///
    /// A stream error or an early close becomes a run error, so this always
    /// yields an outcome.
    ///
    /// ```
    /// use agentwire_core::{RunOutcome, Session};
    ///
    /// # tokio_test::block_on(async {
    /// let mut session = Session::new();
    /// session.submit("hi").unwrap();
    ///
    /// let body = b"data: {\"type\":\"run-started\"}\n\ndata: {\"type\":\"run-finished\"}\n\n";
    /// let chunks = vec![Ok::<_, std::io::Error>(body.to_vec())];
    /// let outcome = session.drive(futures::stream::iter(chunks)).await;
    /// assert_eq!(outcome, RunOutcome::Finished);
    /// # });
    /// ```
    pub async fn drive<S, B, E>(&mut self, stream: S) -> RunOutcome
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: fmt::Display,
    {
        let generation = self.generation;
        let was_processing = self.is_processing();
        // A run that was open on entry, or one the stream opened.
        let owns_run = |session: &Self| was_processing || session.generation != generation;

        futures::pin_mut!(stream);
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(bytes) => self.feed(bytes.as_ref()),
                Err(err) => {
                    self.fail_transport(format!("stream error: {}", err));
                    break;
                }
            }
            if owns_run(self) && !self.is_processing() {
                break;
            }
        }
        self.end_of_stream();

        let no_run = || RunOutcome::Errored {
            message: "stream ended without a run".to_string(),
        };
        if !owns_run(self) {
            return no_run();
        }
        self.outcome().unwrap_or_else(no_run)
    }

    fn terminate(&mut self, message: String, code: &str) {
        self.reader.reset();
        if self.is_processing() {
            self.apply(ProtocolEvent::RunError(RunError::local(message, code)));
        } else {
            log::debug!("No active run to terminate ({})", message);
        }
    }

    fn ensure_idle(&self) -> Result<(), SessionError> {
        match &self.run {
            Some(run) if !run.phase().is_terminal() => Err(SessionError::RunInProgress),
            Some(run) if run.awaiting_approval() => Err(SessionError::ApprovalPending(
                run.approvals().map_or(0, |barrier| barrier.remaining()),
            )),
            _ => Ok(()),
        }
    }

    fn begin_run(&mut self, options: RunOptions) -> RunRequest {
        let RunOptions {
            label,
            interest,
            subscriber,
            on_finished,
        } = options;

        self.reader.reset();
        self.generation += 1;
        let mut run = RunContext::new(uuid::Uuid::new_v4().to_string());
        run.configure(label, interest, on_finished);
        self.subscribers.set_transient(subscriber);

        let request = RunRequest {
            thread_id: self.thread_id.clone(),
            run_id: run.run_id().to_string(),
            messages: self.conversation.messages().to_vec(),
            state: RunState {
                attachments: self.conversation.attachments().clone(),
                deferred_tool_approvals: self.conversation.deferred_tool_approvals().cloned(),
            },
            tools: Vec::new(),
            context: Vec::new(),
            forwarded_props: Value::Object(Default::default()),
        };

        log::debug!("Beginning run {}{}", run.run_id(), run.label());
        self.run = Some(run);
        request
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("thread_id", &self.thread_id)
            .field("conversation", &self.conversation)
            .field("run", &self.run)
            .field("subscribers", &self.subscribers)
            .finish()
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
