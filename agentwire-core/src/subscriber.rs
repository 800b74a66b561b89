//! Subscriber dispatch.
//!
//! A [`RunSubscriber`] has one handler per event kind, all no-ops by default.
//! Dispatch is synchronous: every handler runs to completion, in
//! registration order, before the next frame is processed. Handlers see the
//! state after the event has been applied.

use std::fmt;

use crate::conversation::Conversation;
use crate::error::DecodeError;
use crate::event::{
    CustomEvent, EventKind, ProtocolEvent, RunError, RunFinished, RunStarted, StepFinished,
    StepStarted, TextMessageContent, TextMessageEnd, TextMessageStart, ToolCallArgs, ToolCallEnd,
    ToolCallResult, ToolCallStart,
};
use crate::run::RunContext;

/// State visible to a handler.
#[derive(Debug, Clone, Copy)]
pub struct EventContext<'a> {
    pub conversation: &'a Conversation,
    pub run: &'a RunContext,
}

/// Which optional handler groups a subscriber receives.
///
/// Lifecycle and text events are always delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interest {
    /// Tool-call and step events.
    pub tool_calls: bool,
    pub custom_events: bool,
}

impl Interest {
    pub const ALL: Interest = Interest {
        tool_calls: true,
        custom_events: true,
    };

    pub fn without_tool_calls(mut self) -> Self {
        self.tool_calls = false;
        self
    }

    pub fn without_custom_events(mut self) -> Self {
        self.custom_events = false;
        self
    }

    /// Whether events of `kind` are delivered.
    pub fn includes(self, kind: EventKind) -> bool {
        if kind.is_tool_activity() {
            self.tool_calls
        } else if kind == EventKind::Custom {
            self.custom_events
        } else {
            true
        }
    }

    /// Both interests must include a group for it to be delivered.
    pub fn intersect(self, other: Interest) -> Interest {
        Interest {
            tool_calls: self.tool_calls && other.tool_calls,
            custom_events: self.custom_events && other.custom_events,
        }
    }
}

impl Default for Interest {
    fn default() -> Self {
        Self::ALL
    }
}

/// Receives run events.
///
/// Implement the handlers you need. Overriding [`on_event`](Self::on_event)
/// replaces the per-kind routing entirely; closures implement it directly:
///
/// ```
/// use agentwire_core::{ProtocolEvent, Session};
///
/// let mut session = Session::new();
/// session.subscribe(|event: &ProtocolEvent, _: &agentwire_core::EventContext<'_>| {
///     println!("{}", event.kind());
/// });
/// ```
#[allow(unused_variables)]
pub trait RunSubscriber: Send {
    /// Entry point for every delivered event.
    fn on_event(&mut self, event: &ProtocolEvent, ctx: &EventContext<'_>) {
        dispatch(self, event, ctx)
    }

    fn on_run_started(&mut self, event: &RunStarted, ctx: &EventContext<'_>) {}
    fn on_text_message_start(&mut self, event: &TextMessageStart, ctx: &EventContext<'_>) {}
    fn on_text_message_content(&mut self, event: &TextMessageContent, ctx: &EventContext<'_>) {}
    fn on_text_message_end(&mut self, event: &TextMessageEnd, ctx: &EventContext<'_>) {}
    fn on_tool_call_start(&mut self, event: &ToolCallStart, ctx: &EventContext<'_>) {}
    fn on_tool_call_args(&mut self, event: &ToolCallArgs, ctx: &EventContext<'_>) {}
    fn on_tool_call_end(&mut self, event: &ToolCallEnd, ctx: &EventContext<'_>) {}
    fn on_tool_call_result(&mut self, event: &ToolCallResult, ctx: &EventContext<'_>) {}
    fn on_step_started(&mut self, event: &StepStarted, ctx: &EventContext<'_>) {}
    fn on_step_finished(&mut self, event: &StepFinished, ctx: &EventContext<'_>) {}
    fn on_run_finished(&mut self, event: &RunFinished, ctx: &EventContext<'_>) {}
    fn on_run_error(&mut self, event: &RunError, ctx: &EventContext<'_>) {}
    fn on_custom(&mut self, event: &CustomEvent, ctx: &EventContext<'_>) {}

    /// A frame was dropped because it could not be decoded.
    fn on_decode_error(&mut self, error: &DecodeError, payload: &str) {}
}

/// Route an event to the matching per-kind handler.
pub fn dispatch<S>(subscriber: &mut S, event: &ProtocolEvent, ctx: &EventContext<'_>)
where
    S: RunSubscriber + ?Sized,
{
    match event {
        ProtocolEvent::RunStarted(e) => subscriber.on_run_started(e, ctx),
        ProtocolEvent::TextMessageStart(e) => subscriber.on_text_message_start(e, ctx),
        ProtocolEvent::TextMessageContent(e) => subscriber.on_text_message_content(e, ctx),
        ProtocolEvent::TextMessageEnd(e) => subscriber.on_text_message_end(e, ctx),
        ProtocolEvent::ToolCallStart(e) => subscriber.on_tool_call_start(e, ctx),
        ProtocolEvent::ToolCallArgs(e) => subscriber.on_tool_call_args(e, ctx),
        ProtocolEvent::ToolCallEnd(e) => subscriber.on_tool_call_end(e, ctx),
        ProtocolEvent::ToolCallResult(e) => subscriber.on_tool_call_result(e, ctx),
        ProtocolEvent::StepStarted(e) => subscriber.on_step_started(e, ctx),
        ProtocolEvent::StepFinished(e) => subscriber.on_step_finished(e, ctx),
        ProtocolEvent::RunFinished(e) => subscriber.on_run_finished(e, ctx),
        ProtocolEvent::RunError(e) => subscriber.on_run_error(e, ctx),
        ProtocolEvent::Custom(e) => subscriber.on_custom(e, ctx),
    }
}

/// Blanket implementation for closures
impl<F> RunSubscriber for F
where
    F: FnMut(&ProtocolEvent, &EventContext<'_>) + Send,
{
    fn on_event(&mut self, event: &ProtocolEvent, ctx: &EventContext<'_>) {
        self(event, ctx)
    }
}

/// Identifies a persistent subscription.
///
/// Used to remove subscribers via [`crate::Session::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(pub(crate) u64);

struct Registration {
    id: SubscriberId,
    interest: Interest,
    subscriber: Box<dyn RunSubscriber>,
}

/// Persistent subscribers plus at most one transient, per-run subscriber.
#[derive(Default)]
pub struct SubscriberRegistry {
    next_id: u64,
    persistent: Vec<Registration>,
    transient: Option<Box<dyn RunSubscriber>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, subscriber: Box<dyn RunSubscriber>, interest: Interest) -> SubscriberId {
        let id = SubscriberId(self.next_id);
        self.next_id += 1;
        self.persistent.push(Registration {
            id,
            interest,
            subscriber,
        });
        id
    }

    /// Returns `true` if a subscriber was removed.
    pub fn remove(&mut self, id: SubscriberId) -> bool {
        let before = self.persistent.len();
        self.persistent.retain(|registration| registration.id != id);
        self.persistent.len() != before
    }

    /// Replace the transient subscriber for the next run.
    pub fn set_transient(&mut self, subscriber: Option<Box<dyn RunSubscriber>>) {
        self.transient = subscriber;
    }

    pub fn clear_transient(&mut self) {
        self.transient = None;
    }

    pub fn len(&self) -> usize {
        self.persistent.len() + usize::from(self.transient.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `event`: persistent subscribers first, then the transient one.
    ///
    /// `interest` is the run's filter and is combined with each
    /// subscriber's own.
    pub fn dispatch(&mut self, event: &ProtocolEvent, ctx: &EventContext<'_>, interest: Interest) {
        let kind = event.kind();
        for registration in &mut self.persistent {
            if registration.interest.intersect(interest).includes(kind) {
                registration.subscriber.on_event(event, ctx);
            }
        }
        if interest.includes(kind) {
            if let Some(subscriber) = self.transient.as_mut() {
                subscriber.on_event(event, ctx);
            }
        }
    }

    pub fn decode_error(&mut self, error: &DecodeError, payload: &str) {
        for registration in &mut self.persistent {
            registration.subscriber.on_decode_error(error, payload);
        }
        if let Some(subscriber) = self.transient.as_mut() {
            subscriber.on_decode_error(error, payload);
        }
    }
}

impl fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberRegistry")
            .field("persistent", &self.persistent.len())
            .field("transient", &self.transient.is_some())
            .finish()
    }
}
