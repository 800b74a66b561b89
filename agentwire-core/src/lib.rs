//! # agentwire-core
//!
//! A streaming AG-UI protocol engine for agent runs.
//!
//! An agent run arrives as a server-pushed `text/event-stream`: text deltas,
//! tool calls with streamed arguments, custom signals and approval gates.
//! This crate turns those bytes into a consistent conversation:
//!
//! - [`frame`] reassembles `data: ` frames from arbitrarily split chunks
//! - [`event`] decodes each frame into a typed [`ProtocolEvent`]
//! - [`run`] folds deltas into messages and tool calls for one run
//! - [`approval`] gates resumption until every deferred tool call is decided
//! - [`subscriber`] delivers events to handlers, in order, synchronously
//!
//! [`Session`] ties them together. It performs no I/O: a transport feeds it
//! bytes and sends the [`RunRequest`]s it produces.
//!
//! ## Quick Start
//!
//! ```
//! use agentwire_core::{RunOutcome, Session};
//!
//! let mut session = Session::new();
//! let request = session.submit("Hello").unwrap();
//! assert_eq!(request.messages.len(), 1);
//!
//! // Bytes from the transport, in whatever chunks they arrive.
//! session.feed(b"data: {\"type\":\"run-started\"}\n\ndata: {\"type\":\"text-mess");
//! session.feed(b"age-start\"}\n\ndata: {\"type\":\"text-message-content\",\"delta\":\"Hi\"}\n\n");
//! session.feed(b"data: {\"type\":\"text-message-end\",\"messageId\":\"m1\"}\n\n");
//! session.feed(b"data: {\"type\":\"run-finished\"}\n\n");
//!
//! assert_eq!(session.outcome(), Some(RunOutcome::Finished));
//! assert_eq!(session.conversation().messages()[1].content, "Hi");
//! ```
//!
//! ## Approvals
//!
//! A `deferred_tool_requests` custom event leaves the run awaiting approval.
//! Each decision goes through [`Session::record_approval`]; the last one
//! returns the resumption request carrying `deferred_tool_approvals`.
//!
//! ## Feature Flags
//!
//! - `test-utils` - recording subscriber and event-log builders

pub mod approval;
pub mod conversation;
pub mod custom;
pub mod error;
pub mod event;
pub mod frame;
pub mod payload;
pub mod run;
pub mod session;
pub mod subscriber;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use approval::ApprovalBarrier;
pub use conversation::{Conversation, Entry, Message, Role, Transcript};
pub use custom::{CustomSignal, DeferredToolRequest};
pub use error::{ApprovalError, DecodeError, SessionError};
pub use event::{decode, EventKind, ProtocolEvent};
pub use frame::{Frame, FrameReader};
pub use payload::Payload;
pub use run::{RunContext, RunOptions, RunPhase, ToolCall};
pub use session::{RunOutcome, RunRequest, RunState, Session, SessionStatus};
pub use subscriber::{EventContext, Interest, RunSubscriber, SubscriberId};
