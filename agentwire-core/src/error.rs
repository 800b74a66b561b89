//! Error types for the protocol engine.
//!
//! None of these escape the frame-processing loop. Decode errors are logged
//! and reported to subscribers, approval errors are logged and ignored, and
//! session errors are returned only from operations the consumer calls
//! directly (`submit`, `record_approval`).

use thiserror::Error;

use crate::event::EventKind;

/// A frame payload could not be turned into a protocol event.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The payload is not JSON.
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[source] serde_json::Error),

    /// The payload is JSON but not an object.
    #[error("payload is not a JSON object")]
    NotAnObject,

    /// The object has neither a `type` nor a `name` field.
    #[error("payload has neither a `type` nor a `name` discriminant")]
    MissingDiscriminant,

    /// The discriminant is known but the fields do not match it.
    #[error("malformed {kind} event: {source}")]
    InvalidEvent {
        kind: EventKind,
        #[source]
        source: serde_json::Error,
    },
}

/// A decision could not be recorded on an approval barrier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApprovalError {
    /// The call ID was not part of the deferred request.
    #[error("tool call {0} is not awaiting approval")]
    UnknownCall(String),

    /// A decision for this call was already recorded.
    #[error("tool call {0} already has a decision")]
    AlreadyRecorded(String),

    /// The barrier has already released.
    #[error("approval barrier already released; decision for {0} ignored")]
    AlreadyReleased(String),
}

/// A consumer-initiated session operation was rejected.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Another run has not reached a terminal phase yet.
    #[error("a run is already in progress")]
    RunInProgress,

    /// Deferred tool requests are waiting for decisions.
    #[error("{0} tool call(s) are awaiting approval")]
    ApprovalPending(usize),

    /// The submitted text is empty after trimming.
    #[error("message is empty")]
    EmptyMessage,

    /// No approval barrier exists.
    #[error("no tool calls are awaiting approval")]
    NoPendingApproval,

    /// The barrier rejected the decision.
    #[error(transparent)]
    Approval(#[from] ApprovalError),
}
