use super::*;
use crate::error::ApprovalError;
use crate::test_utils::{sse_frame, EventLog, RecordingSubscriber};
use serde_json::json;

fn deferred_log() -> EventLog {
    EventLog::new()
        .run_started("r1")
        .tool_call("c1", "evaluate_expression", &["{\"expression\":\"2+2\"}"])
        .tool_call("c2", "evaluate_expression", &["{\"expression\":\"3*3\"}"])
        .deferred(&[
            ("c1", "evaluate_expression", json!({"expression": "2+2"})),
            ("c2", "evaluate_expression", json!("{\"expression\":\"3*3\"}")),
        ])
        .run_finished()
}

#[test]
fn test_submit_validation() {
    let mut session = Session::new();
    assert!(matches!(session.submit("   "), Err(SessionError::EmptyMessage)));

    session.submit("hello").unwrap();
    assert_eq!(session.status(), SessionStatus::Processing);
    assert!(matches!(session.submit("again"), Err(SessionError::RunInProgress)));

    session.feed(EventLog::new().run_started("r1").run_finished().to_sse().as_bytes());
    assert_eq!(session.status(), SessionStatus::Ready);
    assert!(session.submit("again").is_ok());
}

#[test]
fn test_run_request_shape() {
    let mut session = Session::with_thread_id("t1");
    session.add_attachment("a.txt", "data:text/plain;base64,aGk=");
    let request = session.submit("  What is 2+2?  ").unwrap();

    let body = serde_json::to_value(&request).unwrap();
    assert_eq!(body["threadId"], "t1");
    assert_eq!(body["runId"], request.run_id);
    assert_eq!(body["messages"][0]["role"], "user");
    assert_eq!(body["messages"][0]["content"], "What is 2+2?");
    assert_eq!(body["state"], json!({"attachments": {"a.txt": "data:text/plain;base64,aGk="}}));
    assert_eq!(body["tools"], json!([]));
    assert_eq!(body["context"], json!([]));
    assert_eq!(body["forwardedProps"], json!({}));
    assert!(!request.is_resumption());
}

#[test]
fn test_attachments_cleared_after_successful_run() {
    let mut session = Session::new();
    session.add_attachment("a.txt", "data:a");
    session.submit("hi").unwrap();
    session.feed(EventLog::new().run_started("r1").run_finished().to_sse().as_bytes());
    assert!(session.conversation().attachments().is_empty());
}

#[test]
fn test_attachments_kept_after_errored_run() {
    let mut session = Session::new();
    session.add_attachment("a.txt", "data:a");
    session.submit("hi").unwrap();
    session.feed(EventLog::new().run_started("r1").run_error("boom").to_sse().as_bytes());
    assert_eq!(session.conversation().attachments().len(), 1);
    assert_eq!(
        session.outcome(),
        Some(RunOutcome::Errored {
            message: "boom".to_string()
        })
    );
}

#[test]
fn test_approval_flow_produces_one_resumption() {
    let mut session = Session::new();
    session.submit("calculate").unwrap();
    session.feed(deferred_log().to_sse().as_bytes());

    assert_eq!(session.status(), SessionStatus::AwaitingApproval);
    let Some(RunOutcome::AwaitingApproval { requests }) = session.outcome() else {
        panic!("expected approvals, got {:?}", session.outcome());
    };
    assert_eq!(requests.len(), 2);
    assert!(matches!(session.submit("new turn"), Err(SessionError::ApprovalPending(2))));

    assert!(session.record_approval("c2", true).unwrap().is_none());
    assert!(matches!(
        session.record_approval("c2", false),
        Err(SessionError::Approval(ApprovalError::AlreadyRecorded(_)))
    ));
    assert!(matches!(
        session.record_approval("c9", true),
        Err(SessionError::Approval(ApprovalError::UnknownCall(_)))
    ));

    let request = session.record_approval("c1", true).unwrap().unwrap();
    assert!(request.is_resumption());
    assert_eq!(
        serde_json::to_value(&request.state).unwrap(),
        json!({"deferred_tool_approvals": {"c1": true, "c2": true}})
    );
    assert_eq!(session.status(), SessionStatus::Processing);
    assert_eq!(session.run().unwrap().label(), " (with approvals)");

    // The resumption run is now streaming.
    assert!(matches!(
        session.record_approval("c1", true),
        Err(SessionError::RunInProgress)
    ));

    session.feed(
        EventLog::new()
            .run_started("r2")
            .tool_result("c1", json!("4"))
            .tool_result("c2", json!("9"))
            .text("m2", &["2+2=4 and 3*3=9"])
            .run_finished()
            .to_sse()
            .as_bytes(),
    );
    assert_eq!(session.outcome(), Some(RunOutcome::Finished));
    assert!(session.conversation().deferred_tool_approvals().is_none());
    assert!(matches!(
        session.record_approval("c1", true),
        Err(SessionError::NoPendingApproval)
    ));
}

#[test]
fn test_record_approval_while_streaming_is_rejected() {
    let mut session = Session::new();
    session.submit("calculate").unwrap();
    session.feed(
        EventLog::new()
            .run_started("r1")
            .deferred(&[("c1", "calc", json!({}))])
            .to_sse()
            .as_bytes(),
    );
    assert!(matches!(
        session.record_approval("c1", true),
        Err(SessionError::RunInProgress)
    ));
    assert!(session.run().unwrap().awaiting_approval());
}

#[test]
fn test_record_approval_without_barrier() {
    let mut session = Session::new();
    assert!(matches!(
        session.record_approval("c1", true),
        Err(SessionError::NoPendingApproval)
    ));
}

#[test]
fn test_undecodable_frames_reach_subscribers() {
    let recorder = RecordingSubscriber::new();
    let mut session = Session::new();
    session.subscribe(recorder.clone());
    session.submit("hi").unwrap();

    let mut body = sse_frame(r#"{"type":"run-started"}"#);
    body.push_str(&sse_frame("not-json"));
    body.push_str(&sse_frame(r#"{"type":"run-finished"}"#));
    session.feed(body.as_bytes());

    assert_eq!(recorder.decode_errors(), 1);
    assert_eq!(recorder.kinds(), vec!["RUN_STARTED", "RUN_FINISHED"]);
    assert_eq!(session.outcome(), Some(RunOutcome::Finished));
}

#[test]
fn test_ignored_events_are_not_dispatched() {
    let recorder = RecordingSubscriber::new();
    let mut session = Session::new();
    session.subscribe(recorder.clone());
    session.submit("hi").unwrap();

    session.feed(
        EventLog::new()
            .run_started("r1")
            .tool_args("ghost", "{}")
            .run_finished()
            .to_sse()
            .as_bytes(),
    );
    assert_eq!(recorder.kinds(), vec!["RUN_STARTED", "RUN_FINISHED"]);
}

#[test]
fn test_end_of_stream_before_terminal_errors_the_run() {
    let recorder = RecordingSubscriber::new();
    let mut session = Session::new();
    session.subscribe(recorder.clone());
    session.submit("hi").unwrap();

    session.feed(b"data: {\"type\":\"run-started\"}\n\ndata: {\"type\":\"text-mess");
    session.end_of_stream();

    assert_eq!(session.status(), SessionStatus::Ready);
    assert_eq!(
        session.outcome(),
        Some(RunOutcome::Errored {
            message: "connection closed before the run finished".to_string()
        })
    );
    assert_eq!(recorder.kinds(), vec!["RUN_STARTED", "RUN_ERROR"]);
}

#[test]
fn test_end_of_stream_after_terminal_is_quiet() {
    let mut session = Session::new();
    session.submit("hi").unwrap();
    session.feed(EventLog::new().run_started("r1").run_finished().to_sse().as_bytes());
    session.end_of_stream();
    assert_eq!(session.outcome(), Some(RunOutcome::Finished));
}

#[test]
fn test_transport_failure_and_cancel() {
    let mut session = Session::new();
    session.submit("hi").unwrap();
    session.fail_transport("HTTP 500: upstream exploded");
    assert_eq!(
        session.outcome(),
        Some(RunOutcome::Errored {
            message: "HTTP 500: upstream exploded".to_string()
        })
    );

    session.submit("retry").unwrap();
    session.feed(b"data: {\"type\":\"run-started\"}\n\ndata: {\"type\":\"run-fin");
    session.cancel();
    assert_eq!(
        session.outcome(),
        Some(RunOutcome::Errored {
            message: "run cancelled".to_string()
        })
    );

    // The buffered half frame is gone.
    session.feed(b"ished\"}\n\n");
    assert_eq!(session.run().unwrap().phase(), RunPhase::Errored);
}

#[test]
fn test_transient_subscriber_lives_for_one_run() {
    let transient = RecordingSubscriber::new();
    let mut session = Session::new();

    session
        .submit_with("one", RunOptions::new().subscriber(transient.clone()))
        .unwrap();
    session.feed(EventLog::new().run_started("r1").run_finished().to_sse().as_bytes());

    session.submit("two").unwrap();
    session.feed(EventLog::new().run_started("r2").run_finished().to_sse().as_bytes());

    assert_eq!(transient.kinds(), vec!["RUN_STARTED", "RUN_FINISHED"]);
}

#[test]
fn test_run_interest_omits_tool_and_custom_handlers() {
    let recorder = RecordingSubscriber::new();
    let mut session = Session::new();
    session.subscribe(recorder.clone());

    let interest = Interest::ALL.without_tool_calls().without_custom_events();
    session
        .submit_with("hi", RunOptions::new().interest(interest))
        .unwrap();
    session.feed(
        EventLog::new()
            .run_started("r1")
            .tool_call("c1", "calc", &["{}"])
            .custom("progress", json!(1))
            .text("m1", &["ok"])
            .run_finished()
            .to_sse()
            .as_bytes(),
    );

    assert_eq!(
        recorder.kinds(),
        vec![
            "RUN_STARTED",
            "TEXT_MESSAGE_START",
            "TEXT_MESSAGE_CONTENT",
            "TEXT_MESSAGE_END",
            "RUN_FINISHED",
        ]
    );
    // State still tracks what subscribers did not see.
    assert!(session.run().unwrap().tool_call("c1").unwrap().is_ended());
}

#[test]
fn test_run_started_without_submit_opens_a_run() {
    let mut session = Session::new();
    assert!(!session.apply(ProtocolEvent::RunFinished(Default::default())));

    session.feed(EventLog::new().run_started("pushed").text("m1", &["hi"]).run_finished().to_sse().as_bytes());
    assert_eq!(session.run().unwrap().run_id(), "pushed");
    assert_eq!(session.conversation().messages().len(), 1);
}

#[test]
fn test_run_started_ignored_while_awaiting_approval() {
    let mut session = Session::new();
    session.submit("calculate").unwrap();
    session.feed(deferred_log().to_sse().as_bytes());

    assert!(!session.apply(crate::event::decode(r#"{"type":"RUN_STARTED"}"#).unwrap()));
    assert_eq!(session.status(), SessionStatus::AwaitingApproval);
}

#[test]
fn test_submit_drops_undelivered_approvals() {
    let mut session = Session::new();
    session.submit("calculate").unwrap();
    session.feed(
        EventLog::new()
            .run_started("r1")
            .deferred(&[("c1", "calc", json!({}))])
            .run_finished()
            .to_sse()
            .as_bytes(),
    );
    session.record_approval("c1", false).unwrap().unwrap();
    session.fail_transport("connection refused");
    assert!(session.conversation().deferred_tool_approvals().is_some());

    let request = session.submit("never mind").unwrap();
    assert!(!request.is_resumption());
}

#[test]
fn test_sessions_are_independent() {
    let mut a = Session::new();
    let mut b = Session::new();
    assert_ne!(a.thread_id(), b.thread_id());

    a.submit("a").unwrap();
    a.feed(EventLog::new().run_started("r1").text("m1", &["A"]).run_finished().to_sse().as_bytes());
    b.submit("b").unwrap();

    assert_eq!(a.conversation().messages().len(), 2);
    assert_eq!(b.conversation().messages().len(), 1);
    assert!(b.is_processing());
}

#[tokio::test]
async fn test_drive_feeds_chunks_until_terminal() {
    let mut session = Session::new();
    session.submit("hi").unwrap();

    let body = EventLog::new().run_started("r1").text("m1", &["Hi", " there"]).run_finished().to_sse();
    let chunks: Vec<Result<Vec<u8>, String>> = body
        .as_bytes()
        .chunks(7)
        .map(|chunk| Ok(chunk.to_vec()))
        .collect();

    let outcome = session.drive(futures::stream::iter(chunks)).await;
    assert_eq!(outcome, RunOutcome::Finished);
    assert_eq!(session.conversation().messages()[1].content, "Hi there");
}

#[tokio::test]
async fn test_drive_surfaces_stream_errors() {
    let mut session = Session::new();
    session.submit("hi").unwrap();

    let chunks: Vec<Result<&[u8], &str>> = vec![
        Ok(&b"data: {\"type\":\"run-started\"}\n\n"[..]),
        Err("connection reset"),
        Ok(&b"data: {\"type\":\"run-finished\"}\n\n"[..]),
    ];
    let outcome = session.drive(futures::stream::iter(chunks)).await;

    assert_eq!(
        outcome,
        RunOutcome::Errored {
            message: "stream error: connection reset".to_string()
        }
    );
}

#[tokio::test]
async fn test_drive_early_close_errors() {
    let mut session = Session::new();
    session.submit("hi").unwrap();

    let chunks: Vec<Result<&[u8], &str>> = vec![Ok(&b"data: {\"type\":\"run-started\"}\n\n"[..])];
    let outcome = session.drive(futures::stream::iter(chunks)).await;

    assert!(matches!(outcome, RunOutcome::Errored { .. }));
    assert_eq!(session.status(), SessionStatus::Ready);
}
