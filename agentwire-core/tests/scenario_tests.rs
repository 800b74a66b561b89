//! End-to-end runs through the full pipeline: bytes in, conversation out.

use agentwire_core::test_utils::{EventLog, RecordingSubscriber};
use agentwire_core::{Entry, ProtocolEvent, RunOutcome, Session, SessionStatus};
use serde_json::json;

const HI_THERE: &str = "data: {\"type\":\"run-started\",\"runId\":\"r1\"}\n\n\
data: {\"type\":\"text-message-start\"}\n\n\
data: {\"type\":\"text-message-content\",\"delta\":\"Hi\"}\n\n\
data: {\"type\":\"text-message-content\",\"delta\":\" there\"}\n\n\
data: {\"type\":\"text-message-end\",\"messageId\":\"m1\"}\n\n\
data: {\"type\":\"run-finished\"}\n\n";

fn assistant_messages(session: &Session) -> Vec<(String, String)> {
    session
        .conversation()
        .messages()
        .iter()
        .filter(|m| m.role == agentwire_core::Role::Assistant)
        .map(|m| (m.id.clone(), m.content.clone()))
        .collect()
}

#[test]
fn test_hi_there_stream_produces_one_message() {
    let mut session = Session::new();
    session.submit("hello").unwrap();
    session.feed(HI_THERE.as_bytes());

    assert_eq!(
        assistant_messages(&session),
        vec![("m1".to_string(), "Hi there".to_string())]
    );
    assert_eq!(session.outcome(), Some(RunOutcome::Finished));
    assert_eq!(session.status(), SessionStatus::Ready);
}

#[test]
fn test_every_two_way_split_decodes_identically() {
    let body = EventLog::new()
        .run_started("r1")
        .text("m1", &["héllo ", "wörld ✓ ", "🦀"])
        .tool_call("c1", "calc", &["{\"expr\":", "\"2×2\"}"])
        .tool_result("c1", json!([{"type": "text", "text": "4"}]))
        .run_finished()
        .to_sse()
        .into_bytes();

    let reference = {
        let recorder = RecordingSubscriber::new();
        let mut session = Session::new();
        session.subscribe(recorder.clone());
        session.feed(&body);
        recorder.events()
    };
    assert_eq!(reference.len(), 12);

    for split in 0..=body.len() {
        let recorder = RecordingSubscriber::new();
        let mut session = Session::new();
        session.subscribe(recorder.clone());
        session.feed(&body[..split]);
        session.feed(&body[split..]);
        assert_eq!(recorder.events(), reference, "split at byte {}", split);
    }
}

#[test]
fn test_byte_at_a_time_delivery() {
    let mut session = Session::new();
    session.submit("hello").unwrap();
    for byte in HI_THERE.as_bytes() {
        session.feed(std::slice::from_ref(byte));
    }
    assert_eq!(
        assistant_messages(&session),
        vec![("m1".to_string(), "Hi there".to_string())]
    );
}

#[test]
fn test_malformed_frame_does_not_stop_the_run() {
    let recorder = RecordingSubscriber::new();
    let mut session = Session::new();
    session.subscribe(recorder.clone());
    session.submit("hello").unwrap();

    session.feed(b"data: {\"type\":\"run-started\"}\n\ndata: not-json\n\ndata: {\"type\":\"run-finished\"}\n\n");

    assert_eq!(recorder.decode_errors(), 1);
    assert_eq!(session.outcome(), Some(RunOutcome::Finished));
}

#[test]
fn test_interleaved_tool_args_concatenate_per_call() {
    let mut session = Session::new();
    session.submit("two tools").unwrap();
    session.feed(
        EventLog::new()
            .run_started("r1")
            .tool_start("a", "calc")
            .tool_start("b", "calc")
            .tool_args("b", "{\"n\":")
            .tool_args("a", "{\"m\":")
            .tool_args("a", "1}")
            .tool_args("b", "2}")
            .tool_end("b")
            .tool_end("a")
            .to_sse()
            .as_bytes(),
    );

    let run = session.run().unwrap();
    assert_eq!(run.tool_call("a").unwrap().args(), "{\"m\":1}");
    assert_eq!(run.tool_call("b").unwrap().args(), "{\"n\":2}");
}

#[test]
fn test_deferred_approvals_in_reverse_order_resume_once() {
    let mut session = Session::new();
    session.submit("What is 2+2 and 3*3?").unwrap();
    session.feed(
        EventLog::new()
            .run_started("r1")
            .deferred(&[
                ("id1", "evaluate_expression", json!({"expression": "2+2"})),
                ("id2", "evaluate_expression", json!({"expression": "3*3"})),
            ])
            .run_finished()
            .to_sse()
            .as_bytes(),
    );

    let mut resumptions = Vec::new();
    for id in ["id2", "id1"] {
        if let Some(request) = session.record_approval(id, true).unwrap() {
            resumptions.push(request);
        }
    }

    assert_eq!(resumptions.len(), 1);
    let state = serde_json::to_value(&resumptions[0].state).unwrap();
    assert_eq!(state["deferred_tool_approvals"], json!({"id1": true, "id2": true}));
    assert_eq!(
        session.conversation().deferred_tool_approvals().cloned(),
        Some([("id1".to_string(), true), ("id2".to_string(), true)].into())
    );
    assert!(session.record_approval("id1", true).is_err());
}

#[test]
fn test_replay_is_idempotent() {
    let log = EventLog::new()
        .run_started("r1")
        .custom("instructions", json!("Be concise"))
        .custom("attachments", json!({"notes.txt": "data:text/plain;base64,aGk="}))
        .text("m1", &["Let me ", "check."])
        .tool_call("c1", "calc", &["{\"x\":1}"])
        .tool_result("c1", json!("1"))
        .custom("progress", json!({"pct": 100}))
        .text("m2", &["Done."])
        .run_finished();

    let replay = || {
        let mut session = Session::with_thread_id("t1");
        session.feed(log.to_sse().as_bytes());
        session.conversation().clone()
    };

    let first = replay();
    assert_eq!(first, replay());
    assert_eq!(first.messages().len(), 2);
    assert_eq!(
        first.transcript().entries().next(),
        Some(&Entry::Instructions("Be concise".to_string()))
    );
}

#[test]
fn test_early_close_errors_instead_of_hanging() {
    let recorder = RecordingSubscriber::new();
    let mut session = Session::new();
    session.subscribe(recorder.clone());
    session.submit("hello").unwrap();

    let cut = HI_THERE.find("text-message-end").unwrap();
    session.feed(&HI_THERE.as_bytes()[..cut]);
    session.end_of_stream();

    assert!(matches!(session.outcome(), Some(RunOutcome::Errored { .. })));
    assert_eq!(session.status(), SessionStatus::Ready);
    assert!(matches!(recorder.events().last(), Some(ProtocolEvent::RunError(_))));
    // The partial assistant text stays visible.
    assert!(session.conversation().transcript().entries().any(|entry| matches!(
        entry,
        Entry::Assistant { text, complete: false, .. } if text == "Hi there"
    )));
}

#[tokio::test]
async fn test_pushed_run_survives_every_chunk_split() {
    let body = HI_THERE.as_bytes();
    for split in 0..=body.len() {
        let mut session = Session::new();
        let chunks = vec![
            Ok::<_, std::io::Error>(body[..split].to_vec()),
            Ok(body[split..].to_vec()),
        ];
        let outcome = session.drive(futures::stream::iter(chunks)).await;
        assert_eq!(outcome, RunOutcome::Finished, "split at byte {}", split);
        assert_eq!(
            assistant_messages(&session),
            vec![("m1".to_string(), "Hi there".to_string())]
        );
    }
}

#[tokio::test]
async fn test_drive_without_a_run_does_not_report_the_previous_one() {
    let mut session = Session::new();
    session.submit("hello").unwrap();
    session.feed(HI_THERE.as_bytes());
    assert_eq!(session.outcome(), Some(RunOutcome::Finished));

    let chunks = vec![Ok::<_, std::io::Error>(b": keep-alive\n\n".to_vec())];
    let outcome = session.drive(futures::stream::iter(chunks)).await;
    assert_eq!(
        outcome,
        RunOutcome::Errored {
            message: "stream ended without a run".to_string()
        }
    );
}

#[test]
fn test_replay_without_message_ids_is_idempotent() {
    let log = EventLog::new()
        .run_started("r1")
        .raw(json!({"type": "text-message-start"}))
        .raw(json!({"type": "text-message-content", "delta": "Hi"}))
        .raw(json!({"type": "text-message-end"}))
        .run_finished();

    let replay = || {
        let mut session = Session::with_thread_id("t1");
        session.feed(log.to_sse().as_bytes());
        session.conversation().clone()
    };

    let first = replay();
    assert_eq!(first, replay());
    assert_eq!(first.messages().len(), 1);
    assert_eq!(first.messages()[0].id, "message-1");
    assert_eq!(first.messages()[0].content, "Hi");
}

#[test]
fn test_deferred_requests_are_prompted_in_arrival_order() {
    let mut session = Session::new();
    session.submit("two tools").unwrap();
    session.feed(
        EventLog::new()
            .run_started("r1")
            .deferred(&[
                ("z1", "evaluate_expression", json!({"expression": "1+1"})),
                ("a1", "evaluate_expression", json!({"expression": "2+2"})),
            ])
            .run_finished()
            .to_sse()
            .as_bytes(),
    );

    let Some(RunOutcome::AwaitingApproval { requests }) = session.outcome() else {
        panic!("expected the run to await approval");
    };
    let ids: Vec<&str> = requests.iter().map(|r| r.call_id.as_str()).collect();
    assert_eq!(ids, vec!["z1", "a1"]);
}
