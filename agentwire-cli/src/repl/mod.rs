//! Interactive REPL for AG-UI agents

mod approval;
mod commands;
mod presentation;
mod spinner;

use crate::error::CliError;
use agentwire_client::AgentClient;
use agentwire_core::{RunOptions, RunOutcome, Session};
use commands::{handle_special_command, SpecialCommandResult};
use rustyline::error::ReadlineError;
use rustyline::{Cmd, DefaultEditor, KeyEvent};
use spinner::Spinner;
use std::io::Write;
use std::path::PathBuf;

pub use approval::{
    format_request, parse_choice, print_confirmation, read_input, ApprovalPrompter,
    DefaultPrompter, SimplePrompter,
};
pub use presentation::{indent_lines, PresentationSubscriber};

/// ANSI escape code to reset terminal styling
const RESET_STYLE: &str = "\x1b[0m";

/// Run an interactive REPL against an agent server
///
/// This provides a command-line interface with:
/// - Up/down arrow history
/// - Ctrl+R reverse search
/// - Multi-line input (Ctrl+J)
/// - Slash commands (/help, /history, /attach, /detach, /exit)
/// - Streamed replies and tool calls
/// - y/n approval prompts for deferred tool calls
///
/// # Errors
///
/// Returns `CliError` which can be:
/// - `Readline` - Input/readline errors
/// - `Io` - History file errors
pub async fn run_cli(client: AgentClient) -> Result<(), CliError> {
    let mut session = Session::new();
    session.subscribe(PresentationSubscriber::new());
    print_welcome(&client, &session);

    let mut rl = DefaultEditor::new()?;
    // Bind Ctrl-J to insert newline instead of submitting
    rl.bind_sequence(KeyEvent::ctrl('J'), Cmd::Newline);

    let history_path = history_path();
    if history_path.exists() {
        rl.load_history(&history_path).ok();
    }

    let prompter = DefaultPrompter::default();
    loop {
        let readline = rl.readline(input_prompt());
        reset_input_style();

        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                rl.add_history_entry(line)?;

                if let Some(result) = handle_special_command(line, &mut session) {
                    match result {
                        SpecialCommandResult::Exit => break,
                        SpecialCommandResult::Continue => continue,
                    }
                }

                println!();
                let spinner = Spinner::new("thinking");
                let options = RunOptions::new().subscriber(spinner.clone());
                let outcome = match session.submit_with(line, options) {
                    Ok(request) => client.run(&mut session, request).await,
                    Err(e) => {
                        spinner.stop().await;
                        eprintln!("❌ {}\n", CliError::from(e));
                        continue;
                    }
                };
                spinner.stop().await;

                resolve_approvals(&client, &mut session, outcome, &prompter).await;
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl+C - just continue
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }

    if let Some(parent) = history_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    rl.save_history(&history_path)?;

    println!("\n👋 Goodbye!\n");
    Ok(())
}

/// Prompt for every deferred tool call and run the resumption.
///
/// Loops because a resumed run may defer more calls. Returns the outcome of
/// the last run.
pub async fn resolve_approvals(
    client: &AgentClient,
    session: &mut Session,
    mut outcome: RunOutcome,
    prompter: &dyn ApprovalPrompter,
) -> RunOutcome {
    while let RunOutcome::AwaitingApproval { requests } = &outcome {
        let mut resumption = None;
        for request in requests {
            let approved = prompter.prompt(request);
            match session.record_approval(&request.call_id, approved) {
                Ok(Some(next)) => resumption = Some(next),
                Ok(None) => {}
                Err(e) => log::warn!("Approval for {} not recorded: {}", request.call_id, e),
            }
        }

        let Some(request) = resumption else {
            break;
        };
        println!();
        outcome = client.run(session, request).await;
    }
    outcome
}

fn history_path() -> PathBuf {
    dirs::cache_dir()
        .map(|p| p.join("agentwire/history.txt"))
        .unwrap_or_else(|| ".agentwire/history.txt".into())
}

/// The input prompt string
fn input_prompt() -> &'static str {
    "  ❯ "
}

/// Reset terminal styling after input
fn reset_input_style() {
    let mut stdout = std::io::stdout();
    let _ = write!(stdout, "{}", RESET_STYLE);
    let _ = stdout.flush();
}

fn format_welcome_header() -> String {
    format!("🔌 agentwire v{}", env!("CARGO_PKG_VERSION"))
}

fn print_welcome(client: &AgentClient, session: &Session) {
    println!("\n{}", format_welcome_header());
    println!("Endpoint: {}", client.url().path());
    println!("Thread: {}", session.thread_id());
    println!("Type /help for commands, Ctrl+J for multiline");
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentwire_core::test_utils::EventLog;
    use agentwire_core::DeferredToolRequest;
    use std::sync::Mutex;

    struct ScriptedPrompter {
        answers: Mutex<Vec<bool>>,
    }

    impl ApprovalPrompter for ScriptedPrompter {
        fn prompt(&self, _request: &DeferredToolRequest) -> bool {
            self.answers.lock().unwrap().remove(0)
        }

        fn name(&self) -> &'static str {
            "ScriptedPrompter"
        }
    }

    #[test]
    fn input_prompt_has_leading_spaces() {
        assert!(input_prompt().starts_with("  "));
    }

    #[test]
    fn welcome_header_contains_version() {
        assert!(format_welcome_header().contains(env!("CARGO_PKG_VERSION")));
    }

    #[tokio::test]
    async fn finished_outcome_needs_no_prompt() {
        let client = AgentClient::new("http://127.0.0.1:1/agent").unwrap();
        let prompter = ScriptedPrompter {
            answers: Mutex::new(vec![]),
        };
        let mut session = Session::new();
        let outcome =
            resolve_approvals(&client, &mut session, RunOutcome::Finished, &prompter).await;
        assert_eq!(outcome, RunOutcome::Finished);
    }

    #[tokio::test]
    async fn every_request_is_prompted_before_resuming() {
        // Nothing listens on port 1, so the resumption run fails in transport.
        let client = AgentClient::new("http://127.0.0.1:1/agent").unwrap();
        let prompter = ScriptedPrompter {
            answers: Mutex::new(vec![true, false]),
        };

        let mut session = Session::new();
        session.submit("What is 2+2 and 3*3?").unwrap();
        session.feed(
            EventLog::new()
                .run_started("r1")
                .deferred(&[
                    ("id1", "calc", serde_json::json!({"expression": "2+2"})),
                    ("id2", "calc", serde_json::json!({"expression": "3*3"})),
                ])
                .run_finished()
                .to_sse()
                .as_bytes(),
        );
        let outcome = session.outcome().unwrap();

        let outcome = resolve_approvals(&client, &mut session, outcome, &prompter).await;

        assert!(prompter.answers.lock().unwrap().is_empty());
        assert!(matches!(outcome, RunOutcome::Errored { .. }));
        assert_eq!(
            session.conversation().deferred_tool_approvals().cloned(),
            Some([("id1".to_string(), true), ("id2".to_string(), false)].into())
        );
    }
}
