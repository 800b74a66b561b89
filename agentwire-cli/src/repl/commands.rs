use agentwire_core::{Role, Session};

/// Classify an input line as a special command type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandType<'a> {
    /// Slash command with name and arguments
    Slash {
        command: &'a str,
        args: Vec<&'a str>,
    },
    /// Regular input to send to the agent
    Regular,
}

impl<'a> CommandType<'a> {
    /// Parse an input line into a command type
    pub fn parse(input: &'a str) -> Self {
        if input.starts_with('/') {
            let parts: Vec<&str> = input.split_whitespace().collect();
            if !parts.is_empty() {
                return Self::Slash {
                    command: parts[0],
                    args: parts[1..].to_vec(),
                };
            }
        }

        Self::Regular
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum SpecialCommandResult {
    Exit,
    Continue,
}

/// Handle slash commands
///
/// Returns Some(result) if this was a special command,
/// None if it should be sent to the agent.
pub fn handle_special_command(input: &str, session: &mut Session) -> Option<SpecialCommandResult> {
    let CommandType::Slash { command, args } = CommandType::parse(input) else {
        return None;
    };

    match command {
        "/exit" | "/quit" => return Some(SpecialCommandResult::Exit),
        "/help" => print!("{}", help::full_text()),
        "/history" => print!("{}", format_history(session, history_limit(&args))),
        "/attach" => match args.as_slice() {
            [filename, data_url] if data_url.starts_with("data:") => {
                session.add_attachment(*filename, *data_url);
                println!("📎 Attached {}", filename);
            }
            _ => println!("Usage: /attach <filename> <data-url>"),
        },
        "/detach" => match args.as_slice() {
            [filename] => match session.remove_attachment(filename) {
                Some(_) => println!("Detached {}", filename),
                None => println!("No attachment named {}", filename),
            },
            _ => println!("Usage: /detach <filename>"),
        },
        _ => eprintln!(
            "Unknown command: {}. Type /help for available commands.",
            command
        ),
    }
    Some(SpecialCommandResult::Continue)
}

/// Help text sections for the CLI
pub mod help {
    /// Header for the help display
    pub const HEADER: &str = "\n📖 Available Commands:\n";

    /// Conversation commands section
    pub const CONVERSATION: &str = "\
Conversation:
  /help                       Show this help message
  /history [n]                Show last n messages (default: 10)
";

    /// Attachment commands section
    pub const ATTACHMENTS: &str = "\
Attachments (sent with every message until detached):
  /attach <file> <data-url>   Attach an encoded file
  /detach <file>              Remove an attachment
";

    /// Exit commands section
    pub const EXIT: &str = "\
Exit:
  /exit, /quit                Exit
  Ctrl+D                      Exit
";

    /// Keyboard shortcuts section
    pub const KEYBOARD: &str = "\
Keyboard Shortcuts:
  Up/Down                     Navigate command history
  Ctrl+R                      Reverse search history
  Ctrl+J                      Insert a newline
  Ctrl+C                      Clear the current line
";

    /// Get the complete help text
    pub fn full_text() -> String {
        format!(
            "{}{}\n{}\n{}\n{}",
            HEADER, CONVERSATION, ATTACHMENTS, EXIT, KEYBOARD
        )
    }
}

fn history_limit(args: &[&str]) -> usize {
    args.first().and_then(|s| s.parse().ok()).unwrap_or(10)
}

fn format_history(session: &Session, limit: usize) -> String {
    let messages = session.conversation().messages();
    if messages.is_empty() {
        return "\nNo conversation history yet.\n\n".to_string();
    }

    let skip = messages.len().saturating_sub(limit);
    let mut output = format!("\n📜 Conversation History (last {}):\n\n", limit);
    for (idx, msg) in messages.iter().enumerate().skip(skip) {
        let role = match msg.role {
            Role::User => "User",
            Role::Assistant => "Assistant",
        };
        output.push_str(&format!("{}. {}: {}\n", idx + 1, role, truncate(&msg.content, 100)));
    }
    output.push('\n');
    output
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentwire_core::test_utils::EventLog;

    mod command_type_tests {
        use super::*;

        #[test]
        fn slash_command_without_args() {
            assert_eq!(
                CommandType::parse("/help"),
                CommandType::Slash {
                    command: "/help",
                    args: vec![]
                }
            );
        }

        #[test]
        fn slash_command_with_args() {
            assert_eq!(
                CommandType::parse("/attach a.txt data:,hi"),
                CommandType::Slash {
                    command: "/attach",
                    args: vec!["a.txt", "data:,hi"]
                }
            );
        }

        #[test]
        fn plain_text_is_regular() {
            assert_eq!(CommandType::parse("what is 2/3?"), CommandType::Regular);
        }
    }

    mod handle_special_command_tests {
        use super::*;

        #[test]
        fn regular_input_is_not_handled() {
            let mut session = Session::new();
            assert_eq!(handle_special_command("hello", &mut session), None);
        }

        #[test]
        fn exit_and_quit() {
            let mut session = Session::new();
            assert_eq!(
                handle_special_command("/exit", &mut session),
                Some(SpecialCommandResult::Exit)
            );
            assert_eq!(
                handle_special_command("/quit", &mut session),
                Some(SpecialCommandResult::Exit)
            );
        }

        #[test]
        fn attach_and_detach() {
            let mut session = Session::new();
            handle_special_command("/attach notes.txt data:text/plain;base64,aGk=", &mut session);
            assert_eq!(
                session.conversation().attachments().get("notes.txt").map(String::as_str),
                Some("data:text/plain;base64,aGk=")
            );

            handle_special_command("/detach notes.txt", &mut session);
            assert!(session.conversation().attachments().is_empty());
        }

        #[test]
        fn attach_requires_data_url() {
            let mut session = Session::new();
            let result = handle_special_command("/attach notes.txt /tmp/notes.txt", &mut session);
            assert_eq!(result, Some(SpecialCommandResult::Continue));
            assert!(session.conversation().attachments().is_empty());
        }

        #[test]
        fn unknown_command_continues() {
            let mut session = Session::new();
            assert_eq!(
                handle_special_command("/tools", &mut session),
                Some(SpecialCommandResult::Continue)
            );
        }
    }

    mod history_tests {
        use super::*;

        #[test]
        fn empty_history() {
            assert!(format_history(&Session::new(), 10).contains("No conversation history"));
        }

        #[test]
        fn history_lists_both_roles_and_respects_limit() {
            let mut session = Session::new();
            session.submit("first question").unwrap();
            session.feed(
                EventLog::new()
                    .run_started("r1")
                    .text("m1", &["first answer"])
                    .run_finished()
                    .to_sse()
                    .as_bytes(),
            );

            let all = format_history(&session, 10);
            assert!(all.contains("1. User: first question"));
            assert!(all.contains("2. Assistant: first answer"));

            let last = format_history(&session, 1);
            assert!(!last.contains("first question"));
            assert!(last.contains("2. Assistant: first answer"));
        }

        #[test]
        fn history_limit_defaults_to_ten() {
            assert_eq!(history_limit(&[]), 10);
            assert_eq!(history_limit(&["3"]), 3);
            assert_eq!(history_limit(&["many"]), 10);
        }
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("héllo wörld", 5), "héllo...");
    }

    #[test]
    fn help_lists_every_command() {
        let text = help::full_text();
        for command in ["/help", "/history", "/attach", "/detach", "/exit"] {
            assert!(text.contains(command), "missing {}", command);
        }
    }
}
