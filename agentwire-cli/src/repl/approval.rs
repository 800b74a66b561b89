//! Approval prompts for deferred tool calls
//!
//! A run that ends with deferred tool requests waits for a y/n decision on
//! every call. The decisions go back to the server in the resumption run.

use agentwire_core::DeferredToolRequest;
use std::io::{stdout, BufRead, Write};

use super::presentation::indent_lines;

/// Trait for approval prompt implementations
///
/// Implement this to create custom approval UX.
pub trait ApprovalPrompter: Send + Sync {
    /// Prompt the user and return whether the call is approved
    fn prompt(&self, request: &DeferredToolRequest) -> bool;

    /// Human-readable name for this prompter
    fn name(&self) -> &'static str;
}

/// Asks y/n on stdin. End of input denies.
#[derive(Debug, Default)]
pub struct SimplePrompter;

impl ApprovalPrompter for SimplePrompter {
    fn name(&self) -> &'static str {
        "SimplePrompter"
    }

    fn prompt(&self, request: &DeferredToolRequest) -> bool {
        println!("\n{}", format_request(request));
        println!("\n\x1b[33mApproval required:\x1b[0m");
        println!("  \x1b[1my\x1b[0m  run this tool call");
        println!("  \x1b[1mn\x1b[0m  deny");

        loop {
            print!("\nChoice: ");
            let _ = stdout().flush();

            let Some(input) = read_input() else {
                print_confirmation("Denied (no input)");
                return false;
            };

            match parse_choice(&input) {
                Some(true) => {
                    print_confirmation("Approved");
                    return true;
                }
                Some(false) => {
                    print_confirmation("Denied");
                    return false;
                }
                None if input.trim().is_empty() => continue,
                None => println!("\x1b[31mInvalid choice. Use y/n\x1b[0m"),
            }
        }
    }
}

/// Default prompter type
pub type DefaultPrompter = SimplePrompter;

/// Map an answer to a decision, `None` when it is neither.
pub fn parse_choice(input: &str) -> Option<bool> {
    match input.trim().to_lowercase().as_str() {
        "y" | "yes" | "approve" => Some(true),
        "n" | "no" | "deny" => Some(false),
        _ => None,
    }
}

/// Tool name followed by its arguments.
pub fn format_request(request: &DeferredToolRequest) -> String {
    let mut output = format!("🛠️  \x1b[1m{}\x1b[0m", request.tool_name);
    if !request.args.is_empty() {
        output.push('\n');
        output.push_str(&indent_lines(&request.args.display()));
    }
    output
}

/// Read a line of input, `None` at end of input
pub fn read_input() -> Option<String> {
    let stdin = std::io::stdin();
    let mut line = String::new();
    match stdin.lock().read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line),
    }
}

/// Print a confirmation message
pub fn print_confirmation(message: &str) {
    println!("  \x1b[32m✓\x1b[0m {}", message);
}
