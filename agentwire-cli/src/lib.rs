//! Interactive terminal client for AG-UI agent servers
//!
//! This crate provides:
//! - A REPL that streams agent replies as they arrive
//! - y/n prompts for deferred tool calls, followed by the resumption run
//! - Slash commands for history and attachments

mod error;
pub mod repl;

pub use error::CliError;
pub use repl::{
    indent_lines, print_confirmation, read_input, resolve_approvals, run_cli, ApprovalPrompter,
    DefaultPrompter, PresentationSubscriber, SimplePrompter,
};
