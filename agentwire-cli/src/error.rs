//! CLI-specific error types

use thiserror::Error;

/// Errors that can occur during CLI operations
#[derive(Debug, Error)]
pub enum CliError {
    /// Client configuration or bootstrap error
    #[error("Client error: {0}")]
    Client(#[from] agentwire_client::ClientError),

    /// Session rejected an operation
    #[error("Session error: {0}")]
    Session(#[from] agentwire_core::SessionError),

    /// Readline/input error
    #[error("Input error: {0}")]
    Readline(#[from] rustyline::error::ReadlineError),

    /// IO error (filesystem, stdout, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
