//! Error types for the transport client

use thiserror::Error;

/// Errors returned by client construction and the `/events` handshake.
///
/// Failures during a run never surface here. They become run errors on the
/// session instead.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Invalid or missing configuration (URL, headers, timeout)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Network error (connection, timeout, TLS)
    #[error("Network error: {0}")]
    Network(String),

    /// The `/events` handshake did not yield a run endpoint
    #[error("Bootstrap error: {0}")]
    Bootstrap(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClientError {
    /// Classify an HTTP error into an appropriate error variant
    pub fn from_reqwest_error(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Network(format!("Request timed out: {}", err))
        } else if err.is_connect() {
            ClientError::Network(format!("Connection failed: {}", err))
        } else if err.is_request() {
            ClientError::Network(format!("Request failed: {}", err))
        } else if err.is_builder() {
            ClientError::Configuration(err.to_string())
        } else {
            ClientError::Network(err.to_string())
        }
    }
}
