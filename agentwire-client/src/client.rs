//! Streaming run client

use std::sync::Arc;
use std::time::Duration;

use agentwire_core::{RunOutcome, RunRequest, Session};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};
use reqwest::Url;

use crate::bootstrap::{self, EventsConnection};
use crate::error::ClientError;

/// Default upper bound on a whole run, streaming included
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// Default connection timeout
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Client
// ============================================================================

/// HTTP transport for a [`Session`].
///
/// Cloning is cheap. When the client came from [`AgentClient::connect`], the
/// events connection stays open until the last clone is dropped.
#[derive(Clone)]
pub struct AgentClient {
    client: reqwest::Client,
    url: Url,
    headers: HeaderMap,
    timeout: Duration,
    events: Option<Arc<EventsConnection>>,
}

impl std::fmt::Debug for AgentClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentClient")
            .field("url", &self.url.path())
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("timeout", &self.timeout)
            .field("events", &self.events.is_some())
            .finish()
    }
}

impl AgentClient {
    /// Create a client that posts runs to `url`
    pub fn new(url: impl Into<String>) -> Result<Self, ClientError> {
        Self::builder().url(url).build()
    }

    /// Create a client from the AGENTWIRE_URL and AGENTWIRE_TIMEOUT_SECS
    /// environment variables
    pub fn from_env() -> Result<Self, ClientError> {
        let url = std::env::var("AGENTWIRE_URL").map_err(|_| {
            ClientError::Configuration("AGENTWIRE_URL environment variable not set".to_string())
        })?;

        let mut builder = Self::builder().url(url);
        if let Ok(secs) = std::env::var("AGENTWIRE_TIMEOUT_SECS") {
            builder = builder.timeout(parse_timeout_secs(&secs)?);
        }
        builder.build()
    }

    /// Perform the `/events` handshake against `base_url`
    pub async fn connect(base_url: &str) -> Result<Self, ClientError> {
        Self::builder().connect(base_url).await
    }

    /// Create a builder for more advanced configuration
    pub fn builder() -> AgentClientBuilder {
        AgentClientBuilder::new()
    }

    /// The run endpoint
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Whether the `/events` connection this client was bootstrapped from is
    /// still open. Always false for clients built with an explicit URL.
    pub fn events_open(&self) -> bool {
        self.events.as_ref().is_some_and(|events| events.is_open())
    }

    /// Send a run request and feed the response into `session`.
    ///
    /// Transport failures do not return an error. A refused connection, a
    /// non-2xx status, a broken body or an early close each end the run with
    /// an implicit run error, which the session reports to its subscribers
    /// and in the returned outcome.
    pub async fn run(&self, session: &mut Session, request: RunRequest) -> RunOutcome {
        log::debug!(
            "POST {} run {}{}",
            self.url.path(),
            request.run_id,
            if request.is_resumption() { " (resumption)" } else { "" }
        );

        let result = self
            .client
            .post(self.url.clone())
            .headers(self.headers.clone())
            .header(ACCEPT, "text/event-stream")
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(err) => {
                let error = ClientError::from_reqwest_error(err);
                log::error!("Run request failed: {}", error);
                session.fail_transport(error.to_string());
                return outcome(session);
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::error!("Run request rejected with HTTP {}", status.as_u16());
            session.fail_transport(format!("HTTP {}: {}", status.as_u16(), body.trim()));
            return outcome(session);
        }

        session.drive(response.bytes_stream()).await
    }
}

fn outcome(session: &Session) -> RunOutcome {
    session.outcome().unwrap_or_else(|| RunOutcome::Errored {
        message: "run request failed".to_string(),
    })
}

fn parse_timeout_secs(value: &str) -> Result<Duration, ClientError> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|_| {
            ClientError::Configuration(format!(
                "AGENTWIRE_TIMEOUT_SECS must be a whole number of seconds, got {:?}",
                value
            ))
        })
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`AgentClient`] configuration
///
/// Create with [`AgentClient::builder()`]. Finish with [`Self::build()`] when
/// the run endpoint is known, or [`Self::connect()`] to discover it.
#[derive(Debug, Default)]
pub struct AgentClientBuilder {
    url: Option<String>,
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    headers: Vec<(String, String)>,
}

impl AgentClientBuilder {
    fn new() -> Self {
        Self::default()
    }

    /// Set the run endpoint
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Set the upper bound on a whole run (default: 600s)
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the connection timeout (default: 10s)
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Add a header sent with every run request
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Build the client
    pub fn build(self) -> Result<AgentClient, ClientError> {
        let url = self
            .url
            .as_deref()
            .ok_or_else(|| ClientError::Configuration("Run URL is required".to_string()))?;
        let url = Url::parse(url)
            .map_err(|e| ClientError::Configuration(format!("Invalid run URL {}: {}", url, e)))?;

        self.finish(url, None)
    }

    /// Perform the `/events` handshake and build a client for the announced
    /// run endpoint
    pub async fn connect(self, base_url: &str) -> Result<AgentClient, ClientError> {
        let client = self.http_client()?;
        let (url, events) = bootstrap::open(&client, base_url).await?;
        self.finish(url, Some(events))
    }

    fn finish(
        self,
        url: Url,
        events: Option<EventsConnection>,
    ) -> Result<AgentClient, ClientError> {
        Ok(AgentClient {
            client: self.http_client()?,
            headers: self.header_map()?,
            url,
            timeout: self.timeout.unwrap_or(DEFAULT_TIMEOUT),
            events: events.map(Arc::new),
        })
    }

    fn http_client(&self) -> Result<reqwest::Client, ClientError> {
        reqwest::Client::builder()
            .connect_timeout(self.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT))
            .build()
            .map_err(|e| {
                ClientError::Configuration(format!("Failed to create HTTP client: {}", e))
            })
    }

    fn header_map(&self) -> Result<HeaderMap, ClientError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
                ClientError::Configuration(format!("Invalid header name: {}", name))
            })?;
            let value = HeaderValue::from_str(value).map_err(|_| {
                ClientError::Configuration(format!("Invalid value for header {}", name))
            })?;
            headers.insert(name, value);
        }
        Ok(headers)
    }
}

// ============================================================================
// Tests
// ============================================================================
