//! The `/events` session handshake.
//!
//! A server that hands out run endpoints per connection is contacted with a
//! `POST {base}/events`. The first frame names the run endpoint:
//!
//! ```text
//! data: {"agent": "/agent?token=..."}
//! ```
//!
//! The connection then stays open and carries `{"ping": true}` keep-alive
//! frames. It is drained in a background task for as long as the client
//! lives.

use agentwire_core::FrameReader;
use futures::{Stream, StreamExt};
use reqwest::header::ACCEPT;
use reqwest::Url;
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::error::ClientError;

/// The open events connection. Dropping it aborts the drain task.
#[derive(Debug)]
pub(crate) struct EventsConnection {
    task: JoinHandle<()>,
}

impl EventsConnection {
    pub(crate) fn is_open(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for EventsConnection {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Perform the handshake and return the resolved run endpoint.
pub(crate) async fn open(
    client: &reqwest::Client,
    base_url: &str,
) -> Result<(Url, EventsConnection), ClientError> {
    let base = Url::parse(base_url).map_err(|e| {
        ClientError::Configuration(format!("Invalid server URL {}: {}", base_url, e))
    })?;
    let events_url = events_url(&base);

    log::debug!("Opening events connection at {}", events_url);
    let response = client
        .post(events_url)
        .header(ACCEPT, "text/event-stream")
        .send()
        .await
        .map_err(ClientError::from_reqwest_error)?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ClientError::Bootstrap(format!(
            "HTTP {}: {}",
            status.as_u16(),
            body.trim()
        )));
    }

    let mut stream = Box::pin(response.bytes_stream());
    let mut reader = FrameReader::new();
    let path = loop {
        let chunk = match stream.next().await {
            Some(Ok(chunk)) => chunk,
            Some(Err(err)) => return Err(ClientError::from_reqwest_error(err)),
            None => {
                return Err(ClientError::Bootstrap(
                    "events connection closed before announcing the agent endpoint".to_string(),
                ))
            }
        };

        let mut frames = reader.push(&chunk).into_iter();
        if let Some(first) = frames.next() {
            let path = agent_path(&first.data)?;
            frames.for_each(|frame| log_event(&frame.data));
            break path;
        }
    };

    let endpoint = base.join(&path).map_err(|e| {
        ClientError::Bootstrap(format!("Invalid agent path {:?}: {}", path, e))
    })?;
    log::info!("Agent endpoint: {}", endpoint.path());

    let task = tokio::spawn(drain(stream, reader));
    Ok((endpoint, EventsConnection { task }))
}

fn events_url(base: &Url) -> Url {
    let mut url = base.clone();
    let path = format!("{}/events", base.path().trim_end_matches('/'));
    url.set_path(&path);
    url.set_query(None);
    url
}

fn agent_path(data: &str) -> Result<String, ClientError> {
    let value: Value = serde_json::from_str(data)?;
    value
        .get("agent")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            ClientError::Bootstrap(format!("first events frame has no agent path: {}", data))
        })
}

fn log_event(data: &str) {
    match serde_json::from_str::<Value>(data) {
        Ok(value) if value.get("ping").and_then(Value::as_bool) == Some(true) => {
            log::trace!("Events keep-alive");
        }
        _ => log::debug!("Ignoring events frame: {}", data),
    }
}

async fn drain<S, B>(mut stream: S, mut reader: FrameReader)
where
    S: Stream<Item = reqwest::Result<B>> + Unpin,
    B: AsRef<[u8]>,
{
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(bytes) => reader
                .push(bytes.as_ref())
                .iter()
                .for_each(|frame| log_event(&frame.data)),
            Err(err) => {
                log::warn!("Events connection failed: {}", err);
                return;
            }
        }
    }
    reader.finish();
    log::info!("Events connection closed by server");
}
