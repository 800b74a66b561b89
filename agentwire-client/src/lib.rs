//! # agentwire-client
//!
//! Streaming HTTP transport for [`agentwire_core::Session`].
//!
//! ```no_run
//! use agentwire_client::AgentClient;
//! use agentwire_core::{RunOutcome, Session};
//!
//! # async fn example() -> Result<(), agentwire_client::ClientError> {
//! let client = AgentClient::new("http://localhost:8000/agent")?;
//! let mut session = Session::new();
//!
//! let request = session.submit("What is 2+2?").expect("session is idle");
//! match client.run(&mut session, request).await {
//!     RunOutcome::Finished => {}
//!     RunOutcome::AwaitingApproval { requests } => {
//!         for request in requests {
//!             if let Ok(Some(resumption)) = session.record_approval(&request.call_id, true) {
//!                 client.run(&mut session, resumption).await;
//!             }
//!         }
//!     }
//!     RunOutcome::Errored { message } => eprintln!("run failed: {}", message),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Servers that hand out run endpoints per connection are reached with
//! [`AgentClient::connect`], which performs the `/events` handshake.

mod bootstrap;
pub mod client;
pub mod error;

pub use client::{AgentClient, AgentClientBuilder};
pub use error::ClientError;
