//! Client for the load-test agent control API
//!
//! An agent is a process hosting one load-test engine behind an HTTP API.
//! [`LoadAgent`] drives such a load-test from the coordinator side.

pub mod client;
pub mod errors;
pub mod types;

pub use client::{http_client, LoadAgent, LoadAgentConfig};
pub use errors::AgentError;
pub use types::{AgentPhase, AgentResponse, CreateRequest};
