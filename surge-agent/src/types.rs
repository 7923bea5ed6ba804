//! Wire types of the agent control API

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use surge_config::LoadTestConfig;
use surge_loadtest::Status;

/// Body of every agent API response.
///
/// Success payloads carry some of `id`, `message` and `status`; failures
/// carry `error`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AgentResponse {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Default::default()
        }
    }

    /// The error message, if the response carries a non-empty one
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref().filter(|message| !message.is_empty())
    }
}

/// Body of `POST /loadagent/create`.
///
/// Controller families that need their own settings send them as extra
/// top-level keys next to `LoadTestConfig`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateRequest {
    #[serde(rename = "LoadTestConfig")]
    pub load_test_config: LoadTestConfig,

    #[serde(flatten)]
    pub controller_config: Map<String, JsonValue>,
}

/// Where a remote load-test stands, as far as this client knows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AgentPhase {
    /// Nothing created on the agent yet
    #[default]
    Idle,
    /// Created but not running. A failed start leaves the agent here.
    Created,
    Running,
    Stopped,
    /// Removed from the agent
    Destroyed,
}

impl fmt::Display for AgentPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self {
            AgentPhase::Idle => "idle",
            AgentPhase::Created => "created",
            AgentPhase::Running => "running",
            AgentPhase::Stopped => "stopped",
            AgentPhase::Destroyed => "destroyed",
        };
        f.write_str(phase)
    }
}
