//! Agent error types

use surge_config::ConfigError;

/// Error type for remote agent operations
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("agent {agent_id}: not found")]
    NotFound { agent_id: String },

    #[error("agent {agent_id}: api request error: {message}")]
    Api { agent_id: String, message: String },

    #[error("agent {agent_id}: bad response status code {status}")]
    BadStatus { agent_id: String, status: u16 },

    #[error("agent {agent_id}: failed to execute api request: {source}")]
    Network {
        agent_id: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("agent {agent_id}: failed to decode api response: {source}")]
    Decode {
        agent_id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Configuration error: {0}")]
    ConfigError(#[from] ConfigError),

    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
}

impl AgentError {
    /// Id of the agent the error came from, if any
    pub fn agent_id(&self) -> Option<&str> {
        match self {
            AgentError::NotFound { agent_id }
            | AgentError::Api { agent_id, .. }
            | AgentError::BadStatus { agent_id, .. }
            | AgentError::Network { agent_id, .. }
            | AgentError::Decode { agent_id, .. } => Some(agent_id),
            AgentError::ConfigError(_) | AgentError::ClientBuild(_) => None,
        }
    }
}
