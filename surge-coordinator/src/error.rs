//! Error types for the coordinator, its cluster and performance monitor

use surge_agent::AgentError;
use surge_config::ConfigError;
use thiserror::Error;

/// Errors from driving the agents of a cluster
#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("cluster: no agents configured")]
    NoAgents,

    /// A fan-out stopped at its first failure. Amounts already applied on
    /// other agents are kept.
    #[error("cluster: operation stopped after {} agents: {source}", .applied.len())]
    PartialFailure {
        applied: Vec<(String, usize)>,
        #[source]
        source: AgentError,
    },

    #[error("cluster: {0}")]
    Agent(#[from] AgentError),

    #[error("cluster: failed to inject action into {} agents", .0.len())]
    InjectFailed(Vec<AgentError>),

    #[error("cluster: could not validate configuration: {0}")]
    Config(#[from] ConfigError),
}

impl ClusterError {
    /// `(agent_id, amount)` pairs applied before the failure
    pub fn applied(&self) -> &[(String, usize)] {
        match self {
            ClusterError::PartialFailure { applied, .. } => applied,
            _ => &[],
        }
    }
}

/// Errors from querying the metrics backend
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("failed to query metrics backend: {0}")]
    Http(#[from] reqwest::Error),

    #[error("query failed: {0}")]
    Query(String),

    #[error("expected a vector, got a {0}")]
    UnexpectedType(String),

    #[error("vector has length 0")]
    EmptyVector,

    #[error("failed to parse sample value: {0}")]
    Parse(String),

    #[error("performance monitor is already running")]
    AlreadyRunning,

    #[error("could not validate configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Coordinator errors
#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("coordinator is not running")]
    NotRunning,

    #[error("coordinator has not stopped")]
    NotStopped,

    #[error("coordinator is already done")]
    AlreadyDone,

    #[error("unknown state: {0}")]
    InvalidState(String),

    #[error(transparent)]
    Cluster(#[from] ClusterError),

    #[error(transparent)]
    Monitor(#[from] MonitorError),

    #[error("could not validate configuration: {0}")]
    Config(#[from] ConfigError),
}
