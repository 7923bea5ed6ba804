//! Error types for the load-test engine

use crate::control::ControlError;
use surge_config::ConfigError;
use thiserror::Error;

/// Load-test engine errors
#[derive(Error, Debug)]
pub enum LoadTestError {
    #[error("LoadTester is not running")]
    NotRunning,

    #[error("LoadTester has not stopped")]
    NotStopped,

    #[error("no active users left")]
    NoUsersLeft,

    #[error("max active users limit reached")]
    MaxUsersReached,

    #[error("invalid number of users")]
    InvalidNumUsers,

    #[error("unknown state: {0}")]
    InvalidState(String),

    #[error("could not validate configuration: {0}")]
    ConfigurationError(#[from] ConfigError),

    #[error(
        "MaxActiveUsers is not compatible with the open file limit: \
         MaxActiveUsers = {max_active_users}, limit = {limit}, suggested limit is {suggested}"
    )]
    FileLimit {
        max_active_users: usize,
        limit: u64,
        suggested: usize,
    },

    #[error("could not read the open file limit: {0}")]
    ResourceLimit(String),

    #[error("failed to pick rate: {0}")]
    RateSelection(String),

    #[error("controller error: {0}")]
    Controller(#[from] ControlError),

    #[error("failed to inject action into {} controllers", .0.len())]
    InjectFailed(Vec<ControlError>),
}

/// A batch operation that stopped early.
///
/// `completed` is how many single-user steps succeeded before `error`
/// stopped the batch.
#[derive(Error, Debug)]
#[error("{error} ({completed} completed)")]
pub struct PartialFailure {
    pub completed: usize,
    #[source]
    pub error: LoadTestError,
}

impl PartialFailure {
    pub fn new(completed: usize, error: LoadTestError) -> Self {
        Self { completed, error }
    }
}
