//! Domain-specific configuration modules

pub mod cluster;
pub mod coordinator;
pub mod http;
pub mod loadtest;
pub mod logging;
pub mod monitor;
pub mod utils;

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};

/// Complete configuration of a coordinated load-test: how the coordinator
/// behaves and what every agent is asked to run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SurgeConfig {
    /// Coordinator, cluster and monitor settings
    pub coordinator: coordinator::CoordinatorConfig,

    /// Load-test configuration sent to each agent on creation
    pub loadtest: loadtest::LoadTestConfig,
}

impl SurgeConfig {
    /// Validate all domain configurations
    pub fn validate_all(&self) -> ConfigResult<()> {
        self.coordinator.validate()?;
        self.loadtest.validate()
    }
}
