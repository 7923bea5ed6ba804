//! Coordinator configuration

use crate::domains::{cluster::ClusterConfig, http::HttpConfig, logging::LoggingConfig, monitor::MonitorConfig};
use crate::error::ConfigResult;
use crate::validation::{validate_positive, Validatable};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration of the feedback-control coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Agents the coordinator drives
    pub cluster: ClusterConfig,

    /// Performance signal the coordinator reacts to
    pub monitor: MonitorConfig,

    /// Users added to the cluster per scaling step
    pub num_users_inc: usize,

    /// Users removed from the cluster per scaling step
    pub num_users_dec: usize,

    /// Quiet window required after an alert or a scaling action before the
    /// next action is taken
    #[serde(with = "crate::domains::utils::serde_duration")]
    pub rest_time: Duration,

    /// HTTP client used for agents and the metrics backend
    pub http: HttpConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            cluster: ClusterConfig::default(),
            monitor: MonitorConfig::default(),
            num_users_inc: 16,
            num_users_dec: 16,
            rest_time: Duration::from_secs(10),
            http: HttpConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Validatable for CoordinatorConfig {
    fn validate(&self) -> ConfigResult<()> {
        self.cluster.validate()?;
        self.monitor.validate()?;
        self.http.validate()?;
        self.logging.validate()?;

        if self.cluster.agents.is_empty() {
            return Err(self.validation_error("at least one agent must be configured"));
        }
        validate_positive(self.num_users_inc, "num_users_inc", self.domain_name())?;
        validate_positive(self.num_users_dec, "num_users_dec", self.domain_name())?;
        validate_positive(self.rest_time.as_secs(), "rest_time", self.domain_name())
    }

    fn domain_name(&self) -> &'static str {
        "coordinator"
    }
}
