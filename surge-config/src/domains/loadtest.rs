//! Load-test configuration
//!
//! This is the configuration a load-test agent is created with. It travels
//! over the agent control API, so its keys follow that API's PascalCase
//! naming rather than the snake_case used by the coordinator files.

use crate::error::ConfigResult;
use crate::validation::{validate_positive, validate_url, Validatable};
use serde::{Deserialize, Serialize};

/// Configuration of a single load-test engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
pub struct LoadTestConfig {
    /// Target server endpoints
    pub connection_configuration: ConnectionConfiguration,

    /// How simulated users behave
    pub user_controller_configuration: UserControllerConfiguration,

    /// How many simulated users the engine may run
    pub users_configuration: UsersConfiguration,
}

/// Target server endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfiguration {
    #[serde(rename = "ServerURL")]
    pub server_url: String,

    #[serde(rename = "WebSocketURL")]
    pub websocket_url: String,
}

/// User controller family and pacing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct UserControllerConfiguration {
    /// Controller family the agent instantiates for every user
    #[serde(rename = "Type")]
    pub controller_type: ControllerType,

    /// Base pacing rate. 1.0 runs actions at their usual speed, 2.0 at half.
    pub rate: f64,

    /// Optional weighted distribution of per-user rates
    pub rates_distribution: Vec<RatesDistribution>,
}

/// A rate and the share of users it applies to
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RatesDistribution {
    pub rate: f64,
    pub percentage: f64,
}

/// Known controller families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ControllerType {
    #[default]
    Noop,
    Simple,
    Simulative,
    Generative,
}

/// Bounds on the number of simulated users
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct UsersConfiguration {
    /// Users spawned when the engine starts
    pub initial_active_users: usize,

    /// Upper bound of concurrently active users
    pub max_active_users: usize,
}

impl Default for ConnectionConfiguration {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8065".to_string(),
            websocket_url: "ws://localhost:8065".to_string(),
        }
    }
}

impl Default for UserControllerConfiguration {
    fn default() -> Self {
        Self {
            controller_type: ControllerType::default(),
            rate: 1.0,
            rates_distribution: Vec::new(),
        }
    }
}

impl Default for UsersConfiguration {
    fn default() -> Self {
        Self {
            initial_active_users: 0,
            max_active_users: 2000,
        }
    }
}

impl Validatable for LoadTestConfig {
    fn validate(&self) -> ConfigResult<()> {
        self.connection_configuration.validate()?;
        self.user_controller_configuration.validate()?;
        self.users_configuration.validate()
    }

    fn domain_name(&self) -> &'static str {
        "loadtest"
    }
}

impl Validatable for ConnectionConfiguration {
    fn validate(&self) -> ConfigResult<()> {
        validate_url(&self.server_url, "ServerURL", self.domain_name())?;
        validate_url(&self.websocket_url, "WebSocketURL", self.domain_name())
    }

    fn domain_name(&self) -> &'static str {
        "loadtest.connection"
    }
}

impl Validatable for UserControllerConfiguration {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(self.rate, "Rate", self.domain_name())?;

        if self.rates_distribution.is_empty() {
            return Ok(());
        }

        let mut total = 0.0;
        for dist in &self.rates_distribution {
            if dist.rate < 0.0 {
                return Err(self.validation_error(format!(
                    "RatesDistribution rate must not be negative, got {}",
                    dist.rate
                )));
            }
            if !(0.0..=1.0).contains(&dist.percentage) {
                return Err(self.validation_error(format!(
                    "RatesDistribution percentage must be within [0, 1], got {}",
                    dist.percentage
                )));
            }
            total += dist.percentage;
        }

        if (total - 1.0).abs() > 1e-3 {
            return Err(self.validation_error(format!(
                "RatesDistribution percentages must add up to 1, got {}",
                total
            )));
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "loadtest.user_controller"
    }
}

impl Validatable for UsersConfiguration {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(self.max_active_users, "MaxActiveUsers", self.domain_name())?;

        if self.initial_active_users > self.max_active_users {
            return Err(self.validation_error(format!(
                "InitialActiveUsers ({}) cannot exceed MaxActiveUsers ({})",
                self.initial_active_users, self.max_active_users
            )));
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "loadtest.users"
    }
}
