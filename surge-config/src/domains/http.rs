//! HTTP client configuration

use crate::error::ConfigResult;
use crate::validation::{validate_positive, validate_required_string, Validatable};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// HTTP client configuration shared by the agent and metrics clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Request timeout. Unset means requests wait for the remote end.
    #[serde(
        with = "crate::domains::utils::serde_duration_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<Duration>,

    /// User agent string
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            user_agent: default_user_agent(),
        }
    }
}

impl Validatable for HttpConfig {
    fn validate(&self) -> ConfigResult<()> {
        if let Some(timeout) = self.timeout {
            validate_positive(timeout.as_secs(), "timeout", self.domain_name())?;
        }

        validate_required_string(&self.user_agent, "user_agent", self.domain_name())
    }

    fn domain_name(&self) -> &'static str {
        "http"
    }
}

fn default_user_agent() -> String {
    concat!("surge/", env!("CARGO_PKG_VERSION")).to_string()
}
