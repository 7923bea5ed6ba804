//! Performance monitor configuration

use crate::error::ConfigResult;
use crate::validation::{validate_positive, validate_required_string, validate_url, Validatable};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Performance monitor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// URL of the Prometheus server to query
    pub prometheus_url: String,

    /// Time to wait between two evaluations of the queries
    #[serde(
        rename = "update_interval_ms",
        with = "crate::domains::utils::serde_duration_millis"
    )]
    pub update_interval: Duration,

    /// Threshold queries, evaluated in order
    pub queries: Vec<PrometheusQuery>,
}

/// A threshold query against the metrics backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrometheusQuery {
    /// Human readable description used in logs
    pub description: String,

    /// PromQL expression returning an instant vector
    pub query: String,

    /// Value at or above which the query is considered failing
    pub threshold: f64,

    /// Whether crossing the threshold raises an alert
    #[serde(default = "crate::domains::utils::default_true")]
    pub alert: bool,

    /// Time after the monitor started before the query is evaluated at all
    #[serde(default, with = "crate::domains::utils::serde_duration")]
    pub min_interval: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            prometheus_url: "http://localhost:9090".to_string(),
            update_interval: Duration::from_millis(1000),
            queries: Vec::new(),
        }
    }
}

impl Validatable for MonitorConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_url(&self.prometheus_url, "prometheus_url", self.domain_name())?;
        validate_positive(
            self.update_interval.as_millis(),
            "update_interval_ms",
            self.domain_name(),
        )?;

        for query in &self.queries {
            query.validate()?;
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "monitor"
    }
}

impl Validatable for PrometheusQuery {
    fn validate(&self) -> ConfigResult<()> {
        validate_required_string(&self.query, "query", self.domain_name())?;
        if self.threshold.is_nan() {
            return Err(self.validation_error("threshold must be a number"));
        }
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "monitor.queries"
    }
}
