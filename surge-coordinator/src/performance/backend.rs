//! Metrics backends the monitor queries

use crate::error::MonitorError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value as JsonValue;

/// A source of instant-vector samples
#[async_trait]
pub trait MetricsBackend: Send + Sync {
    /// Run `query` and return the value of the first sample of the
    /// resulting vector
    async fn vector_first(&self, query: &str) -> Result<f64, MonitorError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryData {
    result_type: String,
    #[serde(default)]
    result: JsonValue,
}

#[derive(Debug, Deserialize)]
struct VectorSample {
    /// `[<unix time>, "<value>"]`
    value: (f64, String),
}

/// Prometheus HTTP API backend
#[derive(Debug, Clone)]
pub struct PrometheusBackend {
    url: String,
    client: Client,
}

impl PrometheusBackend {
    pub fn new(url: impl Into<String>, client: Client) -> Self {
        Self {
            url: url.into(),
            client,
        }
    }

    fn parse(response: QueryResponse) -> Result<f64, MonitorError> {
        if response.status != "success" {
            return Err(MonitorError::Query(
                response.error.unwrap_or_else(|| response.status.clone()),
            ));
        }

        let data = response
            .data
            .ok_or_else(|| MonitorError::Query("response carries no data".to_string()))?;
        if data.result_type != "vector" {
            return Err(MonitorError::UnexpectedType(data.result_type));
        }

        let samples: Vec<VectorSample> = serde_json::from_value(data.result)
            .map_err(|e| MonitorError::Parse(e.to_string()))?;
        let sample = samples.first().ok_or(MonitorError::EmptyVector)?;

        sample
            .value
            .1
            .parse::<f64>()
            .map_err(|e| MonitorError::Parse(format!("{}: {}", sample.value.1, e)))
    }
}

#[async_trait]
impl MetricsBackend for PrometheusBackend {
    async fn vector_first(&self, query: &str) -> Result<f64, MonitorError> {
        // Failed queries come back as non-2xx with an error body, so the
        // status code is not checked here
        let response: QueryResponse = self
            .client
            .get(format!("{}/api/v1/query", self.url.trim_end_matches('/')))
            .query(&[("query", query)])
            .send()
            .await?
            .json()
            .await?;

        Self::parse(response)
    }
}
