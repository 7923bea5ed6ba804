//! Periodic evaluation of threshold queries

use super::backend::MetricsBackend;
use crate::error::MonitorError;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use surge_config::{MonitorConfig, PrometheusQuery, Validatable};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Outcome of one evaluation of the monitor queries
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerformanceStatus {
    /// Whether an alerting query crossed its threshold
    pub alert: bool,
    /// Queries that returned a value, in evaluation order
    pub results: Vec<QueryResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub description: String,
    pub value: f64,
    pub threshold: f64,
}

/// Background loop turning metric queries into a stream of
/// [`PerformanceStatus`] values, one per update interval
pub struct Monitor {
    config: Arc<MonitorConfig>,
    backend: Arc<dyn MetricsBackend>,
    stop: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Monitor {
    pub fn new(config: MonitorConfig, backend: Arc<dyn MetricsBackend>) -> Result<Self, MonitorError> {
        config.validate()?;

        Ok(Self {
            config: Arc::new(config),
            backend,
            stop: watch::channel(false).0,
            handle: Mutex::new(None),
        })
    }

    /// Start the loop. The first evaluation happens right away.
    ///
    /// The returned channel yields one status per tick until the monitor is
    /// stopped.
    pub fn run(&self) -> Result<mpsc::Receiver<PerformanceStatus>, MonitorError> {
        let mut handle = self.handle.lock();
        if handle.is_some() {
            return Err(MonitorError::AlreadyRunning);
        }

        self.stop.send_replace(false);
        let (tx, rx) = mpsc::channel(1);
        let stop = self.stop.subscribe();
        let config = self.config.clone();
        let backend = self.backend.clone();

        *handle = Some(tokio::spawn(monitor_loop(config, backend, stop, tx)));
        info!(
            num_queries = self.config.queries.len(),
            interval_ms = self.config.update_interval.as_millis() as u64,
            "Performance monitor started"
        );
        Ok(rx)
    }

    /// Signal the loop and wait for it to exit
    pub async fn stop(&self) {
        self.stop.send_replace(true);

        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Performance monitor task failed");
            }
            info!("Performance monitor stopped");
        }
    }
}

async fn monitor_loop(
    config: Arc<MonitorConfig>,
    backend: Arc<dyn MetricsBackend>,
    mut stop: watch::Receiver<bool>,
    tx: mpsc::Sender<PerformanceStatus>,
) {
    let start = Instant::now();

    loop {
        let status = evaluate(&config.queries, backend.as_ref(), start, &stop).await;

        tokio::select! {
            _ = stop.wait_for(|stopped| *stopped) => return,
            sent = tx.send(status) => {
                if sent.is_err() {
                    debug!("Performance status receiver dropped");
                    return;
                }
            }
        }

        tokio::select! {
            _ = stop.wait_for(|stopped| *stopped) => return,
            _ = tokio::time::sleep(config.update_interval) => {}
        }
    }
}

/// Evaluate `queries` in order. The first alerting query at or above its
/// threshold raises the alert and ends the evaluation.
async fn evaluate(
    queries: &[PrometheusQuery],
    backend: &dyn MetricsBackend,
    start: Instant,
    stop: &watch::Receiver<bool>,
) -> PerformanceStatus {
    let mut status = PerformanceStatus::default();

    for query in queries {
        if *stop.borrow() {
            return PerformanceStatus::default();
        }

        if start.elapsed() < query.min_interval {
            info!(
                query_description = %query.description,
                min_interval_secs = query.min_interval.as_secs(),
                "Not enough time since the monitor started, skipping query"
            );
            continue;
        }

        let value = match backend.vector_first(&query.query).await {
            Ok(value) => value,
            Err(e) => {
                warn!(query_description = %query.description, error = %e, "Query failed");
                continue;
            }
        };

        debug!(
            query_description = %query.description,
            value = %format!("{:2.8}", value),
            threshold = %format!("{:2.8}", query.threshold),
            "Query evaluated"
        );
        status.results.push(QueryResult {
            description: query.description.clone(),
            value,
            threshold: query.threshold,
        });

        if query.alert && value >= query.threshold {
            warn!(
                query_description = %query.description,
                value,
                threshold = query.threshold,
                "Returned value is above the threshold"
            );
            status.alert = true;
            break;
        }
    }

    status
}
