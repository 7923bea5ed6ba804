//! Feedback loop scaling the cluster against the performance signal

use crate::cluster::Cluster;
use crate::error::{CoordinatorError, MonitorError};
use crate::performance::{MetricsBackend, Monitor, PerformanceStatus, PrometheusBackend};
use crate::status::{State, Status};
use chrono::Utc;
use parking_lot::RwLock;
use std::sync::Arc;
use surge_agent::http_client;
use surge_config::{CoordinatorConfig, LoadTestConfig, Validatable};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Resolves once a coordinator has reached [`State::Done`]
#[derive(Debug, Clone)]
pub struct DoneSignal {
    rx: watch::Receiver<bool>,
}

impl DoneSignal {
    pub fn is_done(&self) -> bool {
        *self.rx.borrow()
    }

    pub async fn wait(&self) {
        let mut rx = self.rx.clone();
        // A dropped sender means the loop is gone as well
        let _ = rx.wait_for(|done| *done).await;
    }
}

#[derive(Default)]
struct Control {
    stop: Option<watch::Sender<bool>>,
    done: Option<DoneSignal>,
}

/// Drives a cluster of agents, adding users while the target system keeps
/// up and removing them when it raises alerts
pub struct Coordinator {
    config: Arc<CoordinatorConfig>,
    cluster: Arc<Cluster>,
    monitor: Arc<Monitor>,
    status: Arc<RwLock<Status>>,
    control: Mutex<Control>,
}

impl Coordinator {
    /// Create a coordinator querying the configured Prometheus server
    pub fn new(
        config: CoordinatorConfig,
        load_test_config: LoadTestConfig,
    ) -> Result<Self, CoordinatorError> {
        config.validate()?;
        let client = http_client(&config.http).map_err(MonitorError::Http)?;
        let backend = Arc::new(PrometheusBackend::new(
            config.monitor.prometheus_url.clone(),
            client,
        ));
        Self::with_backend(config, load_test_config, backend)
    }

    /// Create a coordinator reading its performance signal from `backend`
    pub fn with_backend(
        config: CoordinatorConfig,
        load_test_config: LoadTestConfig,
        backend: Arc<dyn MetricsBackend>,
    ) -> Result<Self, CoordinatorError> {
        config.validate()?;

        let cluster = Cluster::new(config.cluster.clone(), load_test_config, &config.http)?;
        let monitor = Monitor::new(config.monitor.clone(), backend)?;

        Ok(Self {
            config: Arc::new(config),
            cluster: Arc::new(cluster),
            monitor: Arc::new(monitor),
            status: Arc::new(RwLock::new(Status::default())),
            control: Mutex::new(Control::default()),
        })
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn cluster(&self) -> &Cluster {
        &self.cluster
    }

    /// Start the cluster and the monitor, then hand control to the feedback
    /// loop. The returned signal resolves when the loop has wound down.
    pub async fn run(&self) -> Result<DoneSignal, CoordinatorError> {
        let mut control = self.control.lock().await;

        let state = self.status.read().state;
        match state {
            State::Done => return Err(CoordinatorError::AlreadyDone),
            State::Running => return Err(CoordinatorError::NotStopped),
            State::Stopped => {}
        }

        info!(
            num_agents = self.config.cluster.agents.len(),
            "Ready to drive a cluster of load-test agents"
        );

        if let Err(e) = self.cluster.run().await {
            error!(error = %e, "Running cluster failed");
            return Err(e.into());
        }
        let performance = self.monitor.run()?;

        let (stop_tx, stop_rx) = watch::channel(false);
        let (done_tx, done_rx) = watch::channel(false);
        {
            let mut status = self.status.write();
            status.state = State::Running;
            status.start_time = Some(Utc::now());
        }

        let control_loop = ControlLoop {
            config: self.config.clone(),
            cluster: self.cluster.clone(),
            monitor: self.monitor.clone(),
            status: self.status.clone(),
        };
        tokio::spawn(control_loop.run(performance, stop_rx, done_tx));

        let done = DoneSignal { rx: done_rx };
        control.stop = Some(stop_tx);
        control.done = Some(done.clone());
        Ok(done)
    }

    /// Stop the feedback loop and wait until the cluster has been shut down
    pub async fn stop(&self) -> Result<(), CoordinatorError> {
        let mut control = self.control.lock().await;
        if self.status.read().state != State::Running {
            return Err(CoordinatorError::NotRunning);
        }

        if let Some(stop) = control.stop.take() {
            stop.send_replace(true);
        }
        if let Some(done) = control.done.take() {
            done.wait().await;
        }

        Ok(())
    }

    /// Current status. While running, user and error counts come fresh from
    /// the agents.
    pub async fn status(&self) -> Status {
        let status = self.status.read().clone();
        if status.state != State::Running {
            return status;
        }

        self.cluster.refresh_status().await;
        let cluster = self.cluster.status();
        Status {
            active_users: cluster.active_users,
            num_errors: cluster.num_errors,
            ..status
        }
    }

    /// Ask every user in the cluster to perform `action` once
    pub async fn inject_action(&self, action: &str) -> Result<(), CoordinatorError> {
        if self.status.read().state != State::Running {
            return Err(CoordinatorError::NotRunning);
        }
        self.cluster.inject_action(action).await?;
        Ok(())
    }
}

/// Timestamps the loop paces its actions on
#[derive(Debug, Default)]
struct Pacing {
    last_alert: Option<Instant>,
    last_action: Option<Instant>,
    supported: usize,
}

struct ControlLoop {
    config: Arc<CoordinatorConfig>,
    cluster: Arc<Cluster>,
    monitor: Arc<Monitor>,
    status: Arc<RwLock<Status>>,
}

impl ControlLoop {
    async fn run(
        self,
        mut performance: mpsc::Receiver<PerformanceStatus>,
        mut stop: watch::Receiver<bool>,
        done: watch::Sender<bool>,
    ) {
        let mut pacing = Pacing::default();

        loop {
            let perf = tokio::select! {
                _ = stop.wait_for(|stopped| *stopped) => {
                    info!("Coordinator shutting down");
                    break;
                }
                perf = performance.recv() => match perf {
                    Some(perf) => perf,
                    None => {
                        warn!("Performance monitor exited, shutting down");
                        break;
                    }
                },
            };

            self.tick(&perf, &mut pacing).await;
        }

        self.finish(pacing.supported).await;
        done.send_replace(true);
    }

    async fn tick(&self, perf: &PerformanceStatus, pacing: &mut Pacing) {
        if perf.alert {
            pacing.last_alert = Some(Instant::now());
        }

        self.cluster.refresh_status().await;
        let cluster = self.cluster.status();
        info!(
            active_users = cluster.active_users,
            errors = cluster.num_errors,
            "Cluster status"
        );

        let rest_time = self.config.rest_time;
        let rested = |at: Option<Instant>| at.is_none_or(|at| at.elapsed() > rest_time);

        // A load level counts as supported once it has held without alerts
        // for a full rest time
        if pacing.last_alert.is_some()
            && !perf.alert
            && rested(pacing.last_alert)
            && rested(pacing.last_action)
        {
            pacing.supported = cluster.active_users;
        }
        {
            let mut status = self.status.write();
            status.active_users = cluster.active_users;
            status.num_errors = cluster.num_errors;
            status.supported_users = pacing.supported;
        }

        if pacing.last_alert.is_some() && !rested(pacing.last_action) {
            debug!("Resting after the last action");
            return;
        }

        if perf.alert {
            let amount = self.config.num_users_dec;
            info!(num_users = amount, "Decrementing active users");
            match self.cluster.decrement_users(amount).await {
                Ok(()) => pacing.last_action = Some(Instant::now()),
                Err(e) => error!(error = %e, "Failed to decrement users"),
            }
        } else if rested(pacing.last_alert) {
            let max = self.config.cluster.max_active_users;
            if cluster.active_users < max {
                let amount = self.config.num_users_inc.min(max - cluster.active_users);
                info!(num_users = amount, "Incrementing active users");
                match self.cluster.increment_users(amount).await {
                    Ok(()) => pacing.last_action = Some(Instant::now()),
                    Err(e) => error!(error = %e, "Failed to increment users"),
                }
            }
        } else {
            info!("Waiting for metrics to stabilize");
        }
    }

    async fn finish(&self, supported: usize) {
        self.monitor.stop().await;

        self.cluster.refresh_status().await;
        let cluster = self.cluster.status();
        self.cluster.shutdown().await;

        {
            let mut status = self.status.write();
            status.state = State::Done;
            status.stop_time = Some(Utc::now());
            status.active_users = cluster.active_users;
            status.num_errors = cluster.num_errors;
            status.supported_users = supported;
        }
        info!(
            supported_users = supported,
            active_users = cluster.active_users,
            errors = cluster.num_errors,
            "Coordinator done"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value as JsonValue};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use surge_config::{AgentEndpoint, ClusterConfig, MonitorConfig, PrometheusQuery};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Backend replaying `values`, then repeating the last one
    struct ScriptedBackend {
        values: Vec<f64>,
        calls: AtomicUsize,
    }

    impl ScriptedBackend {
        fn new(values: &[f64]) -> Arc<Self> {
            Arc::new(Self {
                values: values.to_vec(),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl MetricsBackend for ScriptedBackend {
        async fn vector_first(&self, _query: &str) -> Result<f64, MonitorError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.values[call.min(self.values.len() - 1)])
        }
    }

    fn agent_body(num_users: usize) -> JsonValue {
        json!({
            "message": "ok",
            "status": {"State": "running", "NumUsers": num_users, "NumErrors": 0}
        })
    }

    /// Agent answering every route with a fixed user count
    async fn stub_agent(server: &MockServer, num_users: usize) {
        Mock::given(method("POST"))
            .and(path("/loadagent/create"))
            .respond_with(ResponseTemplate::new(201).set_body_json(agent_body(0)))
            .mount(server)
            .await;
        for route in ["run", "stop"] {
            Mock::given(method("POST"))
                .and(path(format!("/loadagent/lt0/{}", route)))
                .respond_with(ResponseTemplate::new(200).set_body_json(agent_body(num_users)))
                .mount(server)
                .await;
        }
        Mock::given(method("GET"))
            .and(path("/loadagent/lt0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(agent_body(num_users)))
            .mount(server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/loadagent/lt0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(agent_body(0)))
            .mount(server)
            .await;
    }

    fn config(server: &MockServer) -> CoordinatorConfig {
        CoordinatorConfig {
            cluster: ClusterConfig {
                agents: vec![AgentEndpoint {
                    id: "lt0".to_string(),
                    api_url: server.uri(),
                }],
                max_active_users: 100,
            },
            monitor: MonitorConfig {
                prometheus_url: "http://localhost:9090".to_string(),
                update_interval: Duration::from_millis(50),
                queries: vec![PrometheusQuery {
                    description: "Request latency".to_string(),
                    query: "latency".to_string(),
                    threshold: 1.0,
                    alert: true,
                    min_interval: Duration::ZERO,
                }],
            },
            num_users_inc: 4,
            num_users_dec: 3,
            rest_time: Duration::from_secs(1),
            ..Default::default()
        }
    }

    async fn wait_for_request(server: &MockServer, suffix: &str) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let requests = server.received_requests().await.unwrap_or_default();
                if requests.iter().any(|r| r.url.path().ends_with(suffix)) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("no request to {} received", suffix));
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let server = MockServer::start().await;
        stub_agent(&server, 0).await;
        Mock::given(method("POST"))
            .and(path("/loadagent/lt0/addusers"))
            .respond_with(ResponseTemplate::new(200).set_body_json(agent_body(4)))
            .mount(&server)
            .await;

        let coordinator =
            Coordinator::with_backend(config(&server), LoadTestConfig::default(), ScriptedBackend::new(&[0.0]))
                .unwrap();
        assert!(matches!(coordinator.stop().await, Err(CoordinatorError::NotRunning)));

        let done = coordinator.run().await.unwrap();
        assert!(matches!(coordinator.run().await, Err(CoordinatorError::NotStopped)));
        assert_eq!(coordinator.status().await.state, State::Running);

        tokio::time::timeout(Duration::from_secs(5), coordinator.stop())
            .await
            .unwrap()
            .unwrap();
        assert!(done.is_done());

        let status = coordinator.status().await;
        assert_eq!(status.state, State::Done);
        assert!(status.start_time.is_some());
        assert!(status.stop_time >= status.start_time);

        assert!(matches!(coordinator.run().await, Err(CoordinatorError::AlreadyDone)));
        assert!(matches!(coordinator.stop().await, Err(CoordinatorError::NotRunning)));
        assert!(matches!(
            coordinator.inject_action("Reload").await,
            Err(CoordinatorError::NotRunning)
        ));
    }

    #[tokio::test]
    async fn test_increments_while_quiet() {
        let server = MockServer::start().await;
        stub_agent(&server, 0).await;
        Mock::given(method("POST"))
            .and(path("/loadagent/lt0/addusers"))
            .and(query_param("amount", "4"))
            .respond_with(ResponseTemplate::new(200).set_body_json(agent_body(4)))
            .expect(1..)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/loadagent/lt0/removeusers"))
            .respond_with(ResponseTemplate::new(200).set_body_json(agent_body(0)))
            .expect(0)
            .mount(&server)
            .await;

        let coordinator =
            Coordinator::with_backend(config(&server), LoadTestConfig::default(), ScriptedBackend::new(&[0.0]))
                .unwrap();
        coordinator.run().await.unwrap();
        wait_for_request(&server, "/addusers").await;
        coordinator.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_decrements_on_alert() {
        let server = MockServer::start().await;
        stub_agent(&server, 10).await;
        Mock::given(method("POST"))
            .and(path("/loadagent/lt0/removeusers"))
            .and(query_param("amount", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(agent_body(7)))
            .expect(1..)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/loadagent/lt0/addusers"))
            .respond_with(ResponseTemplate::new(200).set_body_json(agent_body(10)))
            .expect(0)
            .mount(&server)
            .await;

        let coordinator =
            Coordinator::with_backend(config(&server), LoadTestConfig::default(), ScriptedBackend::new(&[5.0]))
                .unwrap();
        coordinator.run().await.unwrap();
        wait_for_request(&server, "/removeusers").await;
        coordinator.stop().await.unwrap();

        let status = coordinator.status().await;
        assert_eq!(status.state, State::Done);
        assert_eq!(status.supported_users, 0);
    }

    #[tokio::test]
    async fn test_supported_users_after_rest() {
        let server = MockServer::start().await;
        stub_agent(&server, 10).await;
        for route in ["addusers", "removeusers"] {
            Mock::given(method("POST"))
                .and(path(format!("/loadagent/lt0/{}", route)))
                .respond_with(ResponseTemplate::new(200).set_body_json(agent_body(10)))
                .mount(&server)
                .await;
        }

        // One alert, then quiet
        let coordinator =
            Coordinator::with_backend(config(&server), LoadTestConfig::default(), ScriptedBackend::new(&[5.0, 0.0]))
                .unwrap();
        coordinator.run().await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while coordinator.status().await.supported_users == 0 {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await
        .unwrap();

        coordinator.stop().await.unwrap();
        let status = coordinator.status().await;
        assert_eq!(status.supported_users, 10);
        assert_eq!(status.active_users, 10);
    }

    #[tokio::test]
    async fn test_failed_cluster_start_keeps_stopped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/loadagent/create"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "load-test agent with id lt0 already exists"})))
            .mount(&server)
            .await;

        let coordinator =
            Coordinator::with_backend(config(&server), LoadTestConfig::default(), ScriptedBackend::new(&[0.0]))
                .unwrap();
        assert!(matches!(coordinator.run().await, Err(CoordinatorError::Cluster(_))));
        assert_eq!(coordinator.status().await.state, State::Stopped);
    }

    #[test]
    fn test_invalid_config() {
        let mut config = CoordinatorConfig::default();
        config.num_users_inc = 0;
        assert!(matches!(
            Coordinator::with_backend(config, LoadTestConfig::default(), ScriptedBackend::new(&[0.0])),
            Err(CoordinatorError::Config(_))
        ));
    }
}
