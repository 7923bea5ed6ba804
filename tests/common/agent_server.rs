//! In-process agent serving the load-test control API over HTTP
//!
//! Every load-test it creates is a real `LoadTester` driving no-op
//! controllers, so the agent client, cluster and coordinator can be
//! exercised end to end on one machine.

use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use surge_agent::{AgentResponse, CreateRequest};
use surge_loadtest::{LoadTestError, LoadTester, NoopController};
use tokio::net::TcpListener;
use tokio::sync::RwLock;

type LoadTesters = Arc<RwLock<HashMap<String, Arc<LoadTester>>>>;

#[derive(Clone, Default)]
struct AgentState {
    load_testers: LoadTesters,
}

struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(AgentResponse::error(self.1))).into_response()
    }
}

impl From<LoadTestError> for ApiError {
    fn from(e: LoadTestError) -> Self {
        ApiError(StatusCode::BAD_REQUEST, e.to_string())
    }
}

type ApiResult = Result<(StatusCode, Json<AgentResponse>), ApiError>;

fn ok(message: impl Into<String>, load_tester: &LoadTester) -> ApiResult {
    Ok((
        StatusCode::OK,
        Json(AgentResponse {
            message: Some(message.into()),
            status: Some(load_tester.status()),
            ..Default::default()
        }),
    ))
}

#[derive(Deserialize)]
struct CreateParams {
    id: String,
}

#[derive(Deserialize)]
struct AmountParams {
    amount: usize,
}

#[derive(Deserialize)]
struct ActionParams {
    action: String,
}

async fn lookup(state: &AgentState, id: &str) -> Result<Arc<LoadTester>, ApiError> {
    state
        .load_testers
        .read()
        .await
        .get(id)
        .cloned()
        .ok_or_else(|| ApiError(StatusCode::NOT_FOUND, format!("load-test agent with id {} not found", id)))
}

async fn create(
    State(state): State<AgentState>,
    Query(params): Query<CreateParams>,
    Json(request): Json<CreateRequest>,
) -> ApiResult {
    let mut load_testers = state.load_testers.write().await;
    if load_testers.contains_key(&params.id) {
        return Err(ApiError(
            StatusCode::BAD_REQUEST,
            format!("load-test agent with id {} already exists", params.id),
        ));
    }

    let load_tester = Arc::new(LoadTester::new(request.load_test_config, NoopController::factory())?);
    let status = load_tester.status();
    load_testers.insert(params.id.clone(), load_tester);

    Ok((
        StatusCode::CREATED,
        Json(AgentResponse {
            id: Some(params.id),
            message: Some("load-test agent created".to_string()),
            status: Some(status),
            error: None,
        }),
    ))
}

async fn run(State(state): State<AgentState>, Path(id): Path<String>) -> ApiResult {
    let load_tester = lookup(&state, &id).await?;
    load_tester.run().await?;
    ok("load-test agent started", &load_tester)
}

async fn stop(State(state): State<AgentState>, Path(id): Path<String>) -> ApiResult {
    let load_tester = lookup(&state, &id).await?;
    load_tester.stop().await?;
    ok("load-test agent stopped", &load_tester)
}

async fn add_users(
    State(state): State<AgentState>,
    Path(id): Path<String>,
    Query(params): Query<AmountParams>,
) -> ApiResult {
    let load_tester = lookup(&state, &id).await?;
    let (completed, error) = match load_tester.add_users(params.amount).await {
        Ok(n) => (n, None),
        Err(e) => (e.completed, Some(e.error.to_string())),
    };

    Ok((
        StatusCode::OK,
        Json(AgentResponse {
            message: Some(format!("{} users added", completed)),
            status: Some(load_tester.status()),
            error,
            ..Default::default()
        }),
    ))
}

async fn remove_users(
    State(state): State<AgentState>,
    Path(id): Path<String>,
    Query(params): Query<AmountParams>,
) -> ApiResult {
    let load_tester = lookup(&state, &id).await?;
    let (completed, error) = match load_tester.remove_users(params.amount).await {
        Ok(n) => (n, None),
        Err(e) => (e.completed, Some(e.error.to_string())),
    };

    Ok((
        StatusCode::OK,
        Json(AgentResponse {
            message: Some(format!("{} users removed", completed)),
            status: Some(load_tester.status()),
            error,
            ..Default::default()
        }),
    ))
}

async fn inject(
    State(state): State<AgentState>,
    Path(id): Path<String>,
    Query(params): Query<ActionParams>,
) -> ApiResult {
    let load_tester = lookup(&state, &id).await?;
    load_tester.inject_action(&params.action).await?;
    ok(format!("action {} injected", params.action), &load_tester)
}

async fn status(State(state): State<AgentState>, Path(id): Path<String>) -> ApiResult {
    let load_tester = lookup(&state, &id).await?;
    Ok((
        StatusCode::OK,
        Json(AgentResponse {
            status: Some(load_tester.status()),
            ..Default::default()
        }),
    ))
}

async fn destroy(State(state): State<AgentState>, Path(id): Path<String>) -> ApiResult {
    let load_tester = state
        .load_testers
        .write()
        .await
        .remove(&id)
        .ok_or_else(|| ApiError(StatusCode::NOT_FOUND, format!("load-test agent with id {} not found", id)))?;

    match load_tester.stop().await {
        Ok(()) | Err(LoadTestError::NotRunning) => {}
        Err(e) => return Err(e.into()),
    }
    ok("load-test agent destroyed", &load_tester)
}

/// A running agent API bound to a random local port
pub struct AgentServer {
    pub addr: SocketAddr,
    load_testers: LoadTesters,
}

impl AgentServer {
    pub async fn start() -> Result<Self> {
        let state = AgentState::default();
        let load_testers = state.load_testers.clone();

        let app = Router::new()
            .route("/loadagent/create", post(create))
            .route("/loadagent/{id}", get(status).delete(destroy))
            .route("/loadagent/{id}/status", get(status))
            .route("/loadagent/{id}/run", post(run))
            .route("/loadagent/{id}/stop", post(stop))
            .route("/loadagent/{id}/addusers", post(add_users))
            .route("/loadagent/{id}/removeusers", post(remove_users))
            .route("/loadagent/{id}/inject", post(inject))
            .with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Ok(Self { addr, load_testers })
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// The load-test hosted under `id`, if any
    pub async fn load_tester(&self, id: &str) -> Option<Arc<LoadTester>> {
        self.load_testers.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.load_testers.read().await.len()
    }
}
