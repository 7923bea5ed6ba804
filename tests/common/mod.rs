//! Shared helpers for the integration tests
#![allow(dead_code)]

pub mod agent_server;

pub use agent_server::AgentServer;

use std::future::Future;
use std::time::Duration;
use surge_config::LoadTestConfig;

/// Quiet logging for test runs. Safe to call from every test.
pub fn init_tracing() {
    let _ = surge_logging::init_simple_tracing("warn");
}

/// Load-test configuration small enough for any file limit
pub fn load_test_config(max_active_users: usize) -> LoadTestConfig {
    let mut config = LoadTestConfig::default();
    config.users_configuration.max_active_users = max_active_users;
    config
}

/// Poll `check` until it holds or `timeout` expires
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    tokio::time::timeout(timeout, async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    })
    .await
    .is_ok()
}
