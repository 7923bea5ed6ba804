//! Agent client against a live in-process agent API

mod common;

use anyhow::Result;
use common::{init_tracing, load_test_config, AgentServer};
use surge_agent::{AgentError, AgentPhase, LoadAgent, LoadAgentConfig};
use surge_config::HttpConfig;
use surge_loadtest::State;

fn agent(server: &AgentServer, id: &str, max_active_users: usize) -> Result<LoadAgent> {
    let config = LoadAgentConfig {
        id: id.to_string(),
        api_url: server.url(),
        load_test_config: load_test_config(max_active_users),
    };
    Ok(LoadAgent::new(config, &HttpConfig::default())?)
}

#[tokio::test]
async fn test_agent_lifecycle() -> Result<()> {
    init_tracing();
    let server = AgentServer::start().await?;
    let agent = agent(&server, "lt0", 50)?;

    agent.start().await?;
    assert_eq!(agent.phase(), AgentPhase::Running);
    assert_eq!(agent.cached_status().state, State::Running);
    assert!(server.load_tester("lt0").await.is_some());

    agent.add_users(5).await?;
    assert_eq!(agent.cached_status().num_users, 5);
    agent.remove_users(2).await?;
    assert_eq!(agent.cached_status().num_users, 3);
    agent.inject_action("Reload").await?;

    agent.stop().await?;
    assert_eq!(agent.phase(), AgentPhase::Stopped);
    assert_eq!(agent.cached_status().state, State::Stopped);
    assert_eq!(agent.cached_status().num_users, 0);

    // Restarting reuses the remote load-test
    agent.start().await?;
    assert_eq!(agent.cached_status().state, State::Running);
    assert_eq!(server.len().await, 1);

    agent.destroy().await?;
    assert_eq!(agent.phase(), AgentPhase::Destroyed);
    assert_eq!(server.len().await, 0);
    assert!(matches!(agent.status().await, Err(AgentError::NotFound { .. })));

    agent.destroy().await?;
    Ok(())
}

#[tokio::test]
async fn test_partial_add_reports_error() -> Result<()> {
    init_tracing();
    let server = AgentServer::start().await?;
    let agent = agent(&server, "lt0", 3)?;
    agent.start().await?;

    let err = agent.add_users(5).await.unwrap_err();
    match err {
        AgentError::Api { message, .. } => assert!(message.contains("max active users")),
        other => panic!("unexpected error: {}", other),
    }
    // The failed request leaves the cache alone, a refresh shows what happened
    assert_eq!(agent.cached_status().num_users, 0);
    let status = agent.status().await?;
    assert_eq!(status.num_users, 3);
    assert_eq!(status.num_users_added, 3);

    let err = agent.remove_users(4).await.unwrap_err();
    assert!(matches!(err, AgentError::Api { .. }));
    assert_eq!(agent.status().await?.num_users, 0);

    agent.destroy().await?;
    Ok(())
}

#[tokio::test]
async fn test_state_errors_surface_from_remote() -> Result<()> {
    init_tracing();
    let server = AgentServer::start().await?;
    let agent = agent(&server, "lt0", 10)?;

    // Nothing created yet
    assert!(matches!(agent.stop().await, Err(AgentError::NotFound { .. })));

    agent.start().await?;
    // Same id from a second client collides on create
    let twin = self::agent(&server, "lt0", 10)?;
    match twin.start().await {
        Err(AgentError::Api { message, .. }) => assert!(message.contains("already exists")),
        other => panic!("unexpected result: {:?}", other.err()),
    }
    assert_eq!(twin.phase(), AgentPhase::Idle);

    agent.stop().await?;
    match agent.add_users(1).await {
        Err(AgentError::Api { message, .. }) => assert!(message.contains("not running")),
        other => panic!("unexpected result: {:?}", other.err()),
    }
    assert!(matches!(agent.stop().await, Err(AgentError::Api { .. })));

    agent.destroy().await?;
    Ok(())
}
