//! Agent cluster configuration

use crate::error::ConfigResult;
use crate::validation::{validate_agent_id, validate_positive, validate_url, Validatable};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Where a load-test agent lives and how it is identified
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentEndpoint {
    /// Identifier of the agent's load-test resource, unique in the cluster
    pub id: String,

    /// Base URL of the agent control API
    pub api_url: String,
}

/// Cluster of load-test agents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Agents driven during the load-test. The length of this list is the
    /// number of agents.
    pub agents: Vec<AgentEndpoint>,

    /// Upper limit of concurrently active users across the whole cluster
    pub max_active_users: usize,
}

impl Default for AgentEndpoint {
    fn default() -> Self {
        Self {
            id: "lt0".to_string(),
            api_url: "http://localhost:4000".to_string(),
        }
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            agents: vec![AgentEndpoint::default()],
            max_active_users: 1000,
        }
    }
}

impl Validatable for AgentEndpoint {
    fn validate(&self) -> ConfigResult<()> {
        validate_agent_id(&self.id, "id", self.domain_name())?;
        validate_url(&self.api_url, "api_url", self.domain_name())
    }

    fn domain_name(&self) -> &'static str {
        "cluster.agents"
    }
}

impl Validatable for ClusterConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(self.max_active_users, "max_active_users", self.domain_name())?;

        let mut seen = HashSet::new();
        for agent in &self.agents {
            agent.validate()?;
            if !seen.insert(agent.id.as_str()) {
                return Err(self.validation_error(format!("duplicate agent id '{}'", agent.id)));
            }
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "cluster"
    }
}
