//! A fixed set of load-test agents driven as one

pub mod distribution;

pub use distribution::{addition_distribution, deletion_distribution};

use crate::error::ClusterError;
use futures::future::join_all;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use surge_agent::{http_client, AgentError, LoadAgent, LoadAgentConfig};
use surge_config::{ClusterConfig, HttpConfig, LoadTestConfig, Validatable};
use tracing::{debug, error, info};

/// Aggregate status of a cluster
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClusterStatus {
    /// Users currently active across all agents
    pub active_users: usize,
    /// Errors reported by all agents, including those lost to agent restarts
    pub num_errors: u64,
}

/// Error bookkeeping for one agent.
///
/// A remote load-test that gets recreated starts counting errors from zero
/// again. Whatever it had reported before is moved into `total`.
#[derive(Debug, Default, Clone, Copy)]
struct ErrorTrack {
    last: u64,
    total: u64,
}

impl ErrorTrack {
    fn observe(&mut self, current: u64) -> u64 {
        if current < self.last {
            self.total += self.last;
        }
        self.last = current;
        current + self.total
    }
}

#[derive(Debug, Clone, Copy)]
enum Scale {
    Up,
    Down,
}

/// Coordinator-side handle on every agent of a cluster
pub struct Cluster {
    config: ClusterConfig,
    agents: Vec<LoadAgent>,
    errors: Mutex<Vec<ErrorTrack>>,
}

impl Cluster {
    /// Build handles for every configured agent. No request is issued until
    /// [`Cluster::run`].
    pub fn new(
        config: ClusterConfig,
        load_test_config: LoadTestConfig,
        http: &HttpConfig,
    ) -> Result<Self, ClusterError> {
        config.validate()?;
        if config.agents.is_empty() {
            return Err(ClusterError::NoAgents);
        }

        let client = http_client(http).map_err(AgentError::ClientBuild)?;
        let agents = config
            .agents
            .iter()
            .map(|endpoint| {
                LoadAgent::with_client(
                    LoadAgentConfig::new(endpoint, load_test_config.clone()),
                    client.clone(),
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            errors: Mutex::new(vec![ErrorTrack::default(); agents.len()]),
            config,
            agents,
        })
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn agents(&self) -> &[LoadAgent] {
        &self.agents
    }

    /// Start every agent in order, stopping at the first failure. Agents
    /// started before the failure keep running.
    pub async fn run(&self) -> Result<(), ClusterError> {
        for agent in &self.agents {
            agent.start().await?;
        }
        info!(num_agents = self.agents.len(), "Cluster started");
        Ok(())
    }

    /// Stop every agent in order, stopping at the first failure
    pub async fn stop(&self) -> Result<(), ClusterError> {
        for agent in &self.agents {
            agent.stop().await?;
        }
        info!(num_agents = self.agents.len(), "Cluster stopped");
        Ok(())
    }

    /// Destroy every agent's load-test, whatever happens to the others.
    /// Failures are logged.
    pub async fn shutdown(&self) {
        let results = join_all(self.agents.iter().map(|agent| agent.destroy())).await;
        for (agent, result) in self.agents.iter().zip(results) {
            if let Err(e) = result {
                error!(agent_id = %agent.id(), error = %e, "Failed to shut down agent");
            }
        }
        info!(num_agents = self.agents.len(), "Cluster shut down");
    }

    /// Spread `n` new users over the agents, favouring the least loaded
    pub async fn increment_users(&self, n: usize) -> Result<(), ClusterError> {
        let owed = addition_distribution(&self.user_amounts(), n)?;
        self.scale(owed, Scale::Up).await
    }

    /// Remove `n` users from the agents, favouring the most loaded
    pub async fn decrement_users(&self, n: usize) -> Result<(), ClusterError> {
        let owed = deletion_distribution(&self.user_amounts(), n)?;
        self.scale(owed, Scale::Down).await
    }

    /// Ask every user on every agent to perform `action` once. Every agent
    /// is tried and all failures are returned together.
    pub async fn inject_action(&self, action: &str) -> Result<(), ClusterError> {
        let results = join_all(self.agents.iter().map(|agent| agent.inject_action(action))).await;

        let failures: Vec<AgentError> = self
            .agents
            .iter()
            .zip(results)
            .filter_map(|(agent, result)| {
                let e = result.err()?;
                error!(agent_id = %agent.id(), action = %action, error = %e, "Failed to inject action");
                Some(e)
            })
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ClusterError::InjectFailed(failures))
        }
    }

    /// Fetch the current status of every agent. Agents that cannot be
    /// reached keep their last known status.
    pub async fn refresh_status(&self) {
        let results = join_all(self.agents.iter().map(|agent| agent.status())).await;
        for (agent, result) in self.agents.iter().zip(results) {
            if let Err(e) = result {
                error!(agent_id = %agent.id(), error = %e, "Failed to get status for agent");
            }
        }
    }

    /// Sum of the last known agent statuses
    pub fn status(&self) -> ClusterStatus {
        let mut errors = self.errors.lock();
        let mut status = ClusterStatus::default();

        for (agent, track) in self.agents.iter().zip(errors.iter_mut()) {
            let agent_status = agent.cached_status();
            status.active_users += agent_status.num_users;
            status.num_errors += track.observe(agent_status.num_errors);
        }

        status
    }

    fn user_amounts(&self) -> Vec<usize> {
        self.agents
            .iter()
            .map(|agent| agent.cached_status().num_users)
            .collect()
    }

    async fn scale(&self, owed: Vec<usize>, direction: Scale) -> Result<(), ClusterError> {
        let mut applied = Vec::new();

        for (agent, amount) in self.agents.iter().zip(owed) {
            if amount == 0 {
                continue;
            }

            let result = match direction {
                Scale::Up => agent.add_users(amount).await,
                Scale::Down => agent.remove_users(amount).await,
            };
            if let Err(source) = result {
                return Err(ClusterError::PartialFailure { applied, source });
            }

            debug!(agent_id = %agent.id(), amount, ?direction, "Agent users updated");
            applied.push((agent.id().to_string(), amount));
        }

        Ok(())
    }
}
