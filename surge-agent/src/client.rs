//! Remote load-test agent client

use crate::errors::AgentError;
use crate::types::{AgentPhase, AgentResponse, CreateRequest};
use parking_lot::RwLock;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::{Map, Value as JsonValue};
use surge_config::validation::{validate_agent_id, validate_url};
use surge_config::{AgentEndpoint, ConfigResult, HttpConfig, LoadTestConfig, Validatable};
use surge_loadtest::Status;
use tracing::{debug, info};

/// Build the HTTP client used to talk to agents and metrics backends
pub fn http_client(config: &HttpConfig) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder().user_agent(config.user_agent.as_str());
    if let Some(timeout) = config.timeout {
        builder = builder.timeout(timeout);
    }
    builder.build()
}

/// Configuration of one remote agent
#[derive(Debug, Clone, PartialEq)]
pub struct LoadAgentConfig {
    /// Id of the load-test resource on the agent
    pub id: String,
    /// Base URL of the agent control API
    pub api_url: String,
    /// Load-test configuration sent on creation
    pub load_test_config: LoadTestConfig,
}

impl LoadAgentConfig {
    pub fn new(endpoint: &AgentEndpoint, load_test_config: LoadTestConfig) -> Self {
        Self {
            id: endpoint.id.clone(),
            api_url: endpoint.api_url.clone(),
            load_test_config,
        }
    }
}

impl Validatable for LoadAgentConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_agent_id(&self.id, "id", self.domain_name())?;
        validate_url(&self.api_url, "api_url", self.domain_name())?;
        self.load_test_config.validate()
    }

    fn domain_name(&self) -> &'static str {
        "agent"
    }
}

/// Handle on a load-test living in a remote agent process.
///
/// Every operation is one request to the agent control API. Successful
/// responses replace the cached [`Status`]; failures leave it untouched.
pub struct LoadAgent {
    config: LoadAgentConfig,
    controller_config: Map<String, JsonValue>,
    client: Client,
    status: RwLock<Status>,
    phase: RwLock<AgentPhase>,
}

impl LoadAgent {
    /// Create a handle with its own HTTP client
    pub fn new(config: LoadAgentConfig, http: &HttpConfig) -> Result<Self, AgentError> {
        let client = http_client(http).map_err(AgentError::ClientBuild)?;
        Self::with_client(config, client)
    }

    /// Create a handle sharing an existing HTTP client
    pub fn with_client(config: LoadAgentConfig, client: Client) -> Result<Self, AgentError> {
        config.validate()?;

        Ok(Self {
            config,
            controller_config: Map::new(),
            client,
            status: RwLock::new(Status::default()),
            phase: RwLock::new(AgentPhase::Idle),
        })
    }

    /// Controller family settings sent along with the load-test
    /// configuration on creation
    pub fn with_controller_config(mut self, controller_config: Map<String, JsonValue>) -> Self {
        self.controller_config = controller_config;
        self
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn phase(&self) -> AgentPhase {
        *self.phase.read()
    }

    /// Status returned by the last successful request
    pub fn cached_status(&self) -> Status {
        self.status.read().clone()
    }

    /// Create the remote load-test if needed, then run it.
    ///
    /// The two steps are separate requests. When running fails after a
    /// successful create, the agent stays [`AgentPhase::Created`] and a
    /// later call only retries the run step.
    pub async fn start(&self) -> Result<(), AgentError> {
        if matches!(self.phase(), AgentPhase::Idle | AgentPhase::Destroyed) {
            let mut load_test_config = self.config.load_test_config.clone();
            load_test_config.users_configuration.initial_active_users = 0;
            let body = CreateRequest {
                load_test_config,
                controller_config: self.controller_config.clone(),
            };

            let request = self
                .client
                .post(self.url("/loadagent/create"))
                .query(&[("id", self.id())])
                .json(&body);
            self.api_request(request).await?;
            self.set_phase(AgentPhase::Created);
            debug!(agent_id = %self.id(), "Agent load-test created");
        }

        self.api_request(self.client.post(self.resource_url("/run")))
            .await?;
        self.set_phase(AgentPhase::Running);

        info!(agent_id = %self.id(), "Agent started");
        Ok(())
    }

    /// Stop the remote load-test, keeping it around for a later start
    pub async fn stop(&self) -> Result<(), AgentError> {
        self.api_request(self.client.post(self.resource_url("/stop")))
            .await?;
        self.set_phase(AgentPhase::Stopped);

        info!(agent_id = %self.id(), "Agent stopped");
        Ok(())
    }

    /// Stop and remove the remote load-test. Removing a load-test the agent
    /// does not know is not an error.
    pub async fn destroy(&self) -> Result<(), AgentError> {
        match self
            .api_request(self.client.delete(self.resource_url("")))
            .await
        {
            Ok(_) => info!(agent_id = %self.id(), "Agent destroyed"),
            Err(AgentError::NotFound { .. }) => {
                debug!(agent_id = %self.id(), "Agent load-test already gone")
            }
            Err(e) => return Err(e),
        }

        self.set_phase(AgentPhase::Destroyed);
        Ok(())
    }

    pub async fn add_users(&self, amount: usize) -> Result<(), AgentError> {
        let request = self
            .client
            .post(self.resource_url("/addusers"))
            .query(&[("amount", amount)]);
        self.api_request(request).await?;
        Ok(())
    }

    pub async fn remove_users(&self, amount: usize) -> Result<(), AgentError> {
        let request = self
            .client
            .post(self.resource_url("/removeusers"))
            .query(&[("amount", amount)]);
        self.api_request(request).await?;
        Ok(())
    }

    /// Ask every user of the remote load-test to perform `action` once
    pub async fn inject_action(&self, action: &str) -> Result<(), AgentError> {
        let request = self
            .client
            .post(self.resource_url("/inject"))
            .query(&[("action", action)]);
        self.api_request(request).await?;
        Ok(())
    }

    /// Fetch the current status from the agent and refresh the cache
    pub async fn status(&self) -> Result<Status, AgentError> {
        self.api_request(self.client.get(self.resource_url("")))
            .await?;
        Ok(self.cached_status())
    }

    fn set_phase(&self, phase: AgentPhase) {
        *self.phase.write() = phase;
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_url.trim_end_matches('/'), path)
    }

    fn resource_url(&self, suffix: &str) -> String {
        self.url(&format!("/loadagent/{}{}", self.config.id, suffix))
    }

    async fn api_request(&self, request: RequestBuilder) -> Result<AgentResponse, AgentError> {
        let agent_id = || self.config.id.clone();

        let response = request.send().await.map_err(|source| AgentError::Network {
            agent_id: agent_id(),
            source,
        })?;

        let code = response.status();
        if code == StatusCode::NOT_FOUND {
            return Err(AgentError::NotFound { agent_id: agent_id() });
        }

        let bytes = response.bytes().await.map_err(|source| AgentError::Network {
            agent_id: agent_id(),
            source,
        })?;

        let body: AgentResponse = match serde_json::from_slice(&bytes) {
            Ok(body) => body,
            Err(_) if !code.is_success() => {
                return Err(AgentError::BadStatus {
                    agent_id: agent_id(),
                    status: code.as_u16(),
                })
            }
            Err(source) => {
                return Err(AgentError::Decode {
                    agent_id: agent_id(),
                    source,
                })
            }
        };

        if let Some(message) = body.error_message() {
            return Err(AgentError::Api {
                agent_id: agent_id(),
                message: message.to_string(),
            });
        }
        if !code.is_success() {
            return Err(AgentError::BadStatus {
                agent_id: agent_id(),
                status: code.as_u16(),
            });
        }

        if let Some(status) = &body.status {
            *self.status.write() = status.clone();
        }
        Ok(body)
    }
}
