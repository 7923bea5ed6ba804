//! Domain-driven configuration management for surge
//!
//! Configuration is split by component (load-test engine, agent cluster,
//! performance monitor, coordinator, HTTP client, logging). Each domain has
//! serde defaults and implements [`Validatable`], and [`ConfigLoader`] reads
//! YAML or JSON files with `SURGE_*` environment overrides.

pub mod error;
pub mod loader;
pub mod validation;

// Domain-specific configuration modules
pub mod domains;

// Re-export main types
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use validation::Validatable;

// Re-export domain configurations
pub use domains::{
    cluster::{AgentEndpoint, ClusterConfig},
    coordinator::CoordinatorConfig,
    http::HttpConfig,
    loadtest::{
        ConnectionConfiguration, ControllerType, LoadTestConfig, RatesDistribution,
        UserControllerConfiguration, UsersConfiguration,
    },
    logging::{LogFormat, LogLevel, LoggingConfig},
    monitor::{MonitorConfig, PrometheusQuery},
    SurgeConfig,
};
