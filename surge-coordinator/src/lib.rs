//! Feedback-controlled load generation across a cluster of agents
//!
//! A [`Coordinator`] starts every agent of a [`Cluster`], watches the target
//! system through a performance [`Monitor`] and keeps adding users until the
//! monitor raises alerts. It then backs off, rests, and records the highest
//! user count that held steady.

pub mod cluster;
pub mod coordinator;
pub mod error;
pub mod performance;
pub mod status;

pub use cluster::{Cluster, ClusterStatus};
pub use coordinator::{Coordinator, DoneSignal};
pub use error::{ClusterError, CoordinatorError, MonitorError};
pub use performance::{MetricsBackend, Monitor, PerformanceStatus, PrometheusBackend, QueryResult};
pub use status::{State, Status};
