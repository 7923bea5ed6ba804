//! Performance signal of the target system

pub mod backend;
pub mod monitor;

pub use backend::{MetricsBackend, PrometheusBackend};
pub use monitor::{Monitor, PerformanceStatus, QueryResult};
