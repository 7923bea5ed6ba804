//! Logging setup for surge
//!
//! All crates log through `tracing`. This crate installs the global
//! subscriber from a [`LoggingConfig`](surge_config::LoggingConfig).

pub mod init;

pub use init::{init_logging, init_simple_tracing};
