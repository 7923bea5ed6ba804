//! Engine state and status snapshots

use crate::error::LoadTestError;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Lifecycle of a `LoadTester`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum State {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl State {
    pub fn as_str(&self) -> &'static str {
        match self {
            State::Stopped => "stopped",
            State::Starting => "starting",
            State::Running => "running",
            State::Stopping => "stopping",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for State {
    type Err = LoadTestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stopped" => Ok(State::Stopped),
            "starting" => Ok(State::Starting),
            "running" => Ok(State::Running),
            "stopping" => Ok(State::Stopping),
            _ => Err(LoadTestError::InvalidState(s.to_string())),
        }
    }
}

impl Serialize for State {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for State {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

/// Snapshot of a load-test
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Status {
    pub state: State,
    /// Currently active users
    pub num_users: usize,
    /// Users added since the last start
    pub num_users_added: usize,
    /// Users removed since the last start
    pub num_users_removed: usize,
    /// Users whose controller has exited since the last start
    pub num_users_stopped: usize,
    /// Errors reported by controllers since the last start
    pub num_errors: u64,
    pub start_time: Option<DateTime<Utc>>,
}

/// Copy-on-write holder of the latest [`Status`].
///
/// Writers build a new snapshot and swap it in. Readers get an `Arc` to a
/// snapshot that never changes under them.
#[derive(Debug, Default)]
pub struct StatusCell {
    current: RwLock<Arc<Status>>,
}

impl StatusCell {
    pub fn new(status: Status) -> Self {
        Self {
            current: RwLock::new(Arc::new(status)),
        }
    }

    pub fn snapshot(&self) -> Arc<Status> {
        self.current.read().clone()
    }

    pub fn update(&self, f: impl FnOnce(&mut Status)) {
        let mut current = self.current.write();
        let mut next = Status::clone(&current);
        f(&mut next);
        *current = Arc::new(next);
    }
}
