//! State shared by every controller of one engine
//!
//! Controllers coordinating on global goals (how many teams, channels or
//! posts the whole load-test should create) need counters visible to all of
//! them. One [`SharedState`] is owned by each `LoadTester` and handed to
//! controllers through their construction context.

use parking_lot::RwLock;
use std::collections::HashMap;

/// A thread that controllers keep replying to for a long time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadInfo {
    pub id: String,
    pub channel_id: String,
    pub team_id: String,
}

#[derive(Debug, Default)]
pub struct SharedState {
    targets: RwLock<HashMap<String, i64>>,
    long_running_threads: RwLock<HashMap<String, ThreadInfo>>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the counter for `target` unless it already reached `limit`.
    /// Returns whether the counter was incremented.
    pub fn inc(&self, target: &str, limit: i64) -> bool {
        let mut targets = self.targets.write();
        let value = targets.entry(target.to_string()).or_insert(0);
        if *value >= limit {
            return false;
        }
        *value += 1;
        true
    }

    /// Give back a unit taken with [`inc`](Self::inc), typically after the
    /// action it reserved failed
    pub fn dec(&self, target: &str) {
        let mut targets = self.targets.write();
        *targets.entry(target.to_string()).or_insert(0) -= 1;
    }

    pub fn get(&self, target: &str) -> i64 {
        self.targets.read().get(target).copied().unwrap_or(0)
    }

    pub fn set_long_running_thread(&self, thread: ThreadInfo) {
        self.long_running_threads
            .write()
            .insert(thread.id.clone(), thread);
    }

    pub fn long_running_threads_in_channel(&self, channel_id: &str) -> Vec<ThreadInfo> {
        self.long_running_threads
            .read()
            .values()
            .filter(|thread| thread.channel_id == channel_id)
            .cloned()
            .collect()
    }
}
