//! Wait group tracking running controllers

use std::sync::Arc;
use tokio::sync::watch;

/// Counts running controllers so `stop` can wait for all of them to exit
#[derive(Debug, Clone)]
pub struct WaitGroup {
    count: Arc<watch::Sender<usize>>,
}

impl WaitGroup {
    pub fn new() -> Self {
        let (count, _) = watch::channel(0);
        Self {
            count: Arc::new(count),
        }
    }

    pub fn add(&self, n: usize) {
        self.count.send_modify(|count| *count += n);
    }

    pub fn done(&self) {
        self.count.send_modify(|count| *count = count.saturating_sub(1));
    }

    pub fn count(&self) -> usize {
        *self.count.borrow()
    }

    /// Resolve once the count drops to zero
    pub async fn wait(&self) {
        let mut rx = self.count.subscribe();
        // The sender lives in self, so the channel cannot close here
        let _ = rx.wait_for(|count| *count == 0).await;
    }
}

impl Default for WaitGroup {
    fn default() -> Self {
        Self::new()
    }
}
