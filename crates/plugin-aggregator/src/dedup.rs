//! Time-windowed permalink dedup over the shared brain, plus the periodic
//! sweep that garbage-collects expired entries.

use core::time::Duration;
use std::sync::Arc;

use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use plugin_core::{Brain, Clock};

/// Namespace for dedup entries; unrelated brain keys are never touched.
pub const DEDUP_PREFIX: &str = "permalink_";

/// Suppression window. An entry with age >= the window is expired.
pub const DEDUP_WINDOW_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone)]
pub struct DedupStore {
    brain: Brain,
}

impl DedupStore {
    #[must_use]
    pub const fn new(brain: Brain) -> Self {
        Self { brain }
    }

    fn key(permalink: &str) -> String {
        format!("{DEDUP_PREFIX}{permalink}")
    }

    /// Epoch millis the permalink was last posted, if an entry exists.
    pub async fn last_posted(&self, permalink: &str) -> Option<i64> {
        self.brain
            .get(&Self::key(permalink))
            .await
            .and_then(|v| v.as_i64())
    }

    /// Write or refresh the entry for a permalink.
    pub async fn record(&self, permalink: &str, now_millis: i64) {
        self.brain.set(Self::key(permalink), json!(now_millis)).await;
    }

    pub async fn remove(&self, permalink: &str) {
        self.brain.remove(&Self::key(permalink)).await;
    }

    /// Remove every entry whose age has reached the window. Entries with
    /// non-numeric values are treated as expired. Returns the removal
    /// count. Idempotent; safe to race an in-flight aggregation.
    pub async fn sweep(&self, now_millis: i64) -> usize {
        let mut removed = 0;
        for key in self.brain.keys_with_prefix(DEDUP_PREFIX).await {
            let stale = match self.brain.get(&key).await.and_then(|v| v.as_i64()) {
                Some(ts) => now_millis - ts >= DEDUP_WINDOW_MS,
                None => true,
            };
            if stale {
                self.brain.remove(&key).await;
                removed += 1;
            }
        }
        debug!(removed, "dedup sweep complete");
        removed
    }
}

/// Handle for the background sweep task; dropping it does not stop the
/// task, call [`SweeperHandle::shutdown`] at process exit.
#[derive(Debug)]
pub struct SweeperHandle {
    task: JoinHandle<()>,
}

impl SweeperHandle {
    pub fn shutdown(self) {
        self.task.abort();
    }
}

/// Start the periodic garbage collector. Runs every `period` for the
/// lifetime of the process unless the handle is shut down.
pub fn start_sweeper(store: DedupStore, clock: Arc<dyn Clock>, period: Duration) -> SweeperHandle {
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // The immediate first tick would sweep at startup; skip it.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = store.sweep(clock.now_millis()).await;
            if removed > 0 {
                info!(removed, "garbage-collected expired permalink entries");
            }
        }
    });
    SweeperHandle { task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plugin_core::ManualClock;

    #[tokio::test]
    async fn sweep_removes_expired_and_keeps_fresh() {
        let brain = Brain::in_memory();
        let store = DedupStore::new(brain.clone());
        let now = 10 * DEDUP_WINDOW_MS;

        store.record("http://old", now - DEDUP_WINDOW_MS - 1).await;
        store.record("http://boundary", now - DEDUP_WINDOW_MS).await;
        store.record("http://fresh", now - DEDUP_WINDOW_MS + 1).await;
        brain.set("quotes", json!(["untouched"])).await;

        let removed = store.sweep(now).await;
        assert_eq!(removed, 2);
        assert_eq!(store.last_posted("http://old").await, None);
        assert_eq!(store.last_posted("http://boundary").await, None);
        assert!(store.last_posted("http://fresh").await.is_some());
        // Non-namespaced keys are untouched.
        assert_eq!(brain.get("quotes").await, Some(json!(["untouched"])));
    }

    #[tokio::test]
    async fn sweep_drops_malformed_entries() {
        let brain = Brain::in_memory();
        brain
            .set(format!("{DEDUP_PREFIX}http://junk"), json!("not-a-number"))
            .await;
        let store = DedupStore::new(brain);
        assert_eq!(store.sweep(0).await, 1);
    }

    #[tokio::test]
    async fn record_overwrites_previous_entry() {
        let store = DedupStore::new(Brain::in_memory());
        store.record("http://p", 1).await;
        store.record("http://p", 2).await;
        assert_eq!(store.last_posted("http://p").await, Some(2));
    }

    #[tokio::test]
    async fn sweeper_handle_aborts_task() {
        let store = DedupStore::new(Brain::in_memory());
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::default());
        let handle = start_sweeper(store, clock, Duration::from_secs(3600));
        handle.shutdown();
    }
}
