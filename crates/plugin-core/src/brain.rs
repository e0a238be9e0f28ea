//! Shared persistent key-value store ("brain").
//!
//! One handle is created at startup and cloned into every
//! [`PluginContext`](crate::PluginContext); there is no ambient global.
//! Individual key operations are atomic (single lock), which is the only
//! consistency guarantee callers get — read-then-write sequences are not.

use std::{collections::HashMap, fs, path::PathBuf, sync::Arc};

use anyhow::{Context as _, Result};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::error;

#[derive(Debug, Default)]
struct BrainInner {
    data: HashMap<String, Value>,
    path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct Brain {
    inner: Arc<RwLock<BrainInner>>,
}

impl Brain {
    /// Volatile store, used by tests and as a fallback when no brain file
    /// is configured.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load the brain from a JSON file, starting empty when the file does
    /// not exist yet. Mutations are written back to the same file.
    pub fn load(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("reading brain file at {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("parsing brain file at {}", path.display()))?
        } else {
            HashMap::new()
        };
        Ok(Self {
            inner: Arc::new(RwLock::new(BrainInner {
                data,
                path: Some(path),
            })),
        })
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        let inner = self.inner.read().await;
        inner.data.get(key).cloned()
    }

    pub async fn set(&self, key: impl Into<String>, value: Value) {
        let mut inner = self.inner.write().await;
        inner.data.insert(key.into(), value);
        persist(&inner);
    }

    pub async fn remove(&self, key: &str) -> Option<Value> {
        let mut inner = self.inner.write().await;
        let removed = inner.data.remove(key);
        if removed.is_some() {
            persist(&inner);
        }
        removed
    }

    /// Snapshot of all keys under a prefix; used by the dedup sweep.
    pub async fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let inner = self.inner.read().await;
        inner
            .data
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.data.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.data.is_empty()
    }
}

/// A persistence failure drops the write to disk but keeps the in-memory
/// state; the process stays up.
fn persist(inner: &BrainInner) {
    let Some(path) = inner.path.as_ref() else {
        return;
    };
    let serialized = match serde_json::to_string_pretty(&inner.data) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "Failed to serialize brain");
            return;
        }
    };
    if let Err(e) = fs::write(path, serialized) {
        error!(error = %e, path = %path.display(), "Failed to persist brain");
    }
}
