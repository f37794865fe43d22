//! Brain boundary: the key-value store consulted for enrichment and script
//! state.
//!
//! Persistence backends are external collaborators; the core depends only
//! on this contract. A one-time `loaded` notification lets adapters defer
//! work (such as presence subscription) until persisted state is available.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::watch;
use tracing::debug;

use crate::foundation::error::BrainResult;

/// Key-value store contract.
#[async_trait]
pub trait Brain: Send + Sync {
    /// Returns the value stored under `key`, if any.
    async fn get(&self, key: &str) -> Option<Value>;

    /// Stores `value` under `key`.
    async fn set(&self, key: &str, value: Value);

    /// Removes the value stored under `key`.
    async fn remove(&self, key: &str);

    /// Persists the current state to the backing store.
    async fn save(&self) -> BrainResult<()>;

    /// Flushes and closes the backing store.
    async fn close(&self) -> BrainResult<()>;

    /// Returns a receiver resolving to `true` once persisted state has been
    /// loaded. Consumers await the first `true` and then drop the receiver.
    fn subscribe_loaded(&self) -> watch::Receiver<bool>;
}

/// A shared brain trait object.
pub type BoxedBrain = Arc<dyn Brain>;

// ============================================================================
// In-memory implementation
// ============================================================================

/// Volatile in-memory brain.
///
/// The default store when no persistence backend is attached; `save` and
/// `close` are no-ops. State is considered loaded as soon as
/// [`mark_loaded`](MemoryBrain::mark_loaded) runs (a backend wrapping this
/// store calls it after its initial read).
pub struct MemoryBrain {
    data: RwLock<HashMap<String, Value>>,
    loaded_tx: watch::Sender<bool>,
}

impl MemoryBrain {
    /// Creates an empty brain that has not loaded yet.
    pub fn new() -> Self {
        let (loaded_tx, _rx) = watch::channel(false);
        Self {
            data: RwLock::new(HashMap::new()),
            loaded_tx,
        }
    }

    /// Creates an empty brain and immediately marks it loaded.
    pub fn loaded() -> Self {
        let brain = Self::new();
        brain.mark_loaded();
        brain
    }

    /// Signals the one-time loaded notification.
    pub fn mark_loaded(&self) {
        let _ = self.loaded_tx.send(true);
        debug!("brain state loaded");
    }

    /// Replaces the whole store, then marks it loaded.
    pub fn load(&self, data: HashMap<String, Value>) {
        *self.data.write() = data;
        self.mark_loaded();
    }
}

impl Default for MemoryBrain {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Brain for MemoryBrain {
    async fn get(&self, key: &str) -> Option<Value> {
        self.data.read().get(key).cloned()
    }

    async fn set(&self, key: &str, value: Value) {
        self.data.write().insert(key.to_owned(), value);
    }

    async fn remove(&self, key: &str) {
        self.data.write().remove(key);
    }

    async fn save(&self) -> BrainResult<()> {
        Ok(())
    }

    async fn close(&self) -> BrainResult<()> {
        Ok(())
    }

    fn subscribe_loaded(&self) -> watch::Receiver<bool> {
        self.loaded_tx.subscribe()
    }
}

/// Awaits the brain's one-time loaded notification.
pub async fn wait_loaded(brain: &dyn Brain) {
    let mut rx = brain.subscribe_loaded();
    // wait_for also covers the already-loaded case via the current value.
    let _ = rx.wait_for(|loaded| *loaded).await;
}
