//! Process-wide map of live connections to their conversation contexts.
//!
//! Used for diagnostics and cleanup only; each handler already knows its own
//! context, so no routing decision ever reads this map.

use std::{collections::HashMap, sync::RwLock};

use gateway_core::ContextId;
use uuid::Uuid;

/// Concurrent connection → context bookkeeping.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    inner: RwLock<HashMap<Uuid, ContextId>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or re-point) a connection's context.
    pub fn put(&self, connection_id: Uuid, context: ContextId) {
        let _ = self.inner.write().unwrap().insert(connection_id, context);
    }

    /// Remove a connection's entry. Removing an absent entry is a no-op.
    pub fn remove(&self, connection_id: Uuid) {
        let _ = self.inner.write().unwrap().remove(&connection_id);
    }

    /// Context currently registered for a connection, if any.
    #[must_use]
    pub fn get(&self, connection_id: Uuid) -> Option<ContextId> {
        self.inner.read().unwrap().get(&connection_id).cloned()
    }

    /// Copy-on-read view of all live entries. No ordering is implied.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(Uuid, ContextId)> {
        self.inner
            .read()
            .unwrap()
            .iter()
            .map(|(id, ctx)| (*id, ctx.clone()))
            .collect()
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().unwrap().len()
    }

    /// Whether no connection is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().unwrap().is_empty()
    }
}
