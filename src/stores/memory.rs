//! In-memory binding store.
//!
//! Backs tests and single-node deployments. Transactions take an owned
//! lock on the whole store, so concurrent transactions serialize exactly
//! like row-locked reconciliations would; rollback restores a snapshot
//! taken at `begin`.

use crate::error::{LinkError, Result};
use crate::providers::{LinkStore, LinkStoreTx};
use crate::state::{AuditEntry, Binding, BindingId, Site};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Default, Clone)]
struct MemoryState {
    bindings: HashMap<BindingId, Binding>,
    audit: Vec<AuditEntry>,
}

/// In-memory [`LinkStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryLinkStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryLinkStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the audit log, oldest first.
    pub async fn audit_entries(&self) -> Vec<AuditEntry> {
        self.state.lock().await.audit.clone()
    }

    /// Number of binding rows currently stored.
    pub async fn binding_count(&self) -> usize {
        self.state.lock().await.bindings.len()
    }
}

impl LinkStore for MemoryLinkStore {
    type Tx = MemoryLinkTx;

    async fn create(&self, binding: &Binding) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.bindings.contains_key(&binding.id) {
            return Err(LinkError::Storage(format!(
                "Binding {} already exists",
                binding.id
            )));
        }
        state.bindings.insert(binding.id, binding.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: BindingId) -> Result<Option<Binding>> {
        Ok(self.state.lock().await.bindings.get(&id).cloned())
    }

    async fn find_by_handshake_token(&self, token: &str) -> Result<Option<Binding>> {
        Ok(self
            .state
            .lock()
            .await
            .bindings
            .values()
            .find(|b| b.handshake.token == token)
            .cloned())
    }

    async fn find_by_access_token(&self, token: &str) -> Result<Option<Binding>> {
        Ok(self
            .state
            .lock()
            .await
            .bindings
            .values()
            .find(|b| {
                b.credentials
                    .as_ref()
                    .is_some_and(|c| c.access_token == token)
            })
            .cloned())
    }

    async fn begin(&self) -> Result<MemoryLinkTx> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let snapshot = guard.clone();
        Ok(MemoryLinkTx { guard, snapshot })
    }
}

/// Scoped transaction over [`MemoryLinkStore`].
///
/// Holds the store lock for its whole lifetime; dropping without commit or
/// rollback keeps whatever was staged (callers go through the engine, which
/// always resolves the transaction explicitly).
#[derive(Debug)]
pub struct MemoryLinkTx {
    guard: OwnedMutexGuard<MemoryState>,
    snapshot: MemoryState,
}

impl LinkStoreTx for MemoryLinkTx {
    async fn find_by_provider_profile(
        &mut self,
        site: Site,
        external_profile_id: &str,
    ) -> Result<Option<Binding>> {
        Ok(self
            .guard
            .bindings
            .values()
            .find(|b| b.site == site && b.external_profile_id.as_deref() == Some(external_profile_id))
            .cloned())
    }

    async fn update(&mut self, binding: &Binding) -> Result<Binding> {
        // Emulate the unique constraint on (site, external_profile_id).
        if let Some(pid) = &binding.external_profile_id {
            let taken = self.guard.bindings.values().any(|b| {
                b.id != binding.id
                    && b.site == binding.site
                    && b.external_profile_id.as_deref() == Some(pid.as_str())
            });
            if taken {
                return Err(LinkError::StorageConflict);
            }
        }

        let mut row = binding.clone();
        row.updated_at = Utc::now();
        self.guard.bindings.insert(row.id, row.clone());
        Ok(row)
    }

    async fn delete(&mut self, id: BindingId) -> Result<()> {
        self.guard
            .bindings
            .remove(&id)
            .map(|_| ())
            .ok_or(LinkError::NotFound)
    }

    async fn append_audit(&mut self, entry: &AuditEntry) -> Result<()> {
        self.guard.audit.push(entry.clone());
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        // Changes were applied in place; releasing the lock publishes them.
        drop(self.guard);
        Ok(())
    }

    async fn rollback(mut self) -> Result<()> {
        *self.guard = self.snapshot;
        Ok(())
    }
}
