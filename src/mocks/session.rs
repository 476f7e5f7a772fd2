//! In-memory session store for testing.

use crate::error::{LinkError, Result};
use crate::providers::SessionStore;
use crate::state::{ClientId, SessionId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// In-memory session-to-client map.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    sessions: Arc<Mutex<HashMap<SessionId, ClientId>>>,
}

impl MemorySessionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    async fn bind_client(&self, session_id: SessionId, client_id: ClientId) -> Result<()> {
        self.sessions
            .lock()
            .map_err(|_| LinkError::Storage("Session store lock poisoned".to_string()))?
            .insert(session_id, client_id);
        Ok(())
    }

    async fn client_for(&self, session_id: SessionId) -> Result<Option<ClientId>> {
        Ok(self
            .sessions
            .lock()
            .map_err(|_| LinkError::Storage("Session store lock poisoned".to_string()))?
            .get(&session_id)
            .copied())
    }
}
