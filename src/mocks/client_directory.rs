//! Mock client directory for testing.

use crate::error::{LinkError, Result};
use crate::providers::{Client, ClientDirectory};
use crate::state::ClientId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// In-memory client directory.
#[derive(Debug, Clone, Default)]
pub struct MockClientDirectory {
    clients: Arc<Mutex<HashMap<ClientId, Client>>>,
}

impl MockClientDirectory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client.
    pub fn insert(&self, client_id: ClientId, username: &str) {
        if let Ok(mut clients) = self.clients.lock() {
            clients.insert(
                client_id,
                Client {
                    client_id,
                    username: username.to_string(),
                },
            );
        }
    }

    /// Remove a client, leaving any binding that references it dangling.
    pub fn remove(&self, client_id: ClientId) {
        if let Ok(mut clients) = self.clients.lock() {
            clients.remove(&client_id);
        }
    }
}

impl ClientDirectory for MockClientDirectory {
    async fn find_by_id(&self, client_id: ClientId) -> Result<Client> {
        self.clients
            .lock()
            .map_err(|_| LinkError::Storage("Mock directory lock poisoned".to_string()))?
            .get(&client_id)
            .cloned()
            .ok_or(LinkError::NotFound)
    }
}
