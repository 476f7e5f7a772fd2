//! Client directory trait.

use crate::error::Result;
use crate::state::ClientId;
use serde::{Deserialize, Serialize};
use std::future::Future;

/// First-party client account, as the directory exposes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    /// Client id.
    pub client_id: ClientId,

    /// Display name shown in conflict messages.
    pub username: String,
}

/// Read-only directory of first-party client accounts.
///
/// The engine uses it for exactly one thing: resolving the display name of
/// a conflicting owner. Client account management stays with the host.
pub trait ClientDirectory: Send + Sync {
    /// Look up a client by id.
    ///
    /// # Errors
    ///
    /// Returns [`crate::LinkError::NotFound`] if no client resolves for the
    /// id, [`crate::LinkError::Storage`] on lookup failure.
    fn find_by_id(&self, client_id: ClientId) -> impl Future<Output = Result<Client>> + Send;
}
