//! Session store trait.

use crate::error::Result;
use crate::state::{ClientId, SessionId};
use std::future::Future;

/// Session-to-client affinity, owned by the host application.
///
/// The engine touches sessions in two places: the re-login branch binds the
/// requester's session to the returning account's owner, and explicit
/// authorize falls back to the session's already-bound client when the
/// request carries none.
pub trait SessionStore: Send + Sync {
    /// Bind a session to a client (log the session in).
    ///
    /// # Errors
    ///
    /// Returns [`crate::LinkError::Storage`] on write failure.
    fn bind_client(
        &self,
        session_id: SessionId,
        client_id: ClientId,
    ) -> impl Future<Output = Result<()>> + Send;

    /// The client currently bound to a session, if any.
    ///
    /// # Errors
    ///
    /// Returns [`crate::LinkError::Storage`] on read failure.
    fn client_for(
        &self,
        session_id: SessionId,
    ) -> impl Future<Output = Result<Option<ClientId>>> + Send;
}
