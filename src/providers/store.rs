//! Binding store and scoped transaction contract.

use crate::error::Result;
use crate::state::{AuditEntry, Binding, BindingId, Site};
use std::future::Future;

/// Persistence for [`Binding`] rows and the append-only audit log.
///
/// Point reads and the initial insert run directly against the pool; every
/// mutation that must pair with an audit entry runs through a scoped
/// transaction obtained from [`LinkStore::begin`].
pub trait LinkStore: Send + Sync {
    /// Transaction handle type.
    type Tx: LinkStoreTx;

    /// Persist a freshly-created binding.
    ///
    /// # Errors
    ///
    /// Returns [`crate::LinkError::Storage`] on write failure.
    fn create(&self, binding: &Binding) -> impl Future<Output = Result<()>> + Send;

    /// Look up a binding by id.
    ///
    /// # Errors
    ///
    /// Returns [`crate::LinkError::Storage`] on read failure.
    fn find_by_id(&self, id: BindingId) -> impl Future<Output = Result<Option<Binding>>> + Send;

    /// Look up a binding by its handshake token (OAuth1 callback path).
    ///
    /// # Errors
    ///
    /// Returns [`crate::LinkError::Storage`] on read failure.
    fn find_by_handshake_token(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<Option<Binding>>> + Send;

    /// Look up a binding by provider access token.
    ///
    /// # Errors
    ///
    /// Returns [`crate::LinkError::Storage`] on read failure.
    fn find_by_access_token(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<Option<Binding>>> + Send;

    /// Open a scoped transaction.
    ///
    /// # Errors
    ///
    /// Returns [`crate::LinkError::Storage`] if the transaction cannot be
    /// started.
    fn begin(&self) -> impl Future<Output = Result<Self::Tx>> + Send;
}

/// A scoped transaction over the binding store.
///
/// Every store and audit call in a branch goes through the same handle;
/// the branch commits on normal return and rolls back on any error exit,
/// so a binding mutation never survives without its audit entry (or vice
/// versa).
pub trait LinkStoreTx: Send {
    /// Look up the canonical binding for `(site, external_profile_id)`,
    /// locking it against concurrent reconciliations for the duration of
    /// the transaction.
    ///
    /// # Errors
    ///
    /// Returns [`crate::LinkError::Storage`] on read failure.
    fn find_by_provider_profile(
        &mut self,
        site: Site,
        external_profile_id: &str,
    ) -> impl Future<Output = Result<Option<Binding>>> + Send;

    /// Write a binding row, bumping `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::LinkError::StorageConflict`] if the write would
    /// violate the `(site, external_profile_id)` uniqueness invariant
    /// (another reconciliation won the race), or
    /// [`crate::LinkError::Storage`] on any other failure.
    fn update(&mut self, binding: &Binding) -> impl Future<Output = Result<Binding>> + Send;

    /// Destroy a binding row.
    ///
    /// # Errors
    ///
    /// Returns [`crate::LinkError::NotFound`] if the row does not exist,
    /// [`crate::LinkError::Storage`] on write failure.
    fn delete(&mut self, id: BindingId) -> impl Future<Output = Result<()>> + Send;

    /// Append an audit entry.
    ///
    /// # Errors
    ///
    /// Returns [`crate::LinkError::Storage`] on write failure.
    fn append_audit(&mut self, entry: &AuditEntry) -> impl Future<Output = Result<()>> + Send;

    /// Commit the transaction.
    ///
    /// # Errors
    ///
    /// Returns [`crate::LinkError::Storage`] if the commit fails; nothing
    /// from this transaction is persisted in that case.
    fn commit(self) -> impl Future<Output = Result<()>> + Send;

    /// Roll back the transaction, discarding every staged change.
    ///
    /// # Errors
    ///
    /// Returns [`crate::LinkError::Storage`] if the rollback itself fails;
    /// the staged changes are still discarded.
    fn rollback(self) -> impl Future<Output = Result<()>> + Send;
}
