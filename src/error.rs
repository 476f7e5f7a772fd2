//! Error types for linking and reconciliation operations.

use thiserror::Error;

/// Result type alias for linking operations.
pub type Result<T> = std::result::Result<T, LinkError>;

/// Error taxonomy for the linking core.
///
/// `Conflict` is deliberately absent: an already-connected third-party
/// account is a modeled outcome (`Outcome::Conflict`), not a failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// Referenced binding or client does not exist.
    #[error("Binding not found")]
    NotFound,

    /// Authorize was attempted by a session other than the one that
    /// created the pending claim.
    #[error("You are not allowed to confirm this claim")]
    ClaimForbidden,

    /// The pending claim has expired; the whole handshake must restart.
    #[error("Claim expired, must restart the linking flow")]
    ClaimExpired,

    /// Unauthorize was attempted by a client that does not own the binding.
    #[error("You are not the owner of this binding")]
    NotOwner,

    /// Provider handshake, token exchange, or profile fetch failed.
    ///
    /// Surfaced to external callers as a generic "verification failed";
    /// the detail is for internal logging only.
    #[error("Provider verification failed: {0}")]
    Provider(String),

    /// Another reconciliation committed the same `(site, external_profile_id)`
    /// pair first. Internal: the engine retries the lookup once before
    /// converting this into [`LinkError::Storage`].
    #[error("Concurrent reconciliation won the canonical-binding race")]
    StorageConflict,

    /// Storage transaction or commit failure. The transaction has been
    /// rolled back; no partial mutation survives.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Malformed or missing request parameters at the boundary.
    #[error("Invalid request: {0}")]
    Validation(String),
}

impl LinkError {
    /// Returns `true` if this error is an ownership or session check failure.
    ///
    /// # Examples
    ///
    /// ```
    /// # use thirdparty_link::LinkError;
    /// assert!(LinkError::ClaimExpired.is_forbidden());
    /// assert!(!LinkError::NotFound.is_forbidden());
    /// ```
    #[must_use]
    pub const fn is_forbidden(&self) -> bool {
        matches!(
            self,
            Self::ClaimForbidden | Self::ClaimExpired | Self::NotOwner
        )
    }

    /// Returns `true` if the failure is terminal for the operation and a
    /// retry with the same inputs cannot succeed.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::NotFound
                | Self::ClaimForbidden
                | Self::ClaimExpired
                | Self::NotOwner
                | Self::Validation(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forbidden_classification() {
        assert!(LinkError::ClaimForbidden.is_forbidden());
        assert!(LinkError::NotOwner.is_forbidden());
        assert!(!LinkError::Provider("boom".into()).is_forbidden());
    }

    #[test]
    fn terminal_classification() {
        assert!(LinkError::NotFound.is_terminal());
        assert!(!LinkError::StorageConflict.is_terminal());
        assert!(!LinkError::Storage("commit failed".into()).is_terminal());
    }
}
