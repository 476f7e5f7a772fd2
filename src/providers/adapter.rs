//! Provider adapter trait.

use crate::error::Result;
use crate::state::{AccessCredentials, ExternalProfile, HandshakeState};
use std::future::Future;

/// Result of initiating a handshake with a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    /// URL the user must be redirected to for authorization.
    pub authorize_url: String,

    /// Provider-issued request token (OAuth1 only).
    ///
    /// When present, the callback will reference the binding by this token
    /// instead of by id.
    pub request_token: Option<String>,

    /// Request token secret (OAuth1 only).
    pub request_token_secret: Option<String>,
}

/// Abstracts one OAuth provider: initiate handshake, exchange the callback
/// verifier or code for access credentials, fetch a normalized profile.
///
/// The concrete transport (request signing, provider API shapes) lives
/// entirely behind this trait; the engine treats it as a black box.
///
/// # Implementation Notes
///
/// - Implementations must not persist anything; storage belongs to the
///   engine so nothing is written before the provider response is verified.
/// - Every method failure should carry enough detail for internal logs;
///   the boundary collapses them into a generic "verification failed".
pub trait ProviderAdapter: Send + Sync {
    /// Begin the handshake.
    ///
    /// `state` is an engine-generated token the provider echoes back on the
    /// callback; OAuth1 providers may ignore it and return a request token
    /// instead.
    ///
    /// # Errors
    ///
    /// Returns [`crate::LinkError::Provider`] if the provider rejects the
    /// request or the network call fails.
    fn initiate_handshake(
        &self,
        callback_url: &str,
        state: &str,
    ) -> impl Future<Output = Result<Handshake>> + Send;

    /// Exchange the callback verifier (OAuth1) or authorization code
    /// (OAuth2) for access credentials.
    ///
    /// # Errors
    ///
    /// Returns [`crate::LinkError::Provider`] if the provider rejects the
    /// exchange or the network call fails.
    fn exchange_for_access_token(
        &self,
        handshake: &HandshakeState,
        verifier_or_code: &str,
    ) -> impl Future<Output = Result<AccessCredentials>> + Send;

    /// Fetch the verified external profile for the given credentials.
    ///
    /// The returned profile must carry the provider's stable user id.
    ///
    /// # Errors
    ///
    /// Returns [`crate::LinkError::Provider`] if the credentials are
    /// rejected or the network call fails.
    fn fetch_profile(
        &self,
        credentials: &AccessCredentials,
    ) -> impl Future<Output = Result<ExternalProfile>> + Send;
}
