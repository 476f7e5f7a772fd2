//! Core data model for third-party account linking.
//!
//! All types are `Clone` and serde-serializable so they can cross the
//! storage and boundary seams unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════
// ID Types
// ═══════════════════════════════════════════════════════════════════════

/// Unique identifier for a binding row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BindingId(pub uuid::Uuid);

impl BindingId {
    /// Generate a new random `BindingId`.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for BindingId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BindingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Opaque identifier of a first-party client account.
///
/// Supplied by the boundary; this crate never creates client accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(pub uuid::Uuid);

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Opaque identifier of a browser session.
///
/// Supplied by the boundary. This is the single canonical session identity:
/// it is stored in pending claims and compared in explicit authorize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub uuid::Uuid);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Provider Sites
// ═══════════════════════════════════════════════════════════════════════

/// Supported third-party provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Site {
    /// Twitter (OAuth1).
    Twitter,
    /// Weibo (OAuth2).
    Weibo,
}

impl Site {
    /// Get the site name as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Twitter => "twitter",
            Self::Weibo => "weibo",
        }
    }
}

impl std::fmt::Display for Site {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Site {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "twitter" => Ok(Self::Twitter),
            "weibo" => Ok(Self::Weibo),
            _ => Err(format!("Unknown site: {s}")),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Ownership
// ═══════════════════════════════════════════════════════════════════════

/// Ownership state of a binding.
///
/// A closed set of variants so every reconciliation branch is total:
/// no implicit "pending envelope inside the profile" convention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Ownership {
    /// Nobody has claimed the binding.
    Unclaimed,

    /// A session has claimed the binding but no client has confirmed it.
    /// The claim confers no authorization after `expires_at`.
    Pending {
        /// Session that initiated the claim.
        session_id: SessionId,
        /// Absolute expiry of the claim.
        expires_at: DateTime<Utc>,
    },

    /// A client owns the binding. Only explicit unauthorize reverts this.
    Confirmed {
        /// Owning client.
        client_id: ClientId,
    },
}

impl Ownership {
    /// The owning client, if confirmed.
    #[must_use]
    pub const fn confirmed_client(&self) -> Option<ClientId> {
        match self {
            Self::Confirmed { client_id } => Some(*client_id),
            _ => None,
        }
    }

    /// Returns `true` if no client owns the binding (unclaimed or pending).
    #[must_use]
    pub const fn is_unowned(&self) -> bool {
        !matches!(self, Self::Confirmed { .. })
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Credentials & Profiles
// ═══════════════════════════════════════════════════════════════════════

/// Provider access credentials obtained from the token exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessCredentials {
    /// Provider access token.
    pub access_token: String,

    /// OAuth1 access token secret, if the provider issued one.
    pub access_token_secret: Option<String>,

    /// OAuth2 refresh token, if the provider issued one.
    pub refresh_token: Option<String>,
}

/// Externally-verified profile returned by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalProfile {
    /// Provider's stable user id.
    pub external_profile_id: String,

    /// Raw profile snapshot as the provider returned it.
    pub raw: serde_json::Value,
}

/// Handshake state captured when the flow starts.
///
/// For OAuth1 the token/secret pair is the provider request token; for
/// OAuth2 the token is a generated state parameter and the secret is absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeState {
    /// Request token or generated state parameter.
    pub token: String,

    /// Request token secret (OAuth1 only).
    pub secret: Option<String>,
}

// ═══════════════════════════════════════════════════════════════════════
// Binding
// ═══════════════════════════════════════════════════════════════════════

/// One third-party account linkage attempt or confirmed link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    /// Unique id, generated at creation.
    pub id: BindingId,

    /// Provider the binding belongs to.
    pub site: Site,

    /// Provider's stable user id; unset until the callback resolves it.
    ///
    /// At most one binding per `(site, external_profile_id)` pair is
    /// canonical once this is set.
    pub external_profile_id: Option<String>,

    /// Access credentials; present only after a successful exchange.
    pub credentials: Option<AccessCredentials>,

    /// Ownership state.
    pub ownership: Ownership,

    /// Raw external profile snapshot.
    pub profile: Option<serde_json::Value>,

    /// Handshake token/secret captured at flow start.
    pub handshake: HandshakeState,

    /// Caller-supplied return URL for relaying callback parameters.
    pub redirect: Option<String>,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,

    /// Last mutation timestamp.
    ///
    /// Invariant: `created_at == updated_at` iff the row has never been
    /// mutated since the handshake started. Reconciliation uses this to
    /// tell a first-time linking attempt from a reused binding.
    pub updated_at: DateTime<Utc>,
}

impl Binding {
    /// Create a fresh, unclaimed binding at handshake start.
    #[must_use]
    pub fn new(
        site: Site,
        handshake: HandshakeState,
        redirect: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: BindingId::new(),
            site,
            external_profile_id: None,
            credentials: None,
            ownership: Ownership::Unclaimed,
            profile: None,
            handshake,
            redirect,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns `true` if the binding has never been mutated since creation.
    #[must_use]
    pub fn is_fresh(&self) -> bool {
        self.created_at == self.updated_at
    }

    /// Copy of the binding with credentials and handshake secret removed,
    /// safe to return across the boundary.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut safe = self.clone();
        safe.credentials = None;
        safe.handshake.secret = None;
        safe
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Requester & Outcomes
// ═══════════════════════════════════════════════════════════════════════

/// Identity context of the request driving an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    /// The requester's session.
    pub session_id: SessionId,

    /// The client bound to the session, if logged in.
    pub client_id: Option<ClientId>,
}

impl Requester {
    /// An anonymous requester (session only).
    #[must_use]
    pub const fn anonymous(session_id: SessionId) -> Self {
        Self {
            session_id,
            client_id: None,
        }
    }

    /// A logged-in requester.
    #[must_use]
    pub const fn authenticated(session_id: SessionId, client_id: ClientId) -> Self {
        Self {
            session_id,
            client_id: Some(client_id),
        }
    }
}

/// Result of starting a handshake.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StartedHandshake {
    /// The freshly-created placeholder binding.
    pub binding: Binding,

    /// Provider URL the user must be redirected to.
    pub authorize_url: String,
}

/// Tagged outcome of a reconciliation.
///
/// `Conflict` is a first-class branch result the caller must handle, not an
/// error to propagate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Outcome {
    /// The binding is now confirmed for the requester's client.
    Confirmed(Binding),

    /// A returning confirmed account authenticated the requester's session.
    LoggedIn(Binding),

    /// The requester must log in, then call explicit authorize.
    NeedsAuthentication(Binding),

    /// Another client owns the account; the caller must choose whether to
    /// unauthorize the existing owner before re-claiming.
    Conflict {
        /// The canonical binding under dispute.
        binding: Binding,
        /// Display name of the conflicting owner.
        conflicting_client: String,
    },
}

// ═══════════════════════════════════════════════════════════════════════
// Audit
// ═══════════════════════════════════════════════════════════════════════

/// State-changing action recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    /// A binding was confirmed for a client.
    AuthorizeThirdPartyAccount,
    /// A binding was destroyed by its owner.
    UnauthorizeThirdPartyAccount,
}

impl AuditAction {
    /// Wire/storage name of the action.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizeThirdPartyAccount => "authorizeThirdPartyAccount",
            Self::UnauthorizeThirdPartyAccount => "unauthorizeThirdPartyAccount",
        }
    }
}

/// Immutable record of a state-changing action.
///
/// Created in the same transaction as the binding mutation it documents,
/// never standalone. Retained after the binding is deleted, so `target` is
/// a historical reference rather than an enforced foreign key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Action performed.
    pub action: AuditAction,

    /// Binding the action applied to.
    pub target: BindingId,

    /// Acting client, if any.
    pub client: Option<ClientId>,

    /// Snapshot of the mutated fields.
    pub data: serde_json::Value,

    /// When the entry was recorded.
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    /// Build the authorize entry for a binding that just became confirmed.
    #[must_use]
    pub fn authorize(binding: &Binding, client: ClientId, now: DateTime<Utc>) -> Self {
        Self {
            action: AuditAction::AuthorizeThirdPartyAccount,
            target: binding.id,
            client: Some(client),
            data: serde_json::json!({
                "id": binding.id,
                "site": binding.site,
                "externalProfileId": binding.external_profile_id,
                "owner": client,
            }),
            recorded_at: now,
        }
    }

    /// Build the unauthorize entry for a binding about to be destroyed.
    #[must_use]
    pub fn unauthorize(binding: &Binding, client: ClientId, now: DateTime<Utc>) -> Self {
        Self {
            action: AuditAction::UnauthorizeThirdPartyAccount,
            target: binding.id,
            client: Some(client),
            data: serde_json::json!({
                "id": binding.id,
                "site": binding.site,
                "externalProfileId": binding.external_profile_id,
                "owner": client,
            }),
            recorded_at: now,
        }
    }
}
