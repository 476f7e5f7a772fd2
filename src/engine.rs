//! Reconciliation engine.
//!
//! The core state machine: given a freshly-verified external profile and
//! the requester's session/client context, decide what binding state
//! results and produce the boundary-facing outcome.
//!
//! # Flow
//!
//! ```text
//! 1. start_handshake → placeholder Binding persisted, user redirected
//! 2. provider callback → reconcile → Confirmed | LoggedIn |
//!    NeedsAuthentication | Conflict
//! 3. optionally authorize (confirm a pending claim) or
//!    unauthorize (destroy a confirmed link)
//! ```
//!
//! Every mutating branch runs inside one scoped store transaction so the
//! binding mutation and its audit entry commit or roll back together.

use crate::config::LinkConfig;
use crate::error::{LinkError, Result};
use crate::providers::{ClientDirectory, LinkStore, LinkStoreTx, ProviderAdapter, SessionStore};
use crate::state::{
    AccessCredentials, AuditEntry, Binding, BindingId, ClientId, ExternalProfile, HandshakeState,
    Outcome, Ownership, Requester, Site, StartedHandshake,
};
use chrono::Utc;
use std::collections::HashMap;
use std::future::Future;

/// How a provider callback locates the placeholder binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackRef<'a> {
    /// By binding id, relayed through the OAuth2 `state` parameter.
    BindingId(BindingId),

    /// By handshake token, relayed as the OAuth1 `oauth_token` parameter.
    HandshakeToken(&'a str),
}

/// The linking/reconciliation engine.
///
/// Provider adapters are injected as a `site -> adapter` map at
/// construction; an absent site is a configuration error surfaced before
/// any handshake starts.
#[derive(Clone)]
pub struct ReconciliationEngine<P, S, C, SS>
where
    P: ProviderAdapter,
    S: LinkStore,
    C: ClientDirectory,
    SS: SessionStore,
{
    adapters: HashMap<Site, P>,
    store: S,
    clients: C,
    sessions: SS,
    config: LinkConfig,
}

impl<P, S, C, SS> ReconciliationEngine<P, S, C, SS>
where
    P: ProviderAdapter,
    S: LinkStore,
    C: ClientDirectory,
    SS: SessionStore,
{
    /// Create a new engine.
    #[must_use]
    pub const fn new(
        adapters: HashMap<Site, P>,
        store: S,
        clients: C,
        sessions: SS,
        config: LinkConfig,
    ) -> Self {
        Self {
            adapters,
            store,
            clients,
            sessions,
            config,
        }
    }

    /// The sites this engine has adapters for, in stable order.
    #[must_use]
    pub fn sites(&self) -> Vec<Site> {
        let mut sites: Vec<Site> = self.adapters.keys().copied().collect();
        sites.sort_by_key(Site::as_str);
        sites
    }

    fn adapter(&self, site: Site) -> Result<&P> {
        self.adapters
            .get(&site)
            .ok_or_else(|| LinkError::Provider(format!("unsupported site: {site}")))
    }

    /// Bound a provider call by the configured timeout.
    async fn bounded<T, F>(&self, what: &str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send,
    {
        match tokio::time::timeout(self.config.provider_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(LinkError::Provider(format!("{what} timed out"))),
        }
    }

    /// Commit on success, roll back on any error exit.
    async fn finish<T>(tx: S::Tx, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::error!(error = %rollback_err, "Transaction rollback failed");
                }
                Err(err)
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // StartHandshake
    // ═══════════════════════════════════════════════════════════════════

    /// Begin a linking flow: initiate the provider handshake and persist
    /// the placeholder binding.
    ///
    /// # Errors
    ///
    /// - [`LinkError::Provider`] for an unconfigured site or a failed or
    ///   timed-out provider call
    /// - [`LinkError::Storage`] if the placeholder cannot be persisted
    pub async fn start_handshake(
        &self,
        site: Site,
        requester: &Requester,
        redirect: Option<String>,
    ) -> Result<StartedHandshake> {
        let adapter = self.adapter(site)?;
        let state = crate::utils::generate_state_token();
        let callback_url = self.config.callback_url(site);

        let handshake = self
            .bounded(
                "Handshake initiation",
                adapter.initiate_handshake(&callback_url, &state),
            )
            .await?;

        // OAuth1 providers hand back a request token the callback will
        // reference; OAuth2 flows are referenced by the state token.
        let token = handshake.request_token.clone().unwrap_or(state);
        let binding = Binding::new(
            site,
            HandshakeState {
                token,
                secret: handshake.request_token_secret.clone(),
            },
            redirect,
            Utc::now(),
        );
        self.store.create(&binding).await?;

        tracing::info!(
            binding = %binding.id,
            site = %site,
            session = %requester.session_id,
            "Started linking handshake"
        );

        Ok(StartedHandshake {
            binding,
            authorize_url: handshake.authorize_url,
        })
    }

    /// Resolve the placeholder binding a provider callback refers to.
    ///
    /// Used by the boundary both for the relay page and before
    /// [`Self::reconcile`].
    ///
    /// # Errors
    ///
    /// [`LinkError::NotFound`] if no binding matches the reference.
    pub async fn binding_for_callback(&self, reference: CallbackRef<'_>) -> Result<Binding> {
        let found = match reference {
            CallbackRef::BindingId(id) => self.store.find_by_id(id).await?,
            CallbackRef::HandshakeToken(token) => self.store.find_by_handshake_token(token).await?,
        };
        found.ok_or(LinkError::NotFound)
    }

    /// Look up a binding by provider access token.
    ///
    /// For host applications that authenticate API calls with a provider
    /// token.
    ///
    /// # Errors
    ///
    /// [`LinkError::Storage`] on lookup failure.
    pub async fn find_by_access_token(&self, token: &str) -> Result<Option<Binding>> {
        self.store.find_by_access_token(token).await
    }

    // ═══════════════════════════════════════════════════════════════════
    // Reconcile
    // ═══════════════════════════════════════════════════════════════════

    /// Reconcile a provider callback into a binding outcome.
    ///
    /// Exchanges the verifier/code, fetches the verified profile, then runs
    /// the branch logic in one scoped transaction. Nothing is persisted
    /// until the provider response is verified, so a provider failure
    /// leaves the placeholder untouched and claimable.
    ///
    /// A unique-constraint race (two concurrent callbacks for the same
    /// external profile) retries the lookup and branch exactly once.
    ///
    /// # Errors
    ///
    /// - [`LinkError::NotFound`] if the reference resolves no binding
    /// - [`LinkError::Provider`] on exchange/fetch failure or timeout
    /// - [`LinkError::Storage`] on persistence failure (fully rolled back)
    pub async fn reconcile(
        &self,
        reference: CallbackRef<'_>,
        verifier_or_code: &str,
        requester: &Requester,
    ) -> Result<Outcome> {
        let binding = self.binding_for_callback(reference).await?;
        let adapter = self.adapter(binding.site)?;

        let credentials = self
            .bounded(
                "Access token exchange",
                adapter.exchange_for_access_token(&binding.handshake, verifier_or_code),
            )
            .await?;
        let profile = self
            .bounded("Profile fetch", adapter.fetch_profile(&credentials))
            .await?;

        let mut retried = false;
        let outcome = loop {
            let mut tx = self.store.begin().await?;
            let result = self
                .resolve(&mut tx, &binding, &profile, &credentials, requester)
                .await;
            match Self::finish(tx, result).await {
                Ok(outcome) => break outcome,
                Err(LinkError::StorageConflict) if !retried => {
                    retried = true;
                    tracing::warn!(
                        site = %binding.site,
                        external_profile_id = %profile.external_profile_id,
                        "Lost canonical-binding race, retrying lookup once"
                    );
                }
                Err(LinkError::StorageConflict) => {
                    return Err(LinkError::Storage(
                        "Lost the canonical-binding race twice".to_string(),
                    ));
                }
                Err(err) => return Err(err),
            }
        };

        // The re-login branch authenticates the requester's session as the
        // returning owner.
        if let Outcome::LoggedIn(account) = &outcome {
            if let Some(owner) = account.ownership.confirmed_client() {
                self.sessions
                    .bind_client(requester.session_id, owner)
                    .await?;
            }
        }

        match &outcome {
            Outcome::Confirmed(account) => {
                tracing::info!(binding = %account.id, site = %account.site, "Binding confirmed");
            }
            Outcome::LoggedIn(account) => {
                tracing::info!(binding = %account.id, site = %account.site, "Returning account logged in");
            }
            Outcome::NeedsAuthentication(account) => {
                tracing::info!(binding = %account.id, site = %account.site, "Pending claim stashed, authentication required");
            }
            Outcome::Conflict {
                binding: account,
                conflicting_client,
            } => {
                tracing::info!(
                    binding = %account.id,
                    site = %account.site,
                    conflict = %conflicting_client,
                    "Binding already connected to another client"
                );
            }
        }

        Ok(outcome)
    }

    /// The branch logic of [`Self::reconcile`], inside an open transaction.
    ///
    /// Branch order is deterministic and first-match-wins: fresh claim,
    /// re-login, then the pending-claim sub-branches.
    async fn resolve(
        &self,
        tx: &mut S::Tx,
        placeholder: &Binding,
        profile: &ExternalProfile,
        credentials: &AccessCredentials,
        requester: &Requester,
    ) -> Result<Outcome> {
        let now = Utc::now();

        // Prefer the canonical binding for this external profile over the
        // placeholder created by this handshake.
        let canonical = tx
            .find_by_provider_profile(placeholder.site, &profile.external_profile_id)
            .await?;
        let mut account = canonical.unwrap_or_else(|| placeholder.clone());

        let fresh = account.is_fresh();
        let previous = account.ownership.clone();
        account.external_profile_id = Some(profile.external_profile_id.clone());
        account.credentials = Some(credentials.clone());
        account.profile = Some(profile.raw.clone());

        // Fresh claim: this binding has never been mutated and the
        // requester is logged in. Confirm immediately.
        if fresh {
            if let Some(client_id) = requester.client_id {
                return Self::confirm(tx, account, client_id, now).await;
            }
        }

        // Re-login: a confirmed account used to authenticate. Profile
        // refresh only; not a new authorization event, so no audit entry.
        if let Ownership::Confirmed { client_id: owner } = previous {
            let same_or_anonymous =
                requester.client_id.is_none() || requester.client_id == Some(owner);
            if same_or_anonymous {
                let account = tx.update(&account).await?;
                return Ok(Outcome::LoggedIn(account));
            }

            // Owned by a different client than the requester.
            match self.clients.find_by_id(owner).await {
                Ok(conflict) => {
                    // Confirmed ownership survives a conflicting claim:
                    // only the profile and credentials refresh. The
                    // requester must unauthorize the owner first.
                    let account = tx.update(&account).await?;
                    return Ok(Outcome::Conflict {
                        binding: account,
                        conflicting_client: conflict.username,
                    });
                }
                Err(LinkError::NotFound) => {
                    // In a consistent system an owner id always resolves;
                    // record the anomaly instead of folding it silently
                    // into the available-to-claim path.
                    tracing::warn!(
                        binding = %account.id,
                        owner = %owner,
                        "Dangling owner reference on confirmed binding"
                    );
                }
                Err(err) => return Err(err),
            }
        }

        // Unowned, pending, or dangling owner: claim it if the requester
        // has a client, otherwise stash a pending claim for this session.
        if let Some(client_id) = requester.client_id {
            Self::confirm(tx, account, client_id, now).await
        } else {
            account.ownership = Ownership::Pending {
                session_id: requester.session_id,
                expires_at: now + self.config.claim_ttl,
            };
            let account = tx.update(&account).await?;
            Ok(Outcome::NeedsAuthentication(account))
        }
    }

    /// Confirm ownership and write the paired audit entry.
    async fn confirm(
        tx: &mut S::Tx,
        mut account: Binding,
        client_id: ClientId,
        now: chrono::DateTime<Utc>,
    ) -> Result<Outcome> {
        account.ownership = Ownership::Confirmed { client_id };
        let account = tx.update(&account).await?;
        tx.append_audit(&AuditEntry::authorize(&account, client_id, now))
            .await?;
        Ok(Outcome::Confirmed(account))
    }

    // ═══════════════════════════════════════════════════════════════════
    // Explicit Authorize
    // ═══════════════════════════════════════════════════════════════════

    /// Confirm a pending claim.
    ///
    /// Only the session that stashed the claim may confirm it, and only
    /// within the claim TTL. The confirming client is the requester's, or
    /// the client already bound to the session.
    ///
    /// # Errors
    ///
    /// - [`LinkError::NotFound`] if the binding is absent or carries no
    ///   pending claim
    /// - [`LinkError::ClaimForbidden`] for a session mismatch or when no
    ///   client resolves for the requester
    /// - [`LinkError::ClaimExpired`] once the claim TTL has passed
    /// - [`LinkError::Storage`] on persistence failure
    pub async fn authorize(&self, binding_id: BindingId, requester: &Requester) -> Result<Binding> {
        let binding = self
            .store
            .find_by_id(binding_id)
            .await?
            .ok_or(LinkError::NotFound)?;

        let (session_id, expires_at) = match binding.ownership {
            Ownership::Pending {
                session_id,
                expires_at,
            } => (session_id, expires_at),
            _ => return Err(LinkError::NotFound),
        };

        if session_id != requester.session_id {
            return Err(LinkError::ClaimForbidden);
        }
        let now = Utc::now();
        if now > expires_at {
            return Err(LinkError::ClaimExpired);
        }

        let client_id = match requester.client_id {
            Some(client_id) => Some(client_id),
            None => self.sessions.client_for(requester.session_id).await?,
        }
        .ok_or(LinkError::ClaimForbidden)?;

        let mut confirmed = binding;
        confirmed.ownership = Ownership::Confirmed { client_id };

        let mut tx = self.store.begin().await?;
        let result = match tx.update(&confirmed).await {
            Ok(account) => tx
                .append_audit(&AuditEntry::authorize(&account, client_id, now))
                .await
                .map(|()| account),
            Err(err) => Err(err),
        };
        let account = Self::finish(tx, result).await.map_err(|err| match err {
            LinkError::StorageConflict => {
                LinkError::Storage("Conflicting canonical binding committed first".to_string())
            }
            other => other,
        })?;

        tracing::info!(binding = %account.id, client = %client_id, "Pending claim confirmed");
        Ok(account)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Explicit Unauthorize
    // ═══════════════════════════════════════════════════════════════════

    /// Destroy a confirmed binding.
    ///
    /// A second call against the same id fails with `NotFound`; callers
    /// should treat that as "already unlinked".
    ///
    /// # Errors
    ///
    /// - [`LinkError::NotFound`] if the binding is absent
    /// - [`LinkError::NotOwner`] unless the requesting client owns it
    /// - [`LinkError::Storage`] on persistence failure
    pub async fn unauthorize(&self, binding_id: BindingId, client_id: ClientId) -> Result<()> {
        let binding = self
            .store
            .find_by_id(binding_id)
            .await?
            .ok_or(LinkError::NotFound)?;

        if binding.ownership.confirmed_client() != Some(client_id) {
            return Err(LinkError::NotOwner);
        }

        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let result = match tx.delete(binding.id).await {
            Ok(()) => {
                tx.append_audit(&AuditEntry::unauthorize(&binding, client_id, now))
                    .await
            }
            Err(err) => Err(err),
        };
        Self::finish(tx, result).await?;

        tracing::info!(binding = %binding.id, client = %client_id, "Binding destroyed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{MemorySessionStore, MockClientDirectory, MockProviderAdapter};
    use crate::stores::MemoryLinkStore;
    use uuid::Uuid;

    fn empty_engine() -> ReconciliationEngine<
        MockProviderAdapter,
        MemoryLinkStore,
        MockClientDirectory,
        MemorySessionStore,
    > {
        ReconciliationEngine::new(
            HashMap::new(),
            MemoryLinkStore::new(),
            MockClientDirectory::new(),
            MemorySessionStore::new(),
            LinkConfig::default(),
        )
    }

    #[tokio::test]
    async fn unsupported_site_fails_before_any_handshake() {
        let engine = empty_engine();
        let requester = Requester::anonymous(crate::state::SessionId(Uuid::new_v4()));

        let err = engine
            .start_handshake(Site::Weibo, &requester, None)
            .await
            .unwrap_err();
        assert_eq!(err, LinkError::Provider("unsupported site: weibo".into()));
    }

    #[tokio::test]
    async fn unknown_callback_reference_is_not_found() {
        let engine = empty_engine();
        assert_eq!(
            engine
                .binding_for_callback(CallbackRef::HandshakeToken("missing"))
                .await,
            Err(LinkError::NotFound)
        );
        assert_eq!(
            engine
                .binding_for_callback(CallbackRef::BindingId(BindingId::new()))
                .await,
            Err(LinkError::NotFound)
        );
    }

    #[tokio::test]
    async fn sites_are_listed_in_stable_order() {
        let mut adapters = HashMap::new();
        adapters.insert(Site::Weibo, MockProviderAdapter::new());
        adapters.insert(Site::Twitter, MockProviderAdapter::new());
        let engine = ReconciliationEngine::new(
            adapters,
            MemoryLinkStore::new(),
            MockClientDirectory::new(),
            MemorySessionStore::new(),
            LinkConfig::default(),
        );

        assert_eq!(engine.sites(), vec![Site::Twitter, Site::Weibo]);
    }
}
