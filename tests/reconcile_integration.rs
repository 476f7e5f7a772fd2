//! Integration tests for the account-linking reconciliation flow.

use std::collections::HashMap;
use thirdparty_link::mocks::{MemorySessionStore, MockClientDirectory, MockProviderAdapter};
use thirdparty_link::providers::{LinkStore, LinkStoreTx, SessionStore};
use thirdparty_link::stores::MemoryLinkStore;
use thirdparty_link::{
    AuditAction, CallbackRef, ClientId, LinkConfig, LinkError, Outcome, Ownership,
    ReconciliationEngine, Requester, SessionId, Site,
};
use uuid::Uuid;

type TestEngine = ReconciliationEngine<
    MockProviderAdapter,
    MemoryLinkStore,
    MockClientDirectory,
    MemorySessionStore,
>;

/// Engine plus handles onto its collaborators for inspection and scripting.
struct Harness {
    engine: TestEngine,
    store: MemoryLinkStore,
    clients: MockClientDirectory,
    sessions: MemorySessionStore,
    adapter: MockProviderAdapter,
}

/// Engine wired to mocks, both sites served by the same scripted adapter.
fn harness_with(adapter: MockProviderAdapter) -> Harness {
    let store = MemoryLinkStore::new();
    let clients = MockClientDirectory::new();
    let sessions = MemorySessionStore::new();

    let mut adapters = HashMap::new();
    adapters.insert(Site::Weibo, adapter.clone());
    adapters.insert(Site::Twitter, adapter.clone());

    let engine = ReconciliationEngine::new(
        adapters,
        store.clone(),
        clients.clone(),
        sessions.clone(),
        LinkConfig::default(),
    );
    Harness {
        engine,
        store,
        clients,
        sessions,
        adapter,
    }
}

fn harness() -> Harness {
    harness_with(MockProviderAdapter::new())
}

fn anonymous() -> Requester {
    Requester::anonymous(SessionId(Uuid::new_v4()))
}

fn logged_in() -> (Requester, ClientId) {
    let client = ClientId(Uuid::new_v4());
    let requester = Requester::authenticated(SessionId(Uuid::new_v4()), client);
    (requester, client)
}

/// Run a full handshake + callback for the given requester.
async fn link(h: &Harness, site: Site, requester: &Requester) -> Outcome {
    let started = h
        .engine
        .start_handshake(site, requester, None)
        .await
        .unwrap();
    h.engine
        .reconcile(
            CallbackRef::BindingId(started.binding.id),
            "verifier-code",
            requester,
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn test_logged_in_fresh_claim_confirms_immediately() {
    let h = harness();
    let (requester, client) = logged_in();

    let outcome = link(&h, Site::Weibo, &requester).await;

    let binding = match outcome {
        Outcome::Confirmed(binding) => binding,
        other => panic!("expected Confirmed, got {other:?}"),
    };
    assert_eq!(binding.ownership, Ownership::Confirmed { client_id: client });
    assert_eq!(binding.external_profile_id.as_deref(), Some("mock-user-1"));
    assert!(binding.credentials.is_some());

    // Exactly one audit entry, paired with the confirmation.
    let audit = h.store.audit_entries().await;
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].action, AuditAction::AuthorizeThirdPartyAccount);
    assert_eq!(audit[0].action.as_str(), "authorizeThirdPartyAccount");
    assert_eq!(audit[0].target, binding.id);
    assert_eq!(audit[0].client, Some(client));
}

#[tokio::test]
async fn test_anonymous_link_stashes_pending_claim() {
    let h = harness();
    let requester = anonymous();

    let outcome = link(&h, Site::Weibo, &requester).await;

    let binding = match outcome {
        Outcome::NeedsAuthentication(binding) => binding,
        other => panic!("expected NeedsAuthentication, got {other:?}"),
    };
    match binding.ownership {
        Ownership::Pending { session_id, .. } => assert_eq!(session_id, requester.session_id),
        other => panic!("expected Pending ownership, got {other:?}"),
    }

    // No authorization happened, so no audit entry yet.
    assert!(h.store.audit_entries().await.is_empty());
}

#[tokio::test]
async fn test_authorize_confirms_pending_claim_for_same_session() {
    let h = harness();
    let requester = anonymous();

    let outcome = link(&h, Site::Weibo, &requester).await;
    let Outcome::NeedsAuthentication(binding) = outcome else {
        panic!("expected NeedsAuthentication");
    };

    // The user logs in on the same session, then confirms the claim.
    let client = ClientId(Uuid::new_v4());
    let confirming = Requester::authenticated(requester.session_id, client);
    let confirmed = h.engine.authorize(binding.id, &confirming).await.unwrap();

    assert_eq!(
        confirmed.ownership,
        Ownership::Confirmed { client_id: client }
    );
    let audit = h.store.audit_entries().await;
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].action, AuditAction::AuthorizeThirdPartyAccount);
}

#[tokio::test]
async fn test_authorize_falls_back_to_session_bound_client() {
    let h = harness();
    let requester = anonymous();

    let Outcome::NeedsAuthentication(binding) = link(&h, Site::Weibo, &requester).await else {
        panic!("expected NeedsAuthentication");
    };

    // Still anonymous: no client resolves, confirmation is refused.
    assert_eq!(
        h.engine.authorize(binding.id, &requester).await,
        Err(LinkError::ClaimForbidden)
    );

    // The host app authenticates the session out of band.
    let client = ClientId(Uuid::new_v4());
    h.sessions
        .bind_client(requester.session_id, client)
        .await
        .unwrap();

    let confirmed = h.engine.authorize(binding.id, &requester).await.unwrap();
    assert_eq!(
        confirmed.ownership,
        Ownership::Confirmed { client_id: client }
    );
}

#[tokio::test]
async fn test_relogin_authenticates_session_without_new_audit() {
    let h = harness();
    let (owner_requester, owner) = logged_in();

    let Outcome::Confirmed(canonical) = link(&h, Site::Weibo, &owner_requester).await else {
        panic!("expected Confirmed");
    };
    assert_eq!(h.store.audit_entries().await.len(), 1);

    // Same third-party account, brand new anonymous browser session.
    let returning = anonymous();
    let outcome = link(&h, Site::Weibo, &returning).await;

    let binding = match outcome {
        Outcome::LoggedIn(binding) => binding,
        other => panic!("expected LoggedIn, got {other:?}"),
    };
    assert_eq!(binding.id, canonical.id);
    assert_eq!(binding.ownership, Ownership::Confirmed { client_id: owner });

    // Re-login is not a new authorization event.
    assert_eq!(h.store.audit_entries().await.len(), 1);

    // The returning session is now authenticated as the owner.
    assert_eq!(
        h.sessions.client_for(returning.session_id).await.unwrap(),
        Some(owner)
    );
}

#[tokio::test]
async fn test_conflict_reports_existing_owner() {
    let h = harness();
    let (owner_requester, owner) = logged_in();
    h.clients.insert(owner, "first-owner");

    let Outcome::Confirmed(canonical) = link(&h, Site::Weibo, &owner_requester).await else {
        panic!("expected Confirmed");
    };

    // A different logged-in client links the same third-party account.
    let (challenger, _) = logged_in();
    let outcome = link(&h, Site::Weibo, &challenger).await;

    let (binding, conflicting) = match outcome {
        Outcome::Conflict {
            binding,
            conflicting_client,
        } => (binding, conflicting_client),
        other => panic!("expected Conflict, got {other:?}"),
    };
    assert_eq!(binding.id, canonical.id);
    assert_eq!(conflicting, "first-owner");

    // Confirmed ownership is never reverted by a conflicting claim; only
    // explicit unauthorize does that. The audit log is unchanged.
    assert_eq!(binding.ownership, Ownership::Confirmed { client_id: owner });
    assert_eq!(h.store.audit_entries().await.len(), 1);

    // With no pending claim on the binding, the challenger cannot sidestep
    // the owner by confirming directly.
    assert_eq!(
        h.engine.authorize(binding.id, &challenger).await,
        Err(LinkError::NotFound)
    );
}

#[tokio::test]
async fn test_conflict_resolves_through_unauthorize_then_relink() {
    let h = harness();
    let (owner_requester, owner) = logged_in();
    h.clients.insert(owner, "first-owner");

    let Outcome::Confirmed(canonical) = link(&h, Site::Weibo, &owner_requester).await else {
        panic!("expected Confirmed");
    };

    let (challenger, challenger_client) = logged_in();
    let Outcome::Conflict { .. } = link(&h, Site::Weibo, &challenger).await else {
        panic!("expected Conflict");
    };

    // The owner still owns the binding and can unlink it.
    h.engine.unauthorize(canonical.id, owner).await.unwrap();

    // A fresh flow by the challenger now claims the freed account.
    let outcome = link(&h, Site::Weibo, &challenger).await;
    let binding = match outcome {
        Outcome::Confirmed(binding) => binding,
        other => panic!("expected Confirmed, got {other:?}"),
    };
    assert_eq!(
        binding.ownership,
        Ownership::Confirmed {
            client_id: challenger_client
        }
    );

    // Authorize, unauthorize, authorize: three paired audit entries.
    let audit = h.store.audit_entries().await;
    assert_eq!(audit.len(), 3);
    assert_eq!(audit[0].action, AuditAction::AuthorizeThirdPartyAccount);
    assert_eq!(audit[1].action, AuditAction::UnauthorizeThirdPartyAccount);
    assert_eq!(audit[2].action, AuditAction::AuthorizeThirdPartyAccount);
    assert_eq!(audit[2].client, Some(challenger_client));
}

#[tokio::test]
async fn test_expired_claim_cannot_be_authorized() {
    let h = harness();
    let requester = anonymous();

    let Outcome::NeedsAuthentication(binding) = link(&h, Site::Weibo, &requester).await else {
        panic!("expected NeedsAuthentication");
    };

    // Age the claim past its TTL.
    let mut expired = binding.clone();
    expired.ownership = Ownership::Pending {
        session_id: requester.session_id,
        expires_at: chrono::Utc::now() - chrono::Duration::hours(13),
    };
    let mut tx = h.store.begin().await.unwrap();
    tx.update(&expired).await.unwrap();
    tx.commit().await.unwrap();

    let client = ClientId(Uuid::new_v4());
    let confirming = Requester::authenticated(requester.session_id, client);
    assert_eq!(
        h.engine.authorize(binding.id, &confirming).await,
        Err(LinkError::ClaimExpired)
    );
    assert!(h.store.audit_entries().await.is_empty());
}

#[tokio::test]
async fn test_pending_claims_are_last_writer_wins() {
    let h = harness();
    let first = anonymous();
    let second = anonymous();

    let Outcome::NeedsAuthentication(binding) = link(&h, Site::Weibo, &first).await else {
        panic!("expected NeedsAuthentication");
    };

    // A second anonymous session walks the same flow for the same account.
    let Outcome::NeedsAuthentication(reclaimed) = link(&h, Site::Weibo, &second).await else {
        panic!("expected NeedsAuthentication");
    };
    assert_eq!(reclaimed.id, binding.id);

    // The first session's claim was overwritten.
    let client = ClientId(Uuid::new_v4());
    assert_eq!(
        h.engine
            .authorize(
                binding.id,
                &Requester::authenticated(first.session_id, client)
            )
            .await,
        Err(LinkError::ClaimForbidden)
    );

    // The second session can still confirm.
    let confirmed = h
        .engine
        .authorize(
            binding.id,
            &Requester::authenticated(second.session_id, client),
        )
        .await
        .unwrap();
    assert_eq!(
        confirmed.ownership,
        Ownership::Confirmed { client_id: client }
    );
}

#[tokio::test]
async fn test_unauthorize_destroys_binding_and_audits() {
    let h = harness();
    let (requester, client) = logged_in();

    let Outcome::Confirmed(binding) = link(&h, Site::Weibo, &requester).await else {
        panic!("expected Confirmed");
    };

    h.engine.unauthorize(binding.id, client).await.unwrap();
    assert!(h.store.find_by_id(binding.id).await.unwrap().is_none());

    // The audit trail outlives the binding.
    let audit = h.store.audit_entries().await;
    assert_eq!(audit.len(), 2);
    assert_eq!(audit[1].action, AuditAction::UnauthorizeThirdPartyAccount);
    assert_eq!(audit[1].action.as_str(), "unauthorizeThirdPartyAccount");
    assert_eq!(audit[1].target, binding.id);

    // A second unlink of the same binding reports it gone.
    assert_eq!(
        h.engine.unauthorize(binding.id, client).await,
        Err(LinkError::NotFound)
    );
}

#[tokio::test]
async fn test_unauthorize_by_non_owner_is_rejected() {
    let h = harness();
    let (requester, client) = logged_in();

    let Outcome::Confirmed(binding) = link(&h, Site::Weibo, &requester).await else {
        panic!("expected Confirmed");
    };

    let stranger = ClientId(Uuid::new_v4());
    assert_eq!(
        h.engine.unauthorize(binding.id, stranger).await,
        Err(LinkError::NotOwner)
    );

    // The binding and its audit entry are untouched.
    assert!(h.store.find_by_id(binding.id).await.unwrap().is_some());
    assert_eq!(h.store.audit_entries().await.len(), 1);
}

#[tokio::test]
async fn test_provider_failure_leaves_placeholder_claimable() {
    let h = harness();
    let requester = anonymous();

    let started = h
        .engine
        .start_handshake(Site::Weibo, &requester, None)
        .await
        .unwrap();

    h.adapter.fail_exchange(true);
    let err = h
        .engine
        .reconcile(
            CallbackRef::BindingId(started.binding.id),
            "verifier-code",
            &requester,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LinkError::Provider(_)));

    // Nothing was persisted: the placeholder is still fresh and unclaimed.
    let placeholder = h
        .store
        .find_by_id(started.binding.id)
        .await
        .unwrap()
        .unwrap();
    assert!(placeholder.is_fresh());
    assert_eq!(placeholder.ownership, Ownership::Unclaimed);
    assert!(placeholder.external_profile_id.is_none());
    assert!(h.store.audit_entries().await.is_empty());

    // The provider recovers; the same placeholder completes the flow.
    h.adapter.fail_exchange(false);
    let outcome = h
        .engine
        .reconcile(
            CallbackRef::BindingId(started.binding.id),
            "verifier-code",
            &requester,
        )
        .await
        .unwrap();
    assert!(matches!(outcome, Outcome::NeedsAuthentication(_)));
}

#[tokio::test]
async fn test_dangling_owner_yields_to_a_new_claim() {
    let h = harness();
    let (owner_requester, owner) = logged_in();
    h.clients.insert(owner, "ghost");

    let Outcome::Confirmed(canonical) = link(&h, Site::Weibo, &owner_requester).await else {
        panic!("expected Confirmed");
    };

    // The owning client account is deleted out from under the binding.
    h.clients.remove(owner);

    let (challenger, challenger_client) = logged_in();
    let outcome = link(&h, Site::Weibo, &challenger).await;

    let binding = match outcome {
        Outcome::Confirmed(binding) => binding,
        other => panic!("expected Confirmed, got {other:?}"),
    };
    assert_eq!(binding.id, canonical.id);
    assert_eq!(
        binding.ownership,
        Ownership::Confirmed {
            client_id: challenger_client
        }
    );
    assert_eq!(h.store.audit_entries().await.len(), 2);
}

#[tokio::test]
async fn test_oauth1_callback_is_found_by_request_token() {
    let adapter = MockProviderAdapter::new().with_request_token("req-tok-1", "req-sec-1");
    let h = harness_with(adapter);
    let requester = anonymous();

    let started = h
        .engine
        .start_handshake(Site::Twitter, &requester, None)
        .await
        .unwrap();
    assert_eq!(started.binding.handshake.token, "req-tok-1");
    assert_eq!(started.binding.handshake.secret.as_deref(), Some("req-sec-1"));

    let outcome = h
        .engine
        .reconcile(
            CallbackRef::HandshakeToken("req-tok-1"),
            "oauth-verifier",
            &requester,
        )
        .await
        .unwrap();
    assert!(matches!(outcome, Outcome::NeedsAuthentication(_)));
}

#[tokio::test]
async fn test_repeat_link_by_owner_converges_on_canonical_binding() {
    let h = harness();
    let (requester, owner) = logged_in();

    let Outcome::Confirmed(canonical) = link(&h, Site::Weibo, &requester).await else {
        panic!("expected Confirmed");
    };

    // The owner runs the whole flow again from another tab.
    let outcome = link(&h, Site::Weibo, &requester).await;
    let binding = match outcome {
        Outcome::LoggedIn(binding) => binding,
        other => panic!("expected LoggedIn, got {other:?}"),
    };
    assert_eq!(binding.id, canonical.id);
    assert_eq!(binding.ownership, Ownership::Confirmed { client_id: owner });
    assert_eq!(h.store.audit_entries().await.len(), 1);
}

#[tokio::test]
async fn test_find_by_access_token_after_confirm() {
    let h = harness();
    let (requester, _) = logged_in();

    let Outcome::Confirmed(binding) = link(&h, Site::Weibo, &requester).await else {
        panic!("expected Confirmed");
    };

    let found = h
        .engine
        .find_by_access_token("mock-access-token")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, binding.id);
    assert!(
        h.engine
            .find_by_access_token("unknown-token")
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_bindings_are_scoped_per_site() {
    let h = harness();
    let (requester, client) = logged_in();

    let Outcome::Confirmed(weibo) = link(&h, Site::Weibo, &requester).await else {
        panic!("expected Confirmed");
    };
    let Outcome::Confirmed(twitter) = link(&h, Site::Twitter, &requester).await else {
        panic!("expected Confirmed");
    };

    // Same external profile id on two sites stays two independent bindings.
    assert_ne!(weibo.id, twitter.id);
    assert_eq!(weibo.ownership, Ownership::Confirmed { client_id: client });
    assert_eq!(twitter.ownership, Ownership::Confirmed { client_id: client });
    assert_eq!(h.store.audit_entries().await.len(), 2);
}
