//! Linking router composition.
//!
//! Composes the linking handlers into a single Axum router.

use crate::engine::ReconciliationEngine;
use crate::handlers;
use crate::providers::{ClientDirectory, LinkStore, ProviderAdapter, SessionStore};
use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;

/// Create the linking router with all endpoints.
///
/// # Routes
///
/// - `GET /auth/options` - List configured provider sites
/// - `GET /auth/:site` - Start a handshake, redirect to the provider
/// - `GET /auth/:site/callback` - Provider callback, relay to the app
/// - `GET /auth/:site/redirect` - Reconcile the relayed callback
/// - `POST /auth/authorize` - Confirm a pending claim
/// - `DELETE /auth/:auth_id` - Destroy a confirmed binding
///
/// The host application must install middleware that inserts a
/// [`crate::state::Requester`] request extension before this router runs.
///
/// # Example
///
/// ```rust,ignore
/// let engine = Arc::new(ReconciliationEngine::new(
///     adapters,
///     store,
///     client_directory,
///     session_store,
///     config,
/// ));
///
/// let app = Router::new()
///     .merge(link_router(engine))
///     .layer(middleware::from_fn(resolve_requester));
/// ```
pub fn link_router<P, S, C, SS>(engine: Arc<ReconciliationEngine<P, S, C, SS>>) -> Router
where
    P: ProviderAdapter + Send + Sync + 'static,
    S: LinkStore + Send + Sync + 'static,
    C: ClientDirectory + Send + Sync + 'static,
    SS: SessionStore + Send + Sync + 'static,
{
    Router::new()
        .route("/auth/options", get(handlers::options::<P, S, C, SS>))
        .route("/auth/authorize", post(handlers::authorize::<P, S, C, SS>))
        .route(
            "/auth/:site/callback",
            get(handlers::callback::<P, S, C, SS>),
        )
        .route(
            "/auth/:site/redirect",
            get(handlers::redirect::<P, S, C, SS>),
        )
        .route(
            "/auth/:site",
            get(handlers::start::<P, S, C, SS>).delete(handlers::unauthorize::<P, S, C, SS>),
        )
        .with_state(engine)
}
