//! HTTP handlers for the linking flow.
//!
//! Thin boundary over [`ReconciliationEngine`]: handlers parse and validate
//! request parameters, call one engine operation, and map the outcome to a
//! status/body pair. No linking decisions are made here.
//!
//! The host application is expected to install middleware that resolves its
//! own session/authentication scheme into a [`Requester`] request extension;
//! every handler except `options` reads it.
//!
//! All binding payloads pass through [`Binding::redacted`] before leaving
//! the process; access credentials and handshake secrets never appear in a
//! response body.

use crate::engine::{CallbackRef, ReconciliationEngine};
use crate::error::LinkError;
use crate::providers::{ClientDirectory, LinkStore, ProviderAdapter, SessionStore};
use crate::state::{Binding, BindingId, Outcome, Requester, Site};
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Boundary error: wraps [`LinkError`] with its HTTP status mapping.
#[derive(Debug)]
pub struct ApiError(pub LinkError);

impl From<LinkError> for ApiError {
    fn from(err: LinkError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            LinkError::NotFound => StatusCode::NOT_FOUND,
            LinkError::ClaimForbidden | LinkError::ClaimExpired | LinkError::NotOwner => {
                StatusCode::FORBIDDEN
            }
            LinkError::Validation(_) => StatusCode::BAD_REQUEST,
            LinkError::Provider(_) => StatusCode::BAD_GATEWAY,
            LinkError::StorageConflict | LinkError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        // Provider and storage details stay in the logs.
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR
            || status == StatusCode::BAD_GATEWAY
        {
            tracing::error!(error = %self.0, "Linking operation failed");
            "Linking operation failed".to_string()
        } else {
            self.0.to_string()
        };
        (status, Json(serde_json::json!({ "message": message }))).into_response()
    }
}

/// Sites the engine is configured for.
#[derive(Debug, Clone, Serialize)]
pub struct OptionsResponse {
    /// Supported provider sites, in stable order.
    pub sites: Vec<Site>,
}

/// Query parameters accepted when starting a handshake.
#[derive(Debug, Clone, Deserialize)]
pub struct StartQuery {
    /// Page to relay the provider callback parameters back to.
    pub redirect: Option<String>,
}

/// Provider callback query parameters.
///
/// OAuth1 providers send `oauth_token`/`oauth_verifier`; OAuth2 providers
/// send `code`/`state`.
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    /// OAuth1 request token, echoed back by the provider.
    pub oauth_token: Option<String>,

    /// OAuth1 verifier.
    pub oauth_verifier: Option<String>,

    /// OAuth2 authorization code.
    pub code: Option<String>,

    /// OAuth2 state parameter, as generated at handshake start.
    pub state: Option<String>,
}

/// Query parameters for the reconcile endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedirectQuery {
    /// Binding id relayed through the callback page.
    pub auth_id: BindingId,

    /// Verifier or authorization code relayed through the callback page.
    pub verifier: String,
}

/// Request to confirm a pending claim.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeRequest {
    /// Binding carrying the pending claim.
    pub auth_id: BindingId,
}

/// List the configured provider sites.
///
/// # Endpoint
///
/// ```text
/// GET /auth/options
/// ```
pub async fn options<P, S, C, SS>(
    State(engine): State<Arc<ReconciliationEngine<P, S, C, SS>>>,
) -> Json<OptionsResponse>
where
    P: ProviderAdapter + Send + Sync + 'static,
    S: LinkStore + Send + Sync + 'static,
    C: ClientDirectory + Send + Sync + 'static,
    SS: SessionStore + Send + Sync + 'static,
{
    Json(OptionsResponse {
        sites: engine.sites(),
    })
}

/// Start a linking handshake and redirect the user to the provider.
///
/// # Endpoint
///
/// ```text
/// GET /auth/:site?redirect=...
/// ```
///
/// # Response
///
/// HTTP 307 redirect to the provider's authorization page.
pub async fn start<P, S, C, SS>(
    State(engine): State<Arc<ReconciliationEngine<P, S, C, SS>>>,
    Path(site): Path<String>,
    Query(query): Query<StartQuery>,
    Extension(requester): Extension<Requester>,
) -> Result<Redirect, ApiError>
where
    P: ProviderAdapter + Send + Sync + 'static,
    S: LinkStore + Send + Sync + 'static,
    C: ClientDirectory + Send + Sync + 'static,
    SS: SessionStore + Send + Sync + 'static,
{
    let site: Site = site.parse().map_err(LinkError::Validation)?;

    let started = engine
        .start_handshake(site, &requester, query.redirect)
        .await?;
    Ok(Redirect::temporary(&started.authorize_url))
}

/// Receive the provider callback and relay its parameters.
///
/// The provider lands the user here; the handler resolves the placeholder
/// binding and hands the flow back to the page that initiated it, which is
/// expected to call the redirect endpoint next.
///
/// # Endpoint
///
/// ```text
/// GET /auth/:site/callback?oauth_token=...&oauth_verifier=...   (OAuth1)
/// GET /auth/:site/callback?code=...&state=...                   (OAuth2)
/// ```
///
/// # Response
///
/// An HTML relay page when the handshake captured a redirect URL; the
/// relay parameters as JSON otherwise (API-driven flows).
pub async fn callback<P, S, C, SS>(
    State(engine): State<Arc<ReconciliationEngine<P, S, C, SS>>>,
    Path(_site): Path<String>,
    Query(query): Query<CallbackQuery>,
) -> Result<Response, ApiError>
where
    P: ProviderAdapter + Send + Sync + 'static,
    S: LinkStore + Send + Sync + 'static,
    C: ClientDirectory + Send + Sync + 'static,
    SS: SessionStore + Send + Sync + 'static,
{
    let token = query
        .oauth_token
        .as_deref()
        .or(query.state.as_deref())
        .ok_or_else(|| LinkError::Validation("Missing oauth_token or state".to_string()))?;
    let verifier = query
        .oauth_verifier
        .as_deref()
        .or(query.code.as_deref())
        .ok_or_else(|| LinkError::Validation("Missing oauth_verifier or code".to_string()))?;

    let binding = engine
        .binding_for_callback(CallbackRef::HandshakeToken(token))
        .await?;

    let auth_id = binding.id.to_string();
    match &binding.redirect {
        Some(redirect) => {
            let target =
                crate::utils::relay_url(redirect, &[("authId", &auth_id), ("verifier", verifier)]);
            Ok(Html(relay_page(&target)).into_response())
        }
        None => Ok(Json(serde_json::json!({
            "authId": auth_id,
            "verifier": verifier,
            "site": binding.site,
        }))
        .into_response()),
    }
}

/// Reconcile the relayed callback into a binding outcome.
///
/// # Endpoint
///
/// ```text
/// GET /auth/:site/redirect?authId=...&verifier=...
/// ```
///
/// # Response
///
/// - `201` with the binding: confirmed for the requester's client
/// - `200` with the binding: returning account, session authenticated
/// - `202` `{"name": "authentication required", "auth": ...}`: pending
///   claim stashed, the requester must log in and authorize
/// - `202` `{"name": "already connected", "conflict": ..., "auth": ...}`:
///   the account belongs to another client
pub async fn redirect<P, S, C, SS>(
    State(engine): State<Arc<ReconciliationEngine<P, S, C, SS>>>,
    Path(_site): Path<String>,
    Query(query): Query<RedirectQuery>,
    Extension(requester): Extension<Requester>,
) -> Result<Response, ApiError>
where
    P: ProviderAdapter + Send + Sync + 'static,
    S: LinkStore + Send + Sync + 'static,
    C: ClientDirectory + Send + Sync + 'static,
    SS: SessionStore + Send + Sync + 'static,
{
    let outcome = engine
        .reconcile(
            CallbackRef::BindingId(query.auth_id),
            &query.verifier,
            &requester,
        )
        .await?;

    Ok(outcome_response(outcome))
}

fn outcome_response(outcome: Outcome) -> Response {
    match outcome {
        Outcome::Confirmed(binding) => {
            (StatusCode::CREATED, Json(binding.redacted())).into_response()
        }
        Outcome::LoggedIn(binding) => (StatusCode::OK, Json(binding.redacted())).into_response(),
        Outcome::NeedsAuthentication(binding) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({
                "name": "authentication required",
                "auth": binding.redacted(),
            })),
        )
            .into_response(),
        Outcome::Conflict {
            binding,
            conflicting_client,
        } => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({
                "name": "already connected",
                "conflict": conflicting_client,
                "auth": binding.redacted(),
            })),
        )
            .into_response(),
    }
}

/// Confirm a pending claim.
///
/// # Endpoint
///
/// ```text
/// POST /auth/authorize  {"authId": "..."}
/// ```
///
/// # Response
///
/// `201` with the confirmed binding.
pub async fn authorize<P, S, C, SS>(
    State(engine): State<Arc<ReconciliationEngine<P, S, C, SS>>>,
    Extension(requester): Extension<Requester>,
    Json(request): Json<AuthorizeRequest>,
) -> Result<(StatusCode, Json<Binding>), ApiError>
where
    P: ProviderAdapter + Send + Sync + 'static,
    S: LinkStore + Send + Sync + 'static,
    C: ClientDirectory + Send + Sync + 'static,
    SS: SessionStore + Send + Sync + 'static,
{
    let binding = engine.authorize(request.auth_id, &requester).await?;
    Ok((StatusCode::CREATED, Json(binding.redacted())))
}

/// Destroy a confirmed binding.
///
/// # Endpoint
///
/// ```text
/// DELETE /auth/:auth_id
/// ```
///
/// # Response
///
/// `201` on success; `403` unless the requesting client owns the binding.
pub async fn unauthorize<P, S, C, SS>(
    State(engine): State<Arc<ReconciliationEngine<P, S, C, SS>>>,
    Path(auth_id): Path<BindingId>,
    Extension(requester): Extension<Requester>,
) -> Result<StatusCode, ApiError>
where
    P: ProviderAdapter + Send + Sync + 'static,
    S: LinkStore + Send + Sync + 'static,
    C: ClientDirectory + Send + Sync + 'static,
    SS: SessionStore + Send + Sync + 'static,
{
    let client_id = requester.client_id.ok_or(LinkError::NotOwner)?;
    engine.unauthorize(auth_id, client_id).await?;
    Ok(StatusCode::CREATED)
}

/// Minimal page that forwards the browser to the relayed target URL.
fn relay_page(target: &str) -> String {
    let escaped = target.replace('&', "&amp;").replace('"', "&quot;");
    format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\">\
         <meta http-equiv=\"refresh\" content=\"0;url={escaped}\"></head>\n\
         <body>Returning to the application&hellip;</body>\n</html>\n"
    )
}
