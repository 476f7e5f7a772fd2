//! # Third-Party Account Linking
//!
//! This crate binds third-party identity-provider accounts (OAuth1/OAuth2)
//! to first-party client accounts in applications that support both
//! anonymous (session-only) and authenticated (client-bound) usage.
//!
//! The OAuth handshake itself is treated as a black box behind
//! [`providers::ProviderAdapter`]; the heart of the crate is the
//! [`engine::ReconciliationEngine`], which decides, once a provider
//! callback has returned a verified external profile, which first-party
//! account the profile attaches to, resolving conflicts, pending claims,
//! and expiring unconfirmed ownership.
//!
//! ## Outcomes
//!
//! A reconciliation ends in one of four states the caller must handle:
//!
//! - [`Outcome::Confirmed`]: the binding now belongs to the requester
//! - [`Outcome::LoggedIn`]: a returning confirmed account authenticated
//!   the requester's session
//! - [`Outcome::NeedsAuthentication`]: a pending claim was stashed; the
//!   requester must log in and call explicit authorize within the TTL
//! - [`Outcome::Conflict`]: another client owns the account; the caller
//!   must explicitly unauthorize the existing owner before re-claiming
//!
//! ## Example
//!
//! ```rust,ignore
//! use thirdparty_link::prelude::*;
//!
//! let engine = ReconciliationEngine::new(
//!     adapters,          // Site -> ProviderAdapter map
//!     store,             // LinkStore (memory or postgres)
//!     client_directory,  // host app's client accounts
//!     session_store,     // host app's session affinity
//!     LinkConfig::new("https://api.example.com".into()),
//! );
//!
//! let started = engine.start_handshake(Site::Weibo, &requester, None).await?;
//! // redirect the user to started.authorize_url ...
//! let outcome = engine
//!     .reconcile(CallbackRef::BindingId(started.binding.id), &code, &requester)
//!     .await?;
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

// Public modules
pub mod config;
pub mod engine;
pub mod error;
pub mod providers;
pub mod state;
pub mod stores;
pub mod utils;

#[cfg(feature = "test-utils")]
pub mod mocks;

#[cfg(feature = "axum")]
pub mod handlers;
#[cfg(feature = "axum")]
pub mod router;

// Re-export main types for convenience
pub use config::LinkConfig;
pub use engine::{CallbackRef, ReconciliationEngine};
pub use error::{LinkError, Result};
pub use state::{
    AccessCredentials, AuditAction, AuditEntry, Binding, BindingId, ClientId, ExternalProfile,
    Outcome, Ownership, Requester, SessionId, Site, StartedHandshake,
};
