//! Collaborator seams of the linking core.
//!
//! This module defines traits for every external dependency the
//! reconciliation engine talks to. Providers are **interfaces**, not
//! implementations: the engine depends on these traits and the host
//! application injects concrete implementations.
//!
//! - **Testing**: wire the mocks (in-memory, deterministic)
//! - **Production**: wire real services (provider HTTP APIs, PostgreSQL)
//! - **Development**: wire the memory store for a single-node setup

pub mod adapter;
pub mod client_directory;
pub mod session;
pub mod store;
pub mod weibo;

pub use adapter::{Handshake, ProviderAdapter};
pub use client_directory::{Client, ClientDirectory};
pub use session::SessionStore;
pub use store::{LinkStore, LinkStoreTx};
pub use weibo::WeiboAdapter;
