//! In-memory collaborators for testing.
//!
//! Wired together with [`crate::stores::MemoryLinkStore`], these let the
//! whole reconciliation flow run deterministically at memory speed.

pub mod client_directory;
pub mod provider;
pub mod session;

pub use client_directory::MockClientDirectory;
pub use provider::MockProviderAdapter;
pub use session::MemorySessionStore;
