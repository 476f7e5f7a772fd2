//! Binding store implementations.

pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::MemoryLinkStore;

#[cfg(feature = "postgres")]
pub use postgres::PostgresLinkStore;
