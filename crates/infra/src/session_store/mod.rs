//! `SessionStore` implementations.
//!
//! Both stores run rotation as one conditional update per session, so two
//! requests presenting the same refresh token cannot both succeed.

pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use in_memory::InMemorySessionStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresSessionStore;
