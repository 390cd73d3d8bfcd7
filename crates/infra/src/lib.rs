//! Infrastructure layer: session and user storage, background workers.

pub mod session_store;
pub mod user_store;
pub mod workers;

pub use session_store::InMemorySessionStore;
#[cfg(feature = "postgres")]
pub use session_store::PostgresSessionStore;
pub use user_store::{InMemoryCredentialStore, InMemoryUserStore};
pub use workers::{SessionSweeper, WorkerHandle};
