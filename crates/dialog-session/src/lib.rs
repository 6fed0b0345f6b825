//! Session state for dialog-service
//!
//! A `Session` is the only durable artifact of a call: its identity, the
//! pruned conversation history and free-form metadata. Sessions live in
//! Redis under `session:{id}` with a sliding TTL; the cache is the only
//! carrier of state between streams.

pub mod session;
pub mod store;

pub use session::{Session, MAX_HISTORY_TURNS};
pub use store::{RedisSessionStore, SessionStore, SESSION_TTL};

use thiserror::Error;

/// Result type for session-store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors raised by the session store. A cache miss is not an error;
/// both variants mean the store could not be used at all.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("session store unavailable: {0}")]
    Unavailable(#[from] redis::RedisError),

    #[error("session payload could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
}
