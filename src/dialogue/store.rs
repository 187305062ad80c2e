use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

use super::state::SessionState;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session store unavailable: {0}")]
    Unavailable(String),
    #[error("session store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("session record for {session_id} is corrupt: {reason}")]
    Corrupt { session_id: String, reason: String },
}

/// Mutation applied to a private copy of the session; the copy replaces the
/// stored state only if the whole mutation (and any write-back) succeeds.
pub type Mutator = Box<dyn FnOnce(&mut SessionState) + Send>;

/// Per-session conversation memory.
///
/// Concurrency contract: calls for one session id are serialized (at most one
/// in flight); calls for different ids never wait on each other. Reads of an
/// idle or expired session transparently yield a fresh `SessionState`.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Current live state, without creating one.
    async fn get(&self, session_id: &str) -> Result<Option<SessionState>, StoreError>;

    async fn get_or_create(&self, session_id: &str) -> Result<SessionState, StoreError>;

    async fn update(&self, session_id: &str, mutator: Mutator) -> Result<SessionState, StoreError>;

    /// Drop sessions idle at `now`. Sessions with an in-flight call are skipped.
    async fn expire_idle(&self, now: DateTime<Utc>) -> Result<usize, StoreError>;

    /// Forget a session immediately (conversation ended). Returns whether it existed.
    async fn remove(&self, session_id: &str) -> Result<bool, StoreError>;
}

#[async_trait]
impl<T: SessionStore + ?Sized> SessionStore for Arc<T> {
    async fn get(&self, session_id: &str) -> Result<Option<SessionState>, StoreError> {
        (**self).get(session_id).await
    }

    async fn get_or_create(&self, session_id: &str) -> Result<SessionState, StoreError> {
        (**self).get_or_create(session_id).await
    }

    async fn update(&self, session_id: &str, mutator: Mutator) -> Result<SessionState, StoreError> {
        (**self).update(session_id, mutator).await
    }

    async fn expire_idle(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        (**self).expire_idle(now).await
    }

    async fn remove(&self, session_id: &str) -> Result<bool, StoreError> {
        (**self).remove(session_id).await
    }
}
