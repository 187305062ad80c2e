use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::debug;

use super::locks::KeyedLocks;
use super::state::SessionState;
use super::store::{Mutator, SessionStore, StoreError};
use crate::kernel::time::Clock;

/// In-process session store. Lossy across restarts.
pub struct InMemorySessionStore {
    sessions: KeyedLocks<Option<SessionState>>,
    idle_timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl InMemorySessionStore {
    pub fn new(idle_timeout: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: KeyedLocks::new(),
            idle_timeout,
            clock,
        }
    }

    /// Number of tracked slots, including ones not yet swept.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn live(&self, slot: &Option<SessionState>, now: DateTime<Utc>) -> Option<SessionState> {
        match slot {
            Some(state) if !state.is_idle(now, self.idle_timeout) => Some(state.clone()),
            Some(state) => {
                debug!(session_id = %state.session_id, "session idle past timeout, starting fresh");
                None
            }
            None => None,
        }
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, session_id: &str) -> Result<Option<SessionState>, StoreError> {
        let slot = self.sessions.lock(session_id).await;
        Ok(self.live(&slot, self.clock.now()))
    }

    async fn get_or_create(&self, session_id: &str) -> Result<SessionState, StoreError> {
        let mut slot = self.sessions.lock(session_id).await;
        let now = self.clock.now();
        let state = match self.live(&slot, now) {
            Some(state) => state,
            None => {
                let fresh = SessionState::new(session_id, now);
                *slot = Some(fresh.clone());
                fresh
            }
        };
        Ok(state)
    }

    async fn update(&self, session_id: &str, mutator: Mutator) -> Result<SessionState, StoreError> {
        let mut slot = self.sessions.lock(session_id).await;
        let now = self.clock.now();
        let mut next = self
            .live(&slot, now)
            .unwrap_or_else(|| SessionState::new(session_id, now));
        mutator(&mut next);
        *slot = Some(next.clone());
        Ok(next)
    }

    async fn expire_idle(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut expired = 0;
        self.sessions.retain(|_, slot| match slot {
            Some(state) if state.is_idle(now, self.idle_timeout) => {
                expired += 1;
                false
            }
            Some(_) => true,
            None => false,
        });
        Ok(expired)
    }

    async fn remove(&self, session_id: &str) -> Result<bool, StoreError> {
        let mut slot = self.sessions.lock(session_id).await;
        Ok(slot.take().is_some())
    }
}
