use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::locks::KeyedLocks;
use super::state::SessionState;
use super::store::{Mutator, SessionStore, StoreError};
use crate::kernel::time::Clock;

const RECORD_EXT: &str = "json";
const TEMP_EXT: &str = "json.tmp";

/// Session store backed by one JSON record per session in a directory.
///
/// Records are written to a temp file and renamed into place, so a failed
/// write leaves the previous record intact.
pub struct JsonFileSessionStore {
    dir: PathBuf,
    locks: KeyedLocks<()>,
    idle_timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl JsonFileSessionStore {
    pub async fn open(dir: impl AsRef<Path>, idle_timeout: Duration, clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            locks: KeyedLocks::new(),
            idle_timeout,
            clock,
        })
    }

    /// Session ids are caller-supplied; hash them into a safe file name.
    pub fn record_path(&self, session_id: &str) -> PathBuf {
        let name = Uuid::new_v5(&Uuid::NAMESPACE_OID, session_id.as_bytes());
        self.dir.join(format!("{}.{}", name, RECORD_EXT))
    }

    async fn read_path(path: &Path, session_id: &str) -> Result<Option<SessionState>, StoreError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| StoreError::Corrupt {
                    session_id: session_id.to_string(),
                    reason: e.to_string(),
                }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Live record for `session_id`; idle or corrupt records count as absent.
    async fn load_live(&self, session_id: &str, now: DateTime<Utc>) -> Result<Option<SessionState>, StoreError> {
        match Self::read_path(&self.record_path(session_id), session_id).await {
            Ok(Some(state)) if state.is_idle(now, self.idle_timeout) => {
                debug!(session_id, "session idle past timeout, starting fresh");
                Ok(None)
            }
            Ok(found) => Ok(found),
            Err(StoreError::Corrupt { session_id, reason }) => {
                warn!(%session_id, %reason, "discarding corrupt session record");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn write(&self, state: &SessionState) -> Result<(), StoreError> {
        let path = self.record_path(&state.session_id);
        let tmp = path.with_extension(TEMP_EXT);
        let json = serde_json::to_vec_pretty(state).map_err(|e| StoreError::Corrupt {
            session_id: state.session_id.clone(),
            reason: e.to_string(),
        })?;
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for JsonFileSessionStore {
    async fn get(&self, session_id: &str) -> Result<Option<SessionState>, StoreError> {
        let _guard = self.locks.lock(session_id).await;
        self.load_live(session_id, self.clock.now()).await
    }

    async fn get_or_create(&self, session_id: &str) -> Result<SessionState, StoreError> {
        let _guard = self.locks.lock(session_id).await;
        let now = self.clock.now();
        match self.load_live(session_id, now).await? {
            Some(state) => Ok(state),
            None => {
                let fresh = SessionState::new(session_id, now);
                self.write(&fresh).await?;
                Ok(fresh)
            }
        }
    }

    async fn update(&self, session_id: &str, mutator: Mutator) -> Result<SessionState, StoreError> {
        let _guard = self.locks.lock(session_id).await;
        let now = self.clock.now();
        let mut next = self
            .load_live(session_id, now)
            .await?
            .unwrap_or_else(|| SessionState::new(session_id, now));
        mutator(&mut next);
        self.write(&next).await?;
        Ok(next)
    }

    async fn expire_idle(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut expired = 0;
        let mut entries = tokio::fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXT) {
                continue;
            }
            let Ok(bytes) = tokio::fs::read(&path).await else {
                continue;
            };
            let Ok(state) = serde_json::from_slice::<SessionState>(&bytes) else {
                continue;
            };
            if !state.is_idle(now, self.idle_timeout) {
                continue;
            }

            // Skip sessions with a call in flight; re-check under the lock.
            let slot = self.locks.slot(&state.session_id);
            let Ok(_guard) = slot.try_lock() else {
                continue;
            };
            match Self::read_path(&path, &state.session_id).await {
                Ok(Some(current)) if current.is_idle(now, self.idle_timeout) => {
                    match tokio::fs::remove_file(&path).await {
                        Ok(()) => expired += 1,
                        Err(e) if e.kind() == ErrorKind::NotFound => {}
                        Err(e) => return Err(e.into()),
                    }
                }
                _ => {}
            }
        }

        self.locks.prune_unused();
        Ok(expired)
    }

    async fn remove(&self, session_id: &str) -> Result<bool, StoreError> {
        let _guard = self.locks.lock(session_id).await;
        match tokio::fs::remove_file(self.record_path(session_id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
