use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use tenantgate_auth::{RotationOutcome, Session, SessionStore, StoreError};
use tenantgate_core::{SessionId, TokenId, UserId};

/// In-memory session store.
///
/// Intended for tests/dev. Each mutation runs under the write lock, which
/// makes `mark_rotated` a compare-and-swap on `current_token_id`.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<SessionId, Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sessions belonging to `user_id`, in no particular order.
    pub fn sessions_of(&self, user_id: UserId) -> Result<Vec<Session>, StoreError> {
        let sessions = self.sessions.read().map_err(|_| poisoned())?;
        Ok(sessions
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect())
    }

    fn update<T>(
        &self,
        id: SessionId,
        f: impl FnOnce(&mut Session) -> T,
    ) -> Result<Option<T>, StoreError> {
        let mut sessions = self.sessions.write().map_err(|_| poisoned())?;
        Ok(sessions.get_mut(&id).map(f))
    }
}

fn poisoned() -> StoreError {
    StoreError::Unavailable("session store lock poisoned".to_string())
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, session: Session) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().map_err(|_| poisoned())?;
        if sessions.contains_key(&session.session_id) {
            return Err(StoreError::DuplicateSession);
        }
        sessions.insert(session.session_id, session);
        Ok(())
    }

    async fn get_by_session_id(&self, id: SessionId) -> Result<Option<Session>, StoreError> {
        let sessions = self.sessions.read().map_err(|_| poisoned())?;
        Ok(sessions.get(&id).cloned())
    }

    async fn mark_rotated(
        &self,
        id: SessionId,
        presented: TokenId,
        next: TokenId,
        now: DateTime<Utc>,
    ) -> Result<RotationOutcome, StoreError> {
        Ok(self
            .update(id, |s| s.rotate(presented, next, now))?
            .unwrap_or(RotationOutcome::NotFound))
    }

    async fn mark_revoked(&self, id: SessionId, now: DateTime<Utc>) -> Result<bool, StoreError> {
        Ok(self.update(id, |s| s.revoke(now))?.unwrap_or(false))
    }

    async fn mark_expired(&self, id: SessionId, now: DateTime<Utc>) -> Result<bool, StoreError> {
        Ok(self.update(id, |s| s.expire(now))?.unwrap_or(false))
    }

    async fn is_active(&self, id: SessionId) -> Result<bool, StoreError> {
        let sessions = self.sessions.read().map_err(|_| poisoned())?;
        Ok(sessions.get(&id).is_some_and(Session::is_live))
    }

    async fn expire_stale(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut sessions = self.sessions.write().map_err(|_| poisoned())?;
        let mut expired = 0;
        for session in sessions.values_mut() {
            if session.has_outlived(now) && session.expire(now) {
                expired += 1;
            }
        }
        Ok(expired)
    }
}
