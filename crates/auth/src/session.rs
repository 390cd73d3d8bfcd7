//! Server-tracked login sessions and the store contract that mutates them.
//!
//! State machine:
//!
//! ```text
//!   ACTIVE ──refresh──▶ ROTATED ──refresh──▶ ROTATED ...
//!     │                    │
//!     ├── logout / reuse ──┴──▶ REVOKED   (terminal)
//!     └── lifetime elapsed ───▶ EXPIRED   (terminal)
//! ```
//!
//! `ROTATED` is live: its chain continues with the refresh token installed by
//! the last rotation. Terminal states never transition again.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use tenantgate_core::{BranchId, OrgId, SessionId, TokenId, UserId};

use crate::error::StoreError;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Active,
    Rotated,
    Revoked,
    Expired,
}

impl SessionState {
    pub fn is_live(self) -> bool {
        matches!(self, SessionState::Active | SessionState::Rotated)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_live()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Active => "active",
            SessionState::Rotated => "rotated",
            SessionState::Revoked => "revoked",
            SessionState::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(SessionState::Active),
            "rotated" => Some(SessionState::Rotated),
            "revoked" => Some(SessionState::Revoked),
            "expired" => Some(SessionState::Expired),
            _ => None,
        }
    }
}

impl core::fmt::Display for SessionState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: SessionId,
    pub user_id: UserId,
    /// Organization context chosen at login; carried across rotations.
    pub org_id: OrgId,
    pub branch_id: Option<BranchId>,
    pub created_at: DateTime<Utc>,
    /// Absolute end of the session, independent of token lifetimes.
    pub expires_at: DateTime<Utc>,
    pub state: SessionState,
    pub last_rotated_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    /// The only refresh token of this chain that may still be exchanged.
    pub current_token_id: TokenId,
    pub rotation_count: u32,
}

/// Result of the atomic consume-and-rotate operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotationOutcome {
    /// The presented token was current; the chain now continues with the new one.
    Rotated(Session),
    /// The presented token was already consumed; the session is now `REVOKED`.
    ReuseDetected,
    /// The session was already terminal; nothing changed.
    NotLive(SessionState),
    NotFound,
}

impl Session {
    pub fn start(
        user_id: UserId,
        org_id: OrgId,
        branch_id: Option<BranchId>,
        first_token: TokenId,
        now: DateTime<Utc>,
        lifetime: Duration,
    ) -> Self {
        Self {
            session_id: SessionId::new(),
            user_id,
            org_id,
            branch_id,
            created_at: now,
            expires_at: now + lifetime,
            state: SessionState::Active,
            last_rotated_at: None,
            ended_at: None,
            current_token_id: first_token,
            rotation_count: 0,
        }
    }

    pub fn is_live(&self) -> bool {
        self.state.is_live()
    }

    pub fn has_outlived(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Consume `presented` and install `next`, or revoke on reuse.
    ///
    /// Stores must run this as one atomic step per session.
    pub fn rotate(&mut self, presented: TokenId, next: TokenId, now: DateTime<Utc>) -> RotationOutcome {
        if !self.is_live() {
            return RotationOutcome::NotLive(self.state);
        }
        if self.current_token_id != presented {
            self.state = SessionState::Revoked;
            self.ended_at = Some(now);
            return RotationOutcome::ReuseDetected;
        }
        self.state = SessionState::Rotated;
        self.current_token_id = next;
        self.last_rotated_at = Some(now);
        self.rotation_count += 1;
        RotationOutcome::Rotated(self.clone())
    }

    /// Returns `true` if this call moved the session to `REVOKED`.
    pub fn revoke(&mut self, now: DateTime<Utc>) -> bool {
        self.end(SessionState::Revoked, now)
    }

    /// Returns `true` if this call moved the session to `EXPIRED`.
    pub fn expire(&mut self, now: DateTime<Utc>) -> bool {
        self.end(SessionState::Expired, now)
    }

    fn end(&mut self, terminal: SessionState, now: DateTime<Utc>) -> bool {
        if !self.is_live() {
            return false;
        }
        self.state = terminal;
        self.ended_at = Some(now);
        true
    }
}

/// Shared, concurrently mutated session storage.
///
/// Every method is individually atomic. `mark_rotated` in particular must be a
/// single conditional update keyed by session and current token id: of two
/// concurrent calls with the same presented token exactly one observes
/// `Rotated`, the other `ReuseDetected`, and the session ends `REVOKED`.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, session: Session) -> Result<(), StoreError>;

    async fn get_by_session_id(&self, id: SessionId) -> Result<Option<Session>, StoreError>;

    async fn mark_rotated(
        &self,
        id: SessionId,
        presented: TokenId,
        next: TokenId,
        now: DateTime<Utc>,
    ) -> Result<RotationOutcome, StoreError>;

    async fn mark_revoked(&self, id: SessionId, now: DateTime<Utc>) -> Result<bool, StoreError>;

    async fn mark_expired(&self, id: SessionId, now: DateTime<Utc>) -> Result<bool, StoreError>;

    async fn is_active(&self, id: SessionId) -> Result<bool, StoreError>;

    /// Move every live session past its absolute lifetime to `EXPIRED`.
    async fn expire_stale(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}

#[async_trait]
impl<S> SessionStore for Arc<S>
where
    S: SessionStore + ?Sized,
{
    async fn create(&self, session: Session) -> Result<(), StoreError> {
        (**self).create(session).await
    }

    async fn get_by_session_id(&self, id: SessionId) -> Result<Option<Session>, StoreError> {
        (**self).get_by_session_id(id).await
    }

    async fn mark_rotated(
        &self,
        id: SessionId,
        presented: TokenId,
        next: TokenId,
        now: DateTime<Utc>,
    ) -> Result<RotationOutcome, StoreError> {
        (**self).mark_rotated(id, presented, next, now).await
    }

    async fn mark_revoked(&self, id: SessionId, now: DateTime<Utc>) -> Result<bool, StoreError> {
        (**self).mark_revoked(id, now).await
    }

    async fn mark_expired(&self, id: SessionId, now: DateTime<Utc>) -> Result<bool, StoreError> {
        (**self).mark_expired(id, now).await
    }

    async fn is_active(&self, id: SessionId) -> Result<bool, StoreError> {
        (**self).is_active(id).await
    }

    async fn expire_stale(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        (**self).expire_stale(now).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(now: DateTime<Utc>) -> (Session, TokenId) {
        let first = TokenId::new();
        let s = Session::start(UserId::new(), OrgId::new(), None, first, now, Duration::days(30));
        (s, first)
    }

    #[test]
    fn rotation_installs_next_token() {
        let now = Utc::now();
        let (mut s, first) = session(now);
        let next = TokenId::new();

        let RotationOutcome::Rotated(after) = s.rotate(first, next, now) else {
            panic!("expected rotation");
        };
        assert_eq!(after.state, SessionState::Rotated);
        assert_eq!(after.current_token_id, next);
        assert_eq!(after.rotation_count, 1);
        assert_eq!(after.last_rotated_at, Some(now));
    }

    #[test]
    fn presenting_a_consumed_token_revokes() {
        let now = Utc::now();
        let (mut s, first) = session(now);
        s.rotate(first, TokenId::new(), now);

        assert_eq!(s.rotate(first, TokenId::new(), now), RotationOutcome::ReuseDetected);
        assert_eq!(s.state, SessionState::Revoked);
    }

    #[test]
    fn terminal_states_are_final() {
        let now = Utc::now();
        let (mut s, first) = session(now);
        assert!(s.revoke(now));
        assert!(!s.revoke(now));
        assert!(!s.expire(now));
        assert_eq!(s.state, SessionState::Revoked);
        assert_eq!(
            s.rotate(first, TokenId::new(), now),
            RotationOutcome::NotLive(SessionState::Revoked)
        );

        let (mut e, _) = session(now);
        assert!(e.expire(now));
        assert!(!e.revoke(now));
        assert_eq!(e.state, SessionState::Expired);
    }

    #[test]
    fn outlived_after_absolute_lifetime() {
        let now = Utc::now();
        let (s, _) = session(now);
        assert!(!s.has_outlived(now + Duration::days(29)));
        assert!(s.has_outlived(now + Duration::days(30)));
    }

    #[test]
    fn state_names_round_trip() {
        for state in [
            SessionState::Active,
            SessionState::Rotated,
            SessionState::Revoked,
            SessionState::Expired,
        ] {
            assert_eq!(SessionState::parse(state.as_str()), Some(state));
        }
    }
}
