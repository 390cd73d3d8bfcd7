//! Access/refresh token issuance, validation and refresh rotation.
//!
//! Access tokens are validated from their signature and time window alone;
//! when they embed an override snapshot, the principal's permissions may lag
//! the user record by at most `access_ttl`. Refresh rotation always consults
//! the session store and the current user record.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use thiserror::Error;

use tenantgate_core::{BranchId, Clock, OrgId, SessionId, TokenId};

use crate::claims::{
    AccessTokenPayload, RefreshTokenPayload, TokenKind, TokenValidationError, subject_for,
};
use crate::codec::{TokenCodec, TokenCodecError};
use crate::error::AuthError;
use crate::principal::AuthUser;
use crate::scope::ScopeGuard;
use crate::session::{RotationOutcome, Session, SessionState, SessionStore};
use crate::user::{CredentialVerifier, User, UserStore};
use crate::PermissionResolver;

/// Upper bound on access-token lifetime, which is also the staleness bound of
/// embedded override snapshots.
pub const MAX_ACCESS_TTL_MINUTES: i64 = 60;

/// Upper bound on a session's absolute lifetime, and so on refresh lifetime.
pub const MAX_SESSION_TTL_DAYS: i64 = 365;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenConfigError {
    #[error("access token ttl must be between 1 second and {} minutes", MAX_ACCESS_TTL_MINUTES)]
    AccessTtlOutOfBounds,

    #[error("refresh token ttl must exceed access token ttl")]
    RefreshTtlTooShort,

    #[error("session ttl must be at least the refresh token ttl")]
    SessionTtlTooShort,

    #[error("session ttl must not exceed {} days", MAX_SESSION_TTL_DAYS)]
    SessionTtlTooLong,

    #[error("issuer must not be empty")]
    EmptyIssuer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenConfig {
    pub issuer: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    /// Absolute lifetime of a session across all rotations.
    pub session_ttl: Duration,
    /// Embed the user's overrides in access tokens (skips a user-store read per request).
    pub embed_override_snapshot: bool,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            issuer: "tenantgate".to_string(),
            access_ttl: Duration::minutes(15),
            refresh_ttl: Duration::days(7),
            session_ttl: Duration::days(30),
            embed_override_snapshot: true,
        }
    }
}

impl TokenConfig {
    pub fn validate(&self) -> Result<(), TokenConfigError> {
        if self.issuer.trim().is_empty() {
            return Err(TokenConfigError::EmptyIssuer);
        }
        if self.access_ttl < Duration::seconds(1)
            || self.access_ttl > Duration::minutes(MAX_ACCESS_TTL_MINUTES)
        {
            return Err(TokenConfigError::AccessTtlOutOfBounds);
        }
        if self.refresh_ttl <= self.access_ttl {
            return Err(TokenConfigError::RefreshTtlTooShort);
        }
        if self.session_ttl < self.refresh_ttl {
            return Err(TokenConfigError::SessionTtlTooShort);
        }
        if self.session_ttl > Duration::days(MAX_SESSION_TTL_DAYS) {
            return Err(TokenConfigError::SessionTtlTooLong);
        }
        Ok(())
    }
}

/// A signed token and the instant it stops being accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub session_id: SessionId,
    pub access: IssuedToken,
    pub refresh: IssuedToken,
}

pub struct TokenService {
    codec: TokenCodec,
    config: TokenConfig,
    resolver: PermissionResolver,
    sessions: Arc<dyn SessionStore>,
    users: Arc<dyn UserStore>,
    clock: Arc<dyn Clock>,
}

impl TokenService {
    pub fn new(
        codec: TokenCodec,
        config: TokenConfig,
        resolver: PermissionResolver,
        sessions: Arc<dyn SessionStore>,
        users: Arc<dyn UserStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, TokenConfigError> {
        config.validate()?;
        Ok(Self {
            codec,
            config,
            resolver,
            sessions,
            users,
            clock,
        })
    }

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    pub fn resolver(&self) -> &PermissionResolver {
        &self.resolver
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Issuance
    // ─────────────────────────────────────────────────────────────────────────

    /// Sign an access token for `user` acting in `org`/`branch`.
    ///
    /// The context must lie within the user's scope.
    pub fn issue_access_token(
        &self,
        user: &User,
        org_id: OrgId,
        branch_id: Option<BranchId>,
        session_id: SessionId,
    ) -> Result<IssuedToken, AuthError> {
        ScopeGuard::check_grant(user.scope_grant(), org_id, branch_id)?;

        let now = self.clock.now();
        let expires_at = now + self.config.access_ttl;
        let (allow, deny) = if self.config.embed_override_snapshot {
            (
                Some(user.permission_overrides.allow.clone()),
                Some(user.permission_overrides.deny.clone()),
            )
        } else {
            (None, None)
        };

        let payload = AccessTokenPayload {
            typ: TokenKind::Access,
            issuer: self.config.issuer.clone(),
            subject_id: subject_for(user.id),
            user_id: user.id,
            org_id,
            branch_id,
            roles: user.roles.clone(),
            global_scope: user.global_scope,
            org_scopes: user.org_scopes.clone(),
            branch_scopes: user.branch_scopes.clone(),
            allow,
            deny,
            session_id,
            issued_at: now,
            expires_at,
        };

        let token = self.codec.encode(&payload).map_err(codec_error)?;
        Ok(IssuedToken { token, expires_at })
    }

    /// Sign the refresh token currently installed in `session`.
    ///
    /// Never outlives the session's absolute lifetime.
    pub fn issue_refresh_token(&self, user: &User, session: &Session) -> Result<IssuedToken, AuthError> {
        let now = self.clock.now();
        let expires_at = (now + self.config.refresh_ttl).min(session.expires_at);

        let payload = RefreshTokenPayload {
            typ: TokenKind::Refresh,
            issuer: self.config.issuer.clone(),
            subject_id: subject_for(user.id),
            session_id: session.session_id,
            token_id: session.current_token_id,
            issued_at: now,
            expires_at,
        };

        let token = self.codec.encode(&payload).map_err(codec_error)?;
        Ok(IssuedToken { token, expires_at })
    }

    fn issue_pair(&self, user: &User, session: &Session) -> Result<TokenPair, AuthError> {
        Ok(TokenPair {
            session_id: session.session_id,
            access: self.issue_access_token(user, session.org_id, session.branch_id, session.session_id)?,
            refresh: self.issue_refresh_token(user, session)?,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Session lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Verify credentials and start a session.
    ///
    /// Unknown email and wrong secret are indistinguishable to the caller.
    pub async fn authenticate(
        &self,
        verifier: &dyn CredentialVerifier,
        email: &str,
        secret: &str,
        org_id: OrgId,
        branch_id: Option<BranchId>,
    ) -> Result<TokenPair, AuthError> {
        let email = email.trim().to_lowercase();
        let user = self
            .users
            .find_by_email(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !verifier.verify(user.id, secret).await? {
            tracing::debug!(user_id = %user.id, "credential check failed");
            return Err(AuthError::InvalidCredentials);
        }

        self.login(&user, org_id, branch_id).await
    }

    /// Start an `ACTIVE` session for an already authenticated user.
    pub async fn login(
        &self,
        user: &User,
        org_id: OrgId,
        branch_id: Option<BranchId>,
    ) -> Result<TokenPair, AuthError> {
        if !user.is_active() {
            return Err(AuthError::InvalidCredentials);
        }
        ScopeGuard::check_grant(user.scope_grant(), org_id, branch_id)?;

        let now = self.clock.now();
        let session = Session::start(
            user.id,
            org_id,
            branch_id,
            TokenId::new(),
            now,
            self.config.session_ttl,
        );
        let pair = self.issue_pair(user, &session)?;
        self.sessions.create(session).await?;

        tracing::info!(user_id = %user.id, session_id = %pair.session_id, org_id = %org_id, "session started");
        Ok(pair)
    }

    /// Exchange a refresh token for a new pair, consuming it.
    ///
    /// Permissions in the new access token are resolved from the current user
    /// record. Presenting an already consumed token revokes the whole session.
    pub async fn rotate_refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let now = self.clock.now();
        let payload = self.decode_refresh(refresh_token)?;
        payload.validate(now).map_err(validation_error)?;

        let session = self
            .sessions
            .get_by_session_id(payload.session_id)
            .await?
            .ok_or(AuthError::TokenRevoked)?;

        if payload.subject_id != subject_for(session.user_id) {
            return Err(AuthError::invalid("subject does not match session"));
        }

        match session.state {
            SessionState::Revoked => return Err(AuthError::TokenRevoked),
            SessionState::Expired => return Err(AuthError::TokenExpired),
            SessionState::Active | SessionState::Rotated => {}
        }

        if session.has_outlived(now) {
            self.sessions.mark_expired(session.session_id, now).await?;
            tracing::info!(session_id = %session.session_id, "session expired");
            return Err(AuthError::TokenExpired);
        }

        // A store failure from here until `mark_rotated` leaves the token current.
        let user = match self.users.find_by_id(session.user_id).await? {
            Some(user) if user.is_active() => user,
            _ => {
                self.sessions.mark_revoked(session.session_id, now).await?;
                tracing::info!(session_id = %session.session_id, "session revoked: user missing or suspended");
                return Err(AuthError::TokenRevoked);
            }
        };

        if let Err(e) = ScopeGuard::check_grant(user.scope_grant(), session.org_id, session.branch_id) {
            self.sessions.mark_revoked(session.session_id, now).await?;
            tracing::info!(session_id = %session.session_id, "session revoked: context left user scope");
            return Err(e);
        }

        let rotated = match self
            .sessions
            .mark_rotated(session.session_id, payload.token_id, TokenId::new(), now)
            .await?
        {
            RotationOutcome::Rotated(s) => s,
            RotationOutcome::ReuseDetected => {
                tracing::warn!(
                    session_id = %session.session_id,
                    user_id = %session.user_id,
                    "refresh token reuse detected; session revoked"
                );
                return Err(AuthError::TokenReuseDetected);
            }
            RotationOutcome::NotLive(SessionState::Expired) => return Err(AuthError::TokenExpired),
            RotationOutcome::NotLive(_) | RotationOutcome::NotFound => {
                return Err(AuthError::TokenRevoked);
            }
        };

        let pair = self.issue_pair(&user, &rotated)?;
        tracing::info!(
            session_id = %rotated.session_id,
            rotation = rotated.rotation_count,
            "refresh token rotated"
        );
        Ok(pair)
    }

    /// Revoke the session a refresh token belongs to.
    ///
    /// An expired but correctly signed token still identifies its session.
    pub async fn logout(&self, refresh_token: &str) -> Result<(), AuthError> {
        let payload = self.decode_refresh(refresh_token)?;
        if payload.typ != TokenKind::Refresh {
            return Err(AuthError::invalid("not a refresh token"));
        }
        self.revoke_session(payload.session_id).await
    }

    /// Idempotent: revoking a terminal session is not an error.
    pub async fn revoke_session(&self, session_id: SessionId) -> Result<(), AuthError> {
        let now = self.clock.now();
        if self.sessions.mark_revoked(session_id, now).await? {
            tracing::info!(session_id = %session_id, "session revoked");
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Validation
    // ─────────────────────────────────────────────────────────────────────────

    /// Verify signature, purpose, issuer and expiry. Does not consult the store.
    pub fn validate_access_token(&self, token: &str) -> Result<AuthUser, AuthError> {
        let payload: AccessTokenPayload = self.codec.decode(token).map_err(codec_error)?;
        if payload.issuer != self.config.issuer {
            return Err(AuthError::invalid("unexpected issuer"));
        }
        payload.validate(self.clock.now()).map_err(validation_error)?;
        Ok(AuthUser::from_payload(payload, &self.resolver))
    }

    /// As [`Self::validate_access_token`], then require the session to be live.
    pub async fn validate_access_token_live(&self, token: &str) -> Result<AuthUser, AuthError> {
        let user = self.validate_access_token(token)?;
        if !self.sessions.is_active(user.session_id).await? {
            tracing::debug!(session_id = %user.session_id, "access token for inactive session");
            return Err(AuthError::TokenRevoked);
        }
        Ok(user)
    }

    /// Load the authoritative user record behind a token.
    ///
    /// A missing or suspended user invalidates the token.
    pub async fn load_user(&self, auth_user: &AuthUser) -> Result<User, AuthError> {
        match self.users.find_by_id(auth_user.user_id).await? {
            Some(user) if user.is_active() => Ok(user),
            _ => Err(AuthError::TokenRevoked),
        }
    }

    fn decode_refresh(&self, token: &str) -> Result<RefreshTokenPayload, AuthError> {
        let payload: RefreshTokenPayload = self.codec.decode(token).map_err(codec_error)?;
        if payload.issuer != self.config.issuer {
            return Err(AuthError::invalid("unexpected issuer"));
        }
        Ok(payload)
    }
}

fn codec_error(e: TokenCodecError) -> AuthError {
    tracing::debug!(error = %e, "token rejected");
    AuthError::TokenInvalid(e.to_string())
}

fn validation_error(e: TokenValidationError) -> AuthError {
    match e {
        TokenValidationError::Expired => AuthError::TokenExpired,
        other => AuthError::TokenInvalid(other.to_string()),
    }
}
