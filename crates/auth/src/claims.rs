use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use tenantgate_core::{BranchId, OrgId, SessionId, TokenId, UserId};

use crate::{Permission, PermissionOverrides, Role};

/// Discriminates access from refresh tokens so one can never stand in for the other.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Signed payload of an access token.
///
/// `allow`/`deny` are an optional snapshot of the user's overrides at issuance.
/// When present, requests are authorized without a user-store lookup, so
/// override changes take effect at the latest when the token expires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenPayload {
    pub typ: TokenKind,
    #[serde(rename = "iss")]
    pub issuer: String,
    pub subject_id: String,
    pub user_id: UserId,
    pub org_id: OrgId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_id: Option<BranchId>,
    pub roles: Vec<Role>,
    pub global_scope: bool,
    #[serde(default)]
    pub org_scopes: Vec<OrgId>,
    #[serde(default)]
    pub branch_scopes: Vec<BranchId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow: Option<Vec<Permission>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deny: Option<Vec<Permission>>,
    pub session_id: SessionId,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl AccessTokenPayload {
    /// Overrides snapshot, if one was embedded at issuance.
    pub fn override_snapshot(&self) -> Option<PermissionOverrides> {
        if self.allow.is_none() && self.deny.is_none() {
            return None;
        }
        Some(PermissionOverrides {
            allow: self.allow.clone().unwrap_or_default(),
            deny: self.deny.clone().unwrap_or_default(),
        })
    }

    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
        if self.typ != TokenKind::Access {
            return Err(TokenValidationError::WrongKind);
        }
        validate_window(self.issued_at, self.expires_at, now)
    }
}

/// Signed payload of a refresh token. Carries no permission data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenPayload {
    pub typ: TokenKind,
    #[serde(rename = "iss")]
    pub issuer: String,
    pub subject_id: String,
    pub session_id: SessionId,
    /// Identity of this refresh token inside its session chain.
    #[serde(rename = "jti")]
    pub token_id: TokenId,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl RefreshTokenPayload {
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
        if self.typ != TokenKind::Refresh {
            return Err(TokenValidationError::WrongKind);
        }
        validate_window(self.issued_at, self.expires_at, now)
    }
}

/// Subject string carried in tokens for a user.
pub fn subject_for(user_id: UserId) -> String {
    format!("user:{user_id}")
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid token time window (expires_at <= issued_at)")]
    InvalidTimeWindow,

    #[error("token used for the wrong purpose")]
    WrongKind,
}

/// Tolerated issuer/validator clock disagreement for `issued_at`, in seconds.
pub const ISSUED_AT_LEEWAY_SECS: i64 = 30;

/// Deterministically validate a token's time window against `now`.
///
/// Signature verification happens before this, in [`crate::TokenCodec`].
pub fn validate_window(
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), TokenValidationError> {
    if expires_at <= issued_at {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    if now + Duration::seconds(ISSUED_AT_LEEWAY_SECS) < issued_at {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= expires_at {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}
