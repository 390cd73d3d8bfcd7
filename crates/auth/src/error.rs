//! Error kinds surfaced by the engine.
//!
//! Every variant is terminal for the current request; the engine never retries.
//! The HTTP layer maps [`AuthErrorKind`] to a status code.

use serde::Serialize;
use thiserror::Error;

use tenantgate_core::{BranchId, OrgId};

use crate::Permission;

/// Failure of a collaborator store (session/user/credential backend).
///
/// Never reinterpreted as an authentication or authorization outcome.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store rejected write: {0}")]
    Rejected(String),

    #[error("session already exists")]
    DuplicateSession,
}

/// Stable, machine-readable error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthErrorKind {
    AuthenticationError,
    TokenRevoked,
    TokenReuseDetected,
    AuthorizationError,
    ScopeViolation,
    ScopeTargetMissing,
    ServiceUnavailable,
}

impl AuthErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthErrorKind::AuthenticationError => "authentication_error",
            AuthErrorKind::TokenRevoked => "token_revoked",
            AuthErrorKind::TokenReuseDetected => "token_reuse_detected",
            AuthErrorKind::AuthorizationError => "authorization_error",
            AuthErrorKind::ScopeViolation => "scope_violation",
            AuthErrorKind::ScopeTargetMissing => "scope_target_missing",
            AuthErrorKind::ServiceUnavailable => "service_unavailable",
        }
    }
}

impl core::fmt::Display for AuthErrorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing credentials")]
    MissingCredentials,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("token has expired")]
    TokenExpired,

    #[error("invalid token: {0}")]
    TokenInvalid(String),

    #[error("session is no longer active")]
    TokenRevoked,

    #[error("refresh token was already used; session revoked")]
    TokenReuseDetected,

    #[error("forbidden: missing {}", display_permissions(.missing))]
    Forbidden { missing: Vec<Permission> },

    #[error("organization {org_id} is outside the granted scope")]
    OrgOutOfScope { org_id: OrgId },

    #[error("branch {branch_id} is outside the granted scope")]
    BranchOutOfScope { branch_id: BranchId },

    #[error("route requires a target {0} but the request named none")]
    ScopeTargetMissing(&'static str),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AuthError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::TokenInvalid(msg.into())
    }

    pub fn kind(&self) -> AuthErrorKind {
        match self {
            AuthError::MissingCredentials
            | AuthError::InvalidCredentials
            | AuthError::TokenExpired
            | AuthError::TokenInvalid(_) => AuthErrorKind::AuthenticationError,
            AuthError::TokenRevoked => AuthErrorKind::TokenRevoked,
            AuthError::TokenReuseDetected => AuthErrorKind::TokenReuseDetected,
            AuthError::Forbidden { .. } => AuthErrorKind::AuthorizationError,
            AuthError::OrgOutOfScope { .. } | AuthError::BranchOutOfScope { .. } => {
                AuthErrorKind::ScopeViolation
            }
            AuthError::ScopeTargetMissing(_) => AuthErrorKind::ScopeTargetMissing,
            AuthError::Store(_) => AuthErrorKind::ServiceUnavailable,
        }
    }

    pub fn code(&self) -> &'static str {
        self.kind().as_str()
    }
}

fn display_permissions(perms: &[Permission]) -> String {
    perms
        .iter()
        .map(|p| format!("'{p}'"))
        .collect::<Vec<_>>()
        .join(", ")
}
