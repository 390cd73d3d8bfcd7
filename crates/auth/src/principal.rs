use chrono::{DateTime, Utc};
use serde::Serialize;

use tenantgate_core::{BranchId, OrgId, SessionId, UserId};

use crate::claims::AccessTokenPayload;
use crate::scope::ScopeGrant;
use crate::user::User;
use crate::{PermissionResolver, PermissionSet, Role};

/// Where an [`AuthUser`]'s effective permissions came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionSource {
    /// Resolved from the override snapshot embedded in the access token.
    TokenSnapshot,
    /// Resolved from a freshly loaded user record.
    UserRecord,
    /// Token carried no snapshot and no user has been loaded yet.
    Unresolved,
}

/// Authenticated principal attached to a request for downstream handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub subject_id: String,
    pub user_id: UserId,
    pub session_id: SessionId,
    /// Organization context the token was issued for.
    pub org_id: OrgId,
    pub branch_id: Option<BranchId>,
    pub roles: Vec<Role>,
    pub global_scope: bool,
    pub org_scopes: Vec<OrgId>,
    pub branch_scopes: Vec<BranchId>,
    pub permissions: PermissionSet,
    pub permission_source: PermissionSource,
    pub expires_at: DateTime<Utc>,
}

impl AuthUser {
    /// Build from a verified payload, resolving permissions when the token
    /// embeds an override snapshot.
    pub fn from_payload(payload: AccessTokenPayload, resolver: &PermissionResolver) -> Self {
        let (permissions, permission_source) = match payload.override_snapshot() {
            Some(overrides) => (
                resolver.resolve_parts(&payload.roles, &overrides),
                PermissionSource::TokenSnapshot,
            ),
            None => (PermissionSet::new(), PermissionSource::Unresolved),
        };

        Self {
            subject_id: payload.subject_id,
            user_id: payload.user_id,
            session_id: payload.session_id,
            org_id: payload.org_id,
            branch_id: payload.branch_id,
            roles: payload.roles,
            global_scope: payload.global_scope,
            org_scopes: payload.org_scopes,
            branch_scopes: payload.branch_scopes,
            permissions,
            permission_source,
            expires_at: payload.expires_at,
        }
    }

    /// Replace roles, scopes and permissions with the user's current record.
    pub fn refresh_from(&mut self, user: &User, resolver: &PermissionResolver) {
        self.roles = user.roles.clone();
        self.global_scope = user.global_scope;
        self.org_scopes = user.org_scopes.clone();
        self.branch_scopes = user.branch_scopes.clone();
        self.permissions = resolver.resolve(user);
        self.permission_source = PermissionSource::UserRecord;
    }

    pub fn is_resolved(&self) -> bool {
        self.permission_source != PermissionSource::Unresolved
    }

    pub fn scope_grant(&self) -> ScopeGrant<'_> {
        ScopeGrant {
            global: self.global_scope,
            orgs: &self.org_scopes,
            branches: &self.branch_scopes,
        }
    }
}
