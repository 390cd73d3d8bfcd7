//! User snapshot as seen by the authorization engine, plus the collaborator
//! traits that load it.
//!
//! Users are created and mutated by administrative flows outside this crate;
//! the engine only ever reads a consistent snapshot per call.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use tenantgate_core::{BranchId, DomainError, OrgId, UserId};

use crate::error::StoreError;
use crate::{Permission, Role};

/// User account status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    /// User is active and can authenticate.
    #[default]
    Active,
    /// User is suspended; existing sessions cannot be refreshed.
    Suspended,
}

impl core::fmt::Display for UserStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            UserStatus::Active => write!(f, "active"),
            UserStatus::Suspended => write!(f, "suspended"),
        }
    }
}

/// Per-user explicit adjustments layered on top of role-derived permissions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionOverrides {
    #[serde(default)]
    pub allow: Vec<Permission>,
    #[serde(default)]
    pub deny: Vec<Permission>,
}

impl PermissionOverrides {
    pub fn is_empty(&self) -> bool {
        self.allow.is_empty() && self.deny.is_empty()
    }
}

/// Authorization-relevant projection of a user record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub display_name: String,
    pub roles: Vec<Role>,
    #[serde(default)]
    pub global_scope: bool,
    #[serde(default)]
    pub org_scopes: Vec<OrgId>,
    #[serde(default)]
    pub branch_scopes: Vec<BranchId>,
    #[serde(default)]
    pub permission_overrides: PermissionOverrides,
    #[serde(default)]
    pub status: UserStatus,
}

impl User {
    /// Create an active, unscoped user with no roles.
    pub fn new(id: UserId, email: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into().trim().to_lowercase(),
            display_name: display_name.into(),
            roles: Vec::new(),
            global_scope: false,
            org_scopes: Vec::new(),
            branch_scopes: Vec::new(),
            permission_overrides: PermissionOverrides::default(),
            status: UserStatus::Active,
        }
    }

    pub fn with_roles(mut self, roles: impl IntoIterator<Item = Role>) -> Self {
        self.roles = roles.into_iter().collect();
        self
    }

    pub fn with_global_scope(mut self) -> Self {
        self.global_scope = true;
        self
    }

    pub fn with_org_scopes(mut self, orgs: impl IntoIterator<Item = OrgId>) -> Self {
        self.org_scopes = orgs.into_iter().collect();
        self
    }

    pub fn with_branch_scopes(mut self, branches: impl IntoIterator<Item = BranchId>) -> Self {
        self.branch_scopes = branches.into_iter().collect();
        self
    }

    pub fn with_overrides(mut self, overrides: PermissionOverrides) -> Self {
        self.permission_overrides = overrides;
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }

    /// Write-time validation, run by stores before persisting a record.
    ///
    /// A scoped (non-global) user must have at least one organization.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.email.trim().is_empty() || !self.email.contains('@') {
            return Err(DomainError::validation("invalid email format"));
        }
        if self.roles.is_empty() {
            return Err(DomainError::validation("user must hold at least one role"));
        }
        if !self.global_scope && self.org_scopes.is_empty() {
            return Err(DomainError::invariant(
                "scoped user must have at least one organization",
            ));
        }
        Ok(())
    }
}

/// Authoritative source of user records.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
}

#[async_trait]
impl<S> UserStore for Arc<S>
where
    S: UserStore + ?Sized,
{
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        (**self).find_by_id(id).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        (**self).find_by_email(email).await
    }
}

/// Verifies a login secret for a user. The hashing scheme is the implementor's.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify(&self, user_id: UserId, secret: &str) -> Result<bool, StoreError>;
}

#[async_trait]
impl<S> CredentialVerifier for Arc<S>
where
    S: CredentialVerifier + ?Sized,
{
    async fn verify(&self, user_id: UserId, secret: &str) -> Result<bool, StoreError> {
        (**self).verify(user_id, secret).await
    }
}
