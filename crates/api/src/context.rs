use tenantgate_auth::{AuthUser, ScopeTarget};
use tenantgate_core::{BranchId, OrgId};

/// Request context attached by the authorization layer.
///
/// Present for every guarded route; immutable once attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    principal: AuthUser,
    target: ScopeTarget,
}

impl RequestContext {
    pub fn new(principal: AuthUser, target: ScopeTarget) -> Self {
        Self { principal, target }
    }

    pub fn principal(&self) -> &AuthUser {
        &self.principal
    }

    pub fn into_principal(self) -> AuthUser {
        self.principal
    }

    /// Organization the request addressed, if any.
    pub fn org_id(&self) -> Option<OrgId> {
        self.target.org_id
    }

    pub fn branch_id(&self) -> Option<BranchId> {
        self.target.branch_id
    }
}
