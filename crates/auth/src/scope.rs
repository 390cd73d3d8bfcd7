//! Organization/branch scope checks.
//!
//! Scope never widens implicitly: a scoped route that names no target is a
//! caller error, not "no restriction".

use serde::{Deserialize, Serialize};

use tenantgate_core::{BranchId, OrgId};

use crate::error::AuthError;
use crate::principal::AuthUser;
use crate::user::User;

/// Scope requirement declared on a route.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeRequirement {
    Org,
    Branch,
}

/// Organization/branch a request targets, as extracted by the transport.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct ScopeTarget {
    pub org_id: Option<OrgId>,
    pub branch_id: Option<BranchId>,
}

impl ScopeTarget {
    pub fn org(org_id: OrgId) -> Self {
        Self {
            org_id: Some(org_id),
            branch_id: None,
        }
    }

    pub fn branch(org_id: OrgId, branch_id: BranchId) -> Self {
        Self {
            org_id: Some(org_id),
            branch_id: Some(branch_id),
        }
    }
}

/// Borrowed view of what a principal is scoped to.
#[derive(Debug, Copy, Clone)]
pub struct ScopeGrant<'a> {
    pub global: bool,
    pub orgs: &'a [OrgId],
    pub branches: &'a [BranchId],
}

impl User {
    pub fn scope_grant(&self) -> ScopeGrant<'_> {
        ScopeGrant {
            global: self.global_scope,
            orgs: &self.org_scopes,
            branches: &self.branch_scopes,
        }
    }
}

pub struct ScopeGuard;

impl ScopeGuard {
    /// Check an authenticated user against a requested org and optional branch.
    pub fn check(
        user: &AuthUser,
        requested_org: OrgId,
        requested_branch: Option<BranchId>,
    ) -> Result<(), AuthError> {
        Self::check_grant(user.scope_grant(), requested_org, requested_branch)
    }

    pub fn check_grant(
        grant: ScopeGrant<'_>,
        requested_org: OrgId,
        requested_branch: Option<BranchId>,
    ) -> Result<(), AuthError> {
        if grant.global {
            return Ok(());
        }
        if !grant.orgs.contains(&requested_org) {
            return Err(AuthError::OrgOutOfScope {
                org_id: requested_org,
            });
        }
        if let Some(branch_id) = requested_branch {
            if !grant.branches.contains(&branch_id) {
                return Err(AuthError::BranchOutOfScope { branch_id });
            }
        }
        Ok(())
    }

    /// Enforce a route's declared requirement against the request target.
    pub fn enforce(
        user: &AuthUser,
        requirement: ScopeRequirement,
        target: &ScopeTarget,
    ) -> Result<(), AuthError> {
        let org_id = target.org_id.ok_or(AuthError::ScopeTargetMissing("organization"))?;
        let branch_id = match requirement {
            ScopeRequirement::Org => target.branch_id,
            ScopeRequirement::Branch => {
                Some(target.branch_id.ok_or(AuthError::ScopeTargetMissing("branch"))?)
            }
        };
        Self::check(user, org_id, branch_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn grant<'a>(global: bool, orgs: &'a [OrgId], branches: &'a [BranchId]) -> ScopeGrant<'a> {
        ScopeGrant {
            global,
            orgs,
            branches,
        }
    }

    #[test]
    fn org_outside_scope_is_a_violation() {
        let org_a = OrgId::new();
        let org_b = OrgId::new();
        let err = ScopeGuard::check_grant(grant(false, &[org_a], &[]), org_b, None).unwrap_err();
        assert_eq!(err, AuthError::OrgOutOfScope { org_id: org_b });
        assert_eq!(err.code(), "scope_violation");
    }

    #[test]
    fn branch_must_also_be_granted() {
        let org = OrgId::new();
        let branch = BranchId::new();
        let other = BranchId::new();
        let orgs = [org];
        let branches = [branch];
        let g = grant(false, &orgs, &branches);

        assert!(ScopeGuard::check_grant(g, org, Some(branch)).is_ok());
        assert!(ScopeGuard::check_grant(g, org, None).is_ok());
        assert_eq!(
            ScopeGuard::check_grant(g, org, Some(other)).unwrap_err(),
            AuthError::BranchOutOfScope { branch_id: other }
        );
    }

    proptest! {
        /// Property: a global grant accepts any org/branch pair.
        #[test]
        fn global_scope_accepts_everything(org in any::<u128>(), branch in proptest::option::of(any::<u128>())) {
            let org = OrgId::from_uuid(uuid::Uuid::from_u128(org));
            let branch = branch.map(|b| BranchId::from_uuid(uuid::Uuid::from_u128(b)));
            prop_assert!(ScopeGuard::check_grant(grant(true, &[], &[]), org, branch).is_ok());
        }

        /// Property: a scoped grant rejects any org it does not list.
        #[test]
        fn scoped_grant_rejects_unlisted_orgs(granted in any::<u128>(), requested in any::<u128>()) {
            prop_assume!(granted != requested);
            let granted = [OrgId::from_uuid(uuid::Uuid::from_u128(granted))];
            let requested = OrgId::from_uuid(uuid::Uuid::from_u128(requested));
            let is_violation = matches!(
                ScopeGuard::check_grant(grant(false, &granted, &[]), requested, None),
                Err(AuthError::OrgOutOfScope { .. })
            );
            prop_assert!(is_violation);
        }
    }
}
