use std::sync::Arc;

use serde::Serialize;

use tenantgate_core::UserId;

use crate::error::AuthError;
use crate::principal::AuthUser;
use crate::requirement::{PermissionRequirement, RouteRequirement};
use crate::scope::{ScopeGuard, ScopeTarget};
use crate::token::TokenService;
use crate::user::User;
use crate::{Permission, PermissionResolver, Role};

/// Per-request authorization pipeline.
///
/// Stages short-circuit on the first failure:
/// 1. authenticate the access token
/// 2. resolve effective permissions (token snapshot, else fresh user record)
/// 3. evaluate the route's permission expression
/// 4. enforce the route's scope requirement
///
/// No stage mutates shared state; the session store is only read, and only
/// when `strict_session_check` is on.
#[derive(Clone)]
pub struct Authorizer {
    tokens: Arc<TokenService>,
    strict_session_check: bool,
}

impl Authorizer {
    pub fn new(tokens: Arc<TokenService>) -> Self {
        Self {
            tokens,
            strict_session_check: false,
        }
    }

    /// Also reject access tokens whose session is no longer live.
    pub fn with_strict_session_check(mut self, enabled: bool) -> Self {
        self.strict_session_check = enabled;
        self
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub async fn authorize(
        &self,
        token: Option<&str>,
        requirement: &RouteRequirement,
        target: &ScopeTarget,
    ) -> Result<AuthUser, AuthError> {
        let user = self.authenticate(token).await?;
        self.permit(&user, requirement)?;

        if let Some(scope) = requirement.scope {
            ScopeGuard::enforce(&user, scope, target)?;
        }

        Ok(user)
    }

    /// Stages 1 and 2: a validated principal with resolved permissions.
    pub async fn authenticate(&self, token: Option<&str>) -> Result<AuthUser, AuthError> {
        let token = token.ok_or(AuthError::MissingCredentials)?;

        let mut user = if self.strict_session_check {
            self.tokens.validate_access_token_live(token).await?
        } else {
            self.tokens.validate_access_token(token)?
        };

        if !user.is_resolved() {
            let record = self.tokens.load_user(&user).await?;
            user.refresh_from(&record, self.tokens.resolver());
        }

        Ok(user)
    }

    /// Stage 3: the route's permission expression, if any.
    pub fn permit(&self, user: &AuthUser, requirement: &RouteRequirement) -> Result<(), AuthError> {
        match &requirement.permission {
            Some(permission) => check_permission(user, permission),
            None => Ok(()),
        }
    }
}

/// Evaluate a permission expression against an authenticated user.
///
/// - No IO
/// - No panics
pub fn check_permission(user: &AuthUser, required: &PermissionRequirement) -> Result<(), AuthError> {
    if required.is_satisfied_by(&user.permissions) {
        return Ok(());
    }
    let missing = required.missing(&user.permissions);
    tracing::debug!(
        user_id = %user.user_id,
        missing = ?missing,
        "permission requirement not satisfied"
    );
    Err(AuthError::Forbidden { missing })
}

// ─────────────────────────────────────────────────────────────────────────────
// Authorization Explanation (Audit Trail)
// ─────────────────────────────────────────────────────────────────────────────

/// Detailed explanation of an authorization decision.
///
/// Answers "why was this request allowed/denied?" from the user's current
/// record, naming the source of every permission the requirement mentions.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationExplanation {
    pub requirement: PermissionRequirement,
    pub granted: bool,
    pub reason: String,
    pub principal: PrincipalState,
    pub traces: Vec<PermissionTrace>,
    pub denial_reason: Option<DenialReason>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrincipalState {
    pub user_id: UserId,
    pub roles: Vec<Role>,
    pub effective_permissions: Vec<Permission>,
}

/// How one permission fared through `roles ∪ allow − deny`.
#[derive(Debug, Clone, Serialize)]
pub struct PermissionTrace {
    pub permission: Permission,
    pub granted_by_roles: Vec<Role>,
    pub explicitly_allowed: bool,
    pub explicitly_denied: bool,
    pub effective: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DenialReason {
    pub kind: DenialKind,
    pub message: String,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialKind {
    /// Some required permission is removed by an explicit deny.
    DeniedByOverride,
    MissingPermission,
}

pub fn explain_authorization(
    user: &User,
    requirement: &PermissionRequirement,
    resolver: &PermissionResolver,
) -> AuthorizationExplanation {
    let effective = resolver.resolve(user);
    let overrides = &user.permission_overrides;

    let traces: Vec<PermissionTrace> = requirement
        .permissions()
        .iter()
        .map(|p| PermissionTrace {
            permission: *p,
            granted_by_roles: user
                .roles
                .iter()
                .copied()
                .filter(|r| resolver.registry().permission_set_of(*r).contains(p))
                .collect(),
            explicitly_allowed: overrides.allow.contains(p),
            explicitly_denied: overrides.deny.contains(p),
            effective: effective.contains(p),
        })
        .collect();

    let principal = PrincipalState {
        user_id: user.id,
        roles: user.roles.clone(),
        effective_permissions: effective.iter().copied().collect(),
    };

    if requirement.is_satisfied_by(&effective) {
        let reason = match traces.iter().find(|t| t.effective) {
            Some(t) if !t.granted_by_roles.is_empty() => format!(
                "'{}' granted by role(s) {}",
                t.permission,
                join(&t.granted_by_roles)
            ),
            Some(t) => format!("'{}' granted by explicit allow override", t.permission),
            None => "requirement names no permissions".to_string(),
        };
        return AuthorizationExplanation {
            requirement: requirement.clone(),
            granted: true,
            reason,
            principal,
            traces,
            denial_reason: None,
        };
    }

    let missing = requirement.missing(&effective);
    let denied: Vec<Permission> = traces
        .iter()
        .filter(|t| t.explicitly_denied && !t.effective)
        .map(|t| t.permission)
        .collect();

    let denial_reason = if denied.is_empty() {
        let mut suggestions = Vec::new();
        for p in &missing {
            let roles = resolver.registry().roles_granting(*p);
            if !roles.is_empty() {
                suggestions.push(format!("Assign one of {} to obtain '{}'", join(&roles), p));
            }
            suggestions.push(format!("Grant '{}' through an allow override", p));
        }
        DenialReason {
            kind: DenialKind::MissingPermission,
            message: format!("Missing required permission(s): {}", join(&missing)),
            suggestions,
        }
    } else {
        DenialReason {
            kind: DenialKind::DeniedByOverride,
            message: format!(
                "Permission(s) {} removed by explicit deny override (deny always wins)",
                join(&denied)
            ),
            suggestions: vec!["Remove the deny override for the user".to_string()],
        }
    };

    AuthorizationExplanation {
        requirement: requirement.clone(),
        granted: false,
        reason: denial_reason.message.clone(),
        principal,
        traces,
        denial_reason: Some(denial_reason),
    }
}

fn join<T: core::fmt::Display>(items: &[T]) -> String {
    items.iter().map(|i| i.to_string()).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PermissionOverrides, PermissionSet, RoleRegistry, ScopeRequirement};
    use crate::principal::PermissionSource;
    use chrono::Utc;
    use tenantgate_core::{BranchId, OrgId, SessionId};
    use Permission::*;

    fn resolver() -> PermissionResolver {
        PermissionResolver::new(Arc::new(RoleRegistry::standard().unwrap()))
    }

    fn auth_user(permissions: &[Permission], orgs: &[OrgId], branches: &[BranchId]) -> AuthUser {
        AuthUser {
            subject_id: "user:test".into(),
            user_id: UserId::new(),
            session_id: SessionId::new(),
            org_id: orgs.first().copied().unwrap_or_default(),
            branch_id: None,
            roles: vec![],
            global_scope: false,
            org_scopes: orgs.to_vec(),
            branch_scopes: branches.to_vec(),
            permissions: permissions.iter().copied().collect::<PermissionSet>(),
            permission_source: PermissionSource::TokenSnapshot,
            expires_at: Utc::now(),
        }
    }

    #[test]
    fn any_of_admits_with_a_single_alternative() {
        let user = auth_user(&[ReportBranch], &[], &[]);
        assert!(check_permission(&user, &PermissionRequirement::any_of([BillRead, ReportBranch])).is_ok());
    }

    #[test]
    fn single_permission_denied_lists_it() {
        let user = auth_user(&[BillRead], &[], &[]);
        assert_eq!(
            check_permission(&user, &BillCreate.into()).unwrap_err(),
            AuthError::Forbidden {
                missing: vec![BillCreate]
            }
        );
    }

    #[test]
    fn scope_violation_even_when_permitted() {
        let org_a = OrgId::new();
        let org_b = OrgId::new();
        let user = auth_user(&[ReportOrg], &[org_a], &[]);

        assert!(check_permission(&user, &ReportOrg.into()).is_ok());
        let err = ScopeGuard::enforce(&user, ScopeRequirement::Org, &ScopeTarget::org(org_b)).unwrap_err();
        assert_eq!(err.code(), "scope_violation");
    }

    #[test]
    fn scoped_route_without_target_is_caller_error() {
        let org = OrgId::new();
        let user = auth_user(&[], &[org], &[]);

        let err = ScopeGuard::enforce(&user, ScopeRequirement::Org, &ScopeTarget::default()).unwrap_err();
        assert_eq!(err, AuthError::ScopeTargetMissing("organization"));

        let err = ScopeGuard::enforce(&user, ScopeRequirement::Branch, &ScopeTarget::org(org)).unwrap_err();
        assert_eq!(err, AuthError::ScopeTargetMissing("branch"));
    }

    #[test]
    fn global_user_passes_any_branch_requirement() {
        let mut user = auth_user(&[], &[], &[]);
        user.global_scope = true;
        let target = ScopeTarget::branch(OrgId::new(), BranchId::new());
        assert!(ScopeGuard::enforce(&user, ScopeRequirement::Branch, &target).is_ok());
    }

    fn record(roles: &[Role], overrides: PermissionOverrides) -> User {
        User::new(UserId::new(), "dana@example.com", "Dana")
            .with_roles(roles.iter().copied())
            .with_org_scopes([OrgId::new()])
            .with_overrides(overrides)
    }

    #[test]
    fn explanation_blames_deny_override() {
        let user = record(
            &[Role::BranchManager],
            PermissionOverrides {
                allow: vec![],
                deny: vec![BillCreate],
            },
        );
        let explanation = explain_authorization(&user, &BillCreate.into(), &resolver());

        assert!(!explanation.granted);
        let denial = explanation.denial_reason.unwrap();
        assert_eq!(denial.kind, DenialKind::DeniedByOverride);
        assert_eq!(explanation.traces[0].granted_by_roles, vec![Role::BranchManager]);
        assert!(explanation.traces[0].explicitly_denied);
    }

    #[test]
    fn explanation_suggests_granting_roles() {
        let user = record(&[Role::Cashier], PermissionOverrides::default());
        let explanation = explain_authorization(&user, &ReportPlatform.into(), &resolver());

        let denial = explanation.denial_reason.unwrap();
        assert_eq!(denial.kind, DenialKind::MissingPermission);
        assert!(denial.suggestions.iter().any(|s| s.contains("SUPER_ADMIN")));
    }

    #[test]
    fn explanation_names_allow_override_as_source() {
        let user = record(
            &[Role::Cashier],
            PermissionOverrides {
                allow: vec![ReportBranch],
                deny: vec![],
            },
        );
        let explanation = explain_authorization(&user, &ReportBranch.into(), &resolver());
        assert!(explanation.granted);
        assert!(explanation.reason.contains("allow override"));
    }
}
