//! Effective permission computation.
//!
//! The evaluation order is fixed: `(⋃ role permissions) ∪ allow − deny`.
//! Each step is its own function so the order stays auditable; deny is always
//! applied last and therefore always wins.

use std::sync::Arc;

use crate::permissions::{Permission, PermissionSet};
use crate::roles::{Role, RoleRegistry};
use crate::user::{PermissionOverrides, User};

#[derive(Debug, Clone)]
pub struct PermissionResolver {
    registry: Arc<RoleRegistry>,
}

impl PermissionResolver {
    pub fn new(registry: Arc<RoleRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &RoleRegistry {
        &self.registry
    }

    /// Effective permissions of `user` from its current record.
    pub fn resolve(&self, user: &User) -> PermissionSet {
        self.resolve_parts(&user.roles, &user.permission_overrides)
    }

    /// Effective permissions from roles and an overrides snapshot.
    pub fn resolve_parts(&self, roles: &[Role], overrides: &PermissionOverrides) -> PermissionSet {
        let granted = role_union(&self.registry, roles);
        let allowed = apply_allow(granted, &overrides.allow);
        apply_deny(allowed, &overrides.deny)
    }

    /// `required ⊆ effective`.
    pub fn has_all(effective: &PermissionSet, required: &[Permission]) -> bool {
        required.iter().all(|p| effective.contains(p))
    }

    /// `required ∩ effective ≠ ∅`.
    pub fn has_any(effective: &PermissionSet, required: &[Permission]) -> bool {
        required.iter().any(|p| effective.contains(p))
    }
}

/// Step 1: union of every role's permission set.
pub fn role_union(registry: &RoleRegistry, roles: &[Role]) -> PermissionSet {
    roles
        .iter()
        .flat_map(|r| registry.permission_set_of(*r).iter().copied())
        .collect()
}

/// Step 2: add explicit allows.
pub fn apply_allow(mut set: PermissionSet, allow: &[Permission]) -> PermissionSet {
    set.extend(allow.iter().copied());
    set
}

/// Step 3: remove explicit denies. Must run last.
pub fn apply_deny(mut set: PermissionSet, deny: &[Permission]) -> PermissionSet {
    for p in deny {
        set.remove(p);
    }
    set
}
