//! Role catalog and the process-wide role → permission table.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::permissions::{Permission, PermissionSet};

/// Role identifier used for RBAC.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    SuperAdmin,
    OrgAdmin,
    BranchManager,
    Cashier,
    Accountant,
    Auditor,
}

impl Role {
    pub const ALL: &'static [Role] = &[
        Role::SuperAdmin,
        Role::OrgAdmin,
        Role::BranchManager,
        Role::Cashier,
        Role::Accountant,
        Role::Auditor,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "SUPER_ADMIN",
            Role::OrgAdmin => "ORG_ADMIN",
            Role::BranchManager => "BRANCH_MANAGER",
            Role::Cashier => "CASHIER",
            Role::Accountant => "ACCOUNTANT",
            Role::Auditor => "AUDITOR",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Startup-time configuration failure. Never produced at request time.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("role table has no entry for {0}")]
    MissingRole(Role),

    #[error("role {0} declares no permissions")]
    EmptyRole(Role),

    #[error("role {0} is declared more than once")]
    DuplicateRole(Role),
}

#[derive(Debug, Clone)]
struct RoleEntry {
    ordered: Vec<Permission>,
    set: PermissionSet,
}

/// Frozen role → permission mapping.
///
/// Built once from a static table; read-only afterwards, so it can be shared
/// behind an `Arc` and read concurrently without locking.
#[derive(Debug, Clone)]
pub struct RoleRegistry {
    // Indexed by `Role::index()`; `from_table` guarantees one entry per role.
    entries: Vec<RoleEntry>,
}

impl RoleRegistry {
    /// Build the registry from the built-in role table.
    pub fn standard() -> Result<Self, RegistryError> {
        Self::from_table(STANDARD_ROLE_TABLE)
    }

    /// Build the registry from an arbitrary table.
    ///
    /// Every role in [`Role::ALL`] must appear exactly once with at least one
    /// permission. Duplicate permissions inside an entry keep their first
    /// position in the ordered view.
    pub fn from_table(table: &[(Role, &[Permission])]) -> Result<Self, RegistryError> {
        let mut slots: Vec<Option<RoleEntry>> = vec![None; Role::ALL.len()];

        for (role, perms) in table {
            let slot = &mut slots[role.index()];
            if slot.is_some() {
                return Err(RegistryError::DuplicateRole(*role));
            }
            if perms.is_empty() {
                return Err(RegistryError::EmptyRole(*role));
            }

            let mut ordered = Vec::with_capacity(perms.len());
            let mut set = PermissionSet::new();
            for p in perms.iter() {
                if set.insert(*p) {
                    ordered.push(*p);
                }
            }
            *slot = Some(RoleEntry { ordered, set });
        }

        let mut entries = Vec::with_capacity(slots.len());
        for (role, slot) in Role::ALL.iter().zip(slots) {
            entries.push(slot.ok_or(RegistryError::MissingRole(*role))?);
        }

        tracing::debug!(roles = entries.len(), "role registry built");
        Ok(Self { entries })
    }

    /// Permissions granted by `role`, in declaration order.
    pub fn permissions_of(&self, role: Role) -> &[Permission] {
        &self.entries[role.index()].ordered
    }

    /// Permissions granted by `role`, as a set.
    pub fn permission_set_of(&self, role: Role) -> &PermissionSet {
        &self.entries[role.index()].set
    }

    /// Roles whose table entry grants `permission`.
    pub fn roles_granting(&self, permission: Permission) -> Vec<Role> {
        Role::ALL
            .iter()
            .copied()
            .filter(|r| self.permission_set_of(*r).contains(&permission))
            .collect()
    }
}

use Permission::*;

const ORG_ADMIN_PERMISSIONS: &[Permission] = &[
    ProductRead,
    ProductCreate,
    ProductUpdate,
    ProductDelete,
    CategoryRead,
    CategoryCreate,
    CategoryUpdate,
    CategoryDelete,
    BillRead,
    BillCreate,
    BillVoid,
    BillRefund,
    ReportBranch,
    ReportOrg,
    UserRead,
    UserCreate,
    UserUpdate,
    UserDelete,
    RoleAssign,
    OrgRead,
    OrgUpdate,
    BranchRead,
    BranchCreate,
    BranchUpdate,
    SettingsRead,
    SettingsUpdate,
    NotificationRead,
    NotificationSend,
];

const BRANCH_MANAGER_PERMISSIONS: &[Permission] = &[
    BillRead,
    BillCreate,
    BillVoid,
    BillRefund,
    ReportBranch,
    ProductRead,
    CategoryRead,
    UserRead,
    BranchRead,
    NotificationRead,
];

const CASHIER_PERMISSIONS: &[Permission] = &[
    BillRead,
    BillCreate,
    ProductRead,
    CategoryRead,
    NotificationRead,
];

const ACCOUNTANT_PERMISSIONS: &[Permission] = &[
    BillRead,
    BillRefund,
    ReportBranch,
    ReportOrg,
    OrgRead,
    BranchRead,
];

const AUDITOR_PERMISSIONS: &[Permission] = &[
    BillRead,
    ProductRead,
    CategoryRead,
    ReportBranch,
    ReportOrg,
    UserRead,
    OrgRead,
    BranchRead,
    SettingsRead,
];

/// Built-in role table.
pub const STANDARD_ROLE_TABLE: &[(Role, &[Permission])] = &[
    (Role::SuperAdmin, Permission::ALL),
    (Role::OrgAdmin, ORG_ADMIN_PERMISSIONS),
    (Role::BranchManager, BRANCH_MANAGER_PERMISSIONS),
    (Role::Cashier, CASHIER_PERMISSIONS),
    (Role::Accountant, ACCOUNTANT_PERMISSIONS),
    (Role::Auditor, AUDITOR_PERMISSIONS),
];
