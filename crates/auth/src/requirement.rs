//! Declarative per-route requirements.
//!
//! Routes are declared as data, e.g.
//! `{"permission": {"anyOf": ["bill:read", "report:branch"]}, "scope": "branch"}`.

use serde::{Deserialize, Serialize};

use crate::scope::ScopeRequirement;
use crate::{Permission, PermissionResolver, PermissionSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PermissionRequirement {
    Single(Permission),
    AllOf {
        #[serde(rename = "allOf")]
        all_of: Vec<Permission>,
    },
    AnyOf {
        #[serde(rename = "anyOf")]
        any_of: Vec<Permission>,
    },
}

impl PermissionRequirement {
    pub fn all_of(perms: impl IntoIterator<Item = Permission>) -> Self {
        Self::AllOf {
            all_of: perms.into_iter().collect(),
        }
    }

    pub fn any_of(perms: impl IntoIterator<Item = Permission>) -> Self {
        Self::AnyOf {
            any_of: perms.into_iter().collect(),
        }
    }

    pub fn is_satisfied_by(&self, effective: &PermissionSet) -> bool {
        match self {
            Self::Single(p) => effective.contains(p),
            Self::AllOf { all_of } => PermissionResolver::has_all(effective, all_of),
            Self::AnyOf { any_of } => PermissionResolver::has_any(effective, any_of),
        }
    }

    /// Permissions named by the requirement.
    pub fn permissions(&self) -> &[Permission] {
        match self {
            Self::Single(p) => core::slice::from_ref(p),
            Self::AllOf { all_of } => all_of,
            Self::AnyOf { any_of } => any_of,
        }
    }

    /// What the principal lacks. For `anyOf` this is every alternative.
    pub fn missing(&self, effective: &PermissionSet) -> Vec<Permission> {
        if self.is_satisfied_by(effective) {
            return Vec::new();
        }
        self.permissions()
            .iter()
            .copied()
            .filter(|p| !effective.contains(p))
            .collect()
    }
}

impl From<Permission> for PermissionRequirement {
    fn from(value: Permission) -> Self {
        Self::Single(value)
    }
}

/// Requirement attached to one protected route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRequirement {
    /// `None` admits any authenticated principal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission: Option<PermissionRequirement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<ScopeRequirement>,
}

impl RouteRequirement {
    /// Authentication only.
    pub fn authenticated() -> Self {
        Self {
            permission: None,
            scope: None,
        }
    }

    pub fn permission(requirement: impl Into<PermissionRequirement>) -> Self {
        Self {
            permission: Some(requirement.into()),
            scope: None,
        }
    }

    pub fn in_org(mut self) -> Self {
        self.scope = Some(ScopeRequirement::Org);
        self
    }

    pub fn in_branch(mut self) -> Self {
        self.scope = Some(ScopeRequirement::Branch);
        self
    }
}
