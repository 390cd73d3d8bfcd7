use std::collections::BTreeSet;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Effective permission set of a principal.
///
/// Ordered so explanations and `me` responses render deterministically.
pub type PermissionSet = BTreeSet<Permission>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown permission '{0}'")]
pub struct UnknownPermission(pub String);

macro_rules! permissions {
    ($($variant:ident => $name:literal),+ $(,)?) => {
        /// Grantable capability, rendered as `"resource:action"`.
        ///
        /// The catalog is closed: tokens or override lists naming anything else
        /// are rejected when parsed.
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Permission {
            $($variant),+
        }

        impl Permission {
            /// Every permission known to the system.
            pub const ALL: &'static [Permission] = &[$(Permission::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Permission::$variant => $name),+
                }
            }
        }

        impl core::str::FromStr for Permission {
            type Err = UnknownPermission;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok(Permission::$variant),)+
                    other => Err(UnknownPermission(other.to_string())),
                }
            }
        }
    };
}

permissions! {
    ProductRead => "product:read",
    ProductCreate => "product:create",
    ProductUpdate => "product:update",
    ProductDelete => "product:delete",
    CategoryRead => "category:read",
    CategoryCreate => "category:create",
    CategoryUpdate => "category:update",
    CategoryDelete => "category:delete",
    BillRead => "bill:read",
    BillCreate => "bill:create",
    BillVoid => "bill:void",
    BillRefund => "bill:refund",
    ReportBranch => "report:branch",
    ReportOrg => "report:org",
    ReportPlatform => "report:platform",
    UserRead => "user:read",
    UserCreate => "user:create",
    UserUpdate => "user:update",
    UserDelete => "user:delete",
    RoleAssign => "role:assign",
    OrgRead => "org:read",
    OrgCreate => "org:create",
    OrgUpdate => "org:update",
    BranchRead => "branch:read",
    BranchCreate => "branch:create",
    BranchUpdate => "branch:update",
    SettingsRead => "settings:read",
    SettingsUpdate => "settings:update",
    NotificationRead => "notification:read",
    NotificationSend => "notification:send",
}

impl Permission {
    /// Resource half of `"resource:action"`.
    pub fn resource(&self) -> &'static str {
        self.as_str().split_once(':').map(|(r, _)| r).unwrap_or_default()
    }

    /// Action half of `"resource:action"`.
    pub fn action(&self) -> &'static str {
        self.as_str().split_once(':').map(|(_, a)| a).unwrap_or_default()
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Permission {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Permission {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_permission_is_resource_action() {
        for p in Permission::ALL {
            let (resource, action) = p.as_str().split_once(':').expect("missing ':'");
            assert!(!resource.is_empty() && !action.is_empty(), "{p}");
            assert_eq!(p.resource(), resource);
            assert_eq!(p.action(), action);
        }
    }

    #[test]
    fn names_are_unique_and_parse_back() {
        let names: BTreeSet<&str> = Permission::ALL.iter().map(|p| p.as_str()).collect();
        assert_eq!(names.len(), Permission::ALL.len());

        for p in Permission::ALL {
            assert_eq!(p.as_str().parse::<Permission>().unwrap(), *p);
        }
    }

    #[test]
    fn unknown_permission_is_rejected() {
        let err = "bill:teleport".parse::<Permission>().unwrap_err();
        assert_eq!(err, UnknownPermission("bill:teleport".to_string()));

        let json: Result<Permission, _> = serde_json::from_str("\"*\"");
        assert!(json.is_err());
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_string(&vec![Permission::BillRead, Permission::ReportBranch]).unwrap();
        assert_eq!(json, r#"["bill:read","report:branch"]"#);
    }
}
