//! Roles and the typed permission vocabulary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

macro_rules! permissions {
    ($($variant:ident => $key:literal),+ $(,)?) => {
        /// Every permission string a role may grant.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum Permission {
            $($variant),+
        }

        impl Permission {
            pub const ALL: &'static [Permission] = &[$(Permission::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Permission::$variant => $key),+
                }
            }
        }

        impl FromStr for Permission {
            type Err = UnknownPermission;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($key => Ok(Permission::$variant),)+
                    other => Err(UnknownPermission(other.to_string())),
                }
            }
        }
    };
}

permissions! {
    Wildcard => "*",
    AdminAccess => "admin.access",
    AdminSuper => "admin.super",
    AdminSearch => "admin.search",
    LeadsRead => "leads.read",
    LeadsWrite => "leads.write",
    AuditRead => "audit.read",
    AuditExport => "audit.export",
    UsersRead => "users.read",
    UsersWrite => "users.write",
    RolesRead => "roles.read",
    RolesWrite => "roles.write",
    AssignmentsRead => "assignments.read",
    AssignmentsWrite => "assignments.write",
    JitRequest => "jit.request",
    JitRead => "jit.read",
    JitApprove => "jit.approve",
    TenantsRead => "tenants.read",
    TenantsWrite => "tenants.write",
    InvoicesRead => "invoices.read",
    InvoicesWrite => "invoices.write",
    ProposalsRead => "proposals.read",
    ProposalsWrite => "proposals.write",
    ProposalsApprove => "proposals.approve",
    SettingsRead => "settings.read",
    SettingsWrite => "settings.write",
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Permission {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Permission {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown permission: {0}")]
pub struct UnknownPermission(pub String);

/// Effective permission set of a user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PermissionSet(BTreeSet<Permission>);

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a role's stored JSON permission list. Unknown strings and
    /// non-string entries are dropped with a warning.
    pub fn from_json(value: &serde_json::Value) -> Self {
        let mut set = Self::new();
        let Some(items) = value.as_array() else {
            if !value.is_null() {
                tracing::warn!(value = %value, "Role permissions are not a JSON array");
            }
            return set;
        };
        for item in items {
            match item.as_str().map(str::parse::<Permission>) {
                Some(Ok(p)) => {
                    set.0.insert(p);
                }
                Some(Err(e)) => tracing::warn!(error = %e, "Ignoring unknown permission"),
                None => tracing::warn!(value = %item, "Ignoring non-string permission entry"),
            }
        }
        set
    }

    pub fn insert(&mut self, permission: Permission) {
        self.0.insert(permission);
    }

    pub fn extend(&mut self, other: &PermissionSet) {
        self.0.extend(other.0.iter().copied());
    }

    pub fn is_wildcard(&self) -> bool {
        self.0.contains(&Permission::Wildcard)
    }

    pub fn has(&self, permission: Permission) -> bool {
        self.is_wildcard() || self.0.contains(&permission)
    }

    pub fn has_all(&self, required: &[Permission]) -> bool {
        self.is_wildcard() || required.iter().all(|p| self.0.contains(p))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Permission> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Array(
            self.0
                .iter()
                .map(|p| serde_json::Value::String(p.as_str().to_string()))
                .collect(),
        )
    }
}

impl FromIterator<Permission> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = Permission>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Role entity. `permissions` is the raw stored JSON list.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub permissions: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Role {
    pub fn new(name: String, description: Option<String>, permissions: &PermissionSet) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            description,
            permissions: permissions.to_json(),
            created_at: Utc::now(),
        }
    }

    pub fn permission_set(&self) -> PermissionSet {
        PermissionSet::from_json(&self.permissions)
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RoleResponse {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub permissions: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Role> for RoleResponse {
    fn from(r: Role) -> Self {
        let permissions = r
            .permission_set()
            .iter()
            .map(|p| p.as_str().to_string())
            .collect();
        Self {
            id: r.id,
            name: r.name,
            description: r.description,
            permissions,
            created_at: r.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_known_and_drops_unknown() {
        let set = PermissionSet::from_json(&json!(["users.read", "bogus.perm", 7, "audit.read"]));
        assert!(set.has(Permission::UsersRead));
        assert!(set.has(Permission::AuditRead));
        assert!(!set.has(Permission::UsersWrite));
        assert_eq!(set.iter().count(), 2);
    }

    #[test]
    fn wildcard_grants_everything() {
        let set = PermissionSet::from_json(&json!(["*"]));
        assert!(Permission::ALL.iter().all(|p| set.has(*p)));
        assert!(set.has_all(&[Permission::UsersWrite, Permission::JitApprove]));
    }

    #[test]
    fn has_all_requires_every_permission() {
        let set: PermissionSet = [Permission::LeadsRead].into_iter().collect();
        assert!(set.has_all(&[Permission::LeadsRead]));
        assert!(!set.has_all(&[Permission::LeadsRead, Permission::LeadsWrite]));
        assert!(set.has_all(&[]));
    }

    #[test]
    fn non_array_json_is_empty() {
        assert!(PermissionSet::from_json(&json!({"users.read": true})).is_empty());
        assert!(PermissionSet::from_json(&serde_json::Value::Null).is_empty());
    }

    #[test]
    fn every_permission_round_trips_through_its_key() {
        for p in Permission::ALL {
            assert_eq!(p.as_str().parse::<Permission>().unwrap(), *p);
        }
    }
}
