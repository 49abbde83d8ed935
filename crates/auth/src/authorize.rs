use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Permission, Role};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: role '{role}' lacks permission '{permission}'")]
    Forbidden { role: String, permission: String },
}

/// Command-side authorization contract (checked at the command boundary).
///
/// Implement this on commands that require a permission. The dispatcher's
/// authorization middleware enforces it before the handler runs.
pub trait CommandAuthorization {
    fn required_permission(&self) -> Permission;

    /// Role the command is being executed under.
    fn actor_role(&self) -> &Role;
}

/// Immutable role → permissions table.
///
/// Loaded once at process start (built in code or deserialized from
/// configuration) and shared by reference; never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RolePermissions {
    grants: HashMap<Role, HashSet<Permission>>,
}

impl RolePermissions {
    pub fn new(grants: HashMap<Role, HashSet<Permission>>) -> Self {
        Self { grants }
    }

    /// Cashiers confirm, supervisors also void, admins may do anything.
    pub fn standard() -> Self {
        Self::default()
            .grant(Role::CASHIER, [Permission::SALES_CONFIRM])
            .grant(
                Role::SUPERVISOR,
                [Permission::SALES_CONFIRM, Permission::SALES_VOID],
            )
            .grant(Role::ADMIN, [Permission::WILDCARD])
    }

    /// Builder-style grant, for assembling the table at startup.
    pub fn grant(mut self, role: Role, permissions: impl IntoIterator<Item = Permission>) -> Self {
        self.grants.entry(role).or_default().extend(permissions);
        self
    }

    /// Pure lookup; unknown roles have no permissions.
    pub fn has_permission(&self, role: &Role, permission: &Permission) -> bool {
        self.grants
            .get(role)
            .is_some_and(|perms| perms.contains(&Permission::WILDCARD) || perms.contains(permission))
    }

    pub fn authorize(&self, role: &Role, permission: &Permission) -> Result<(), AuthzError> {
        if self.has_permission(role, permission) {
            Ok(())
        } else {
            tracing::debug!(%role, %permission, "permission denied");
            Err(AuthzError::Forbidden {
                role: role.to_string(),
                permission: permission.to_string(),
            })
        }
    }

    /// Permissions granted to `role`, sorted (for audit output).
    pub fn permissions_of(&self, role: &Role) -> Vec<String> {
        let mut perms: Vec<String> = self
            .grants
            .get(role)
            .map(|set| set.iter().map(|p| p.to_string()).collect())
            .unwrap_or_default();
        perms.sort();
        perms
    }
}
