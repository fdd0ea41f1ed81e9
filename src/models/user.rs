//! User domain models

use serde::{Deserialize, Serialize};

use super::role::Role;
use crate::services::role_service::{self, RoleError};

/// Console user with locally and remotely assigned roles
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub username: String,
    #[serde(default)]
    pub local_roles: Vec<Role>,
    #[serde(default)]
    pub remote_roles: Vec<Role>,
    /// Flattened permission set (derived, see `refresh_permissions`)
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl User {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Self::default()
        }
    }

    pub fn with_local_role(mut self, role: Role) -> Self {
        self.local_roles.push(role);
        self
    }

    pub fn with_remote_role(mut self, role: Role) -> Self {
        self.remote_roles.push(role);
        self
    }

    /// Directly assigned roles, local first
    pub fn assigned_roles(&self) -> impl Iterator<Item = &Role> {
        self.local_roles.iter().chain(self.remote_roles.iter())
    }

    /// Recompute the cached permission set; must run after any role change
    pub fn refresh_permissions(&mut self) -> Result<(), RoleError> {
        let coalesced = role_service::coalesce_permissions(self.assigned_roles())?;
        self.permissions = coalesced.permissions.into_iter().collect();
        Ok(())
    }
}
