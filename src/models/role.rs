//! Role and permission domain models

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

use super::scope::ScopeDimension;

static ROLE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\w.\- ]+$").expect("role name pattern is valid"));

/// Permission level granted by a role.
///
/// Levels are ordered: a higher level implies every lower one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PermissionLevel {
    ReadOnly,
    Operator,
    PluginAdmin,
    GardenAdmin,
}

impl PermissionLevel {
    /// All levels, lowest first
    pub const ALL: [PermissionLevel; 4] = [
        PermissionLevel::ReadOnly,
        PermissionLevel::Operator,
        PermissionLevel::PluginAdmin,
        PermissionLevel::GardenAdmin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionLevel::ReadOnly => "READ_ONLY",
            PermissionLevel::Operator => "OPERATOR",
            PermissionLevel::PluginAdmin => "PLUGIN_ADMIN",
            PermissionLevel::GardenAdmin => "GARDEN_ADMIN",
        }
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognized permission level string
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown permission level: {0}")]
pub struct UnknownPermissionLevel(pub String);

impl FromStr for PermissionLevel {
    type Err = UnknownPermissionLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PermissionLevel::ALL
            .iter()
            .copied()
            .find(|level| level.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownPermissionLevel(s.to_string()))
    }
}

/// Role: a permission level plus per-dimension scope allow-lists.
///
/// An empty allow-list leaves that dimension unscoped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Role {
    #[validate(
        length(min = 1, max = 100, message = "Role name must be between 1 and 100 characters"),
        regex(path = *ROLE_NAME_RE, message = "Role name contains invalid characters")
    )]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 2000, message = "Description must not exceed 2000 characters"))]
    pub description: Option<String>,
    pub permission: PermissionLevel,
    #[serde(default)]
    pub scope_gardens: Vec<String>,
    #[serde(default)]
    pub scope_namespaces: Vec<String>,
    #[serde(default)]
    pub scope_systems: Vec<String>,
    #[serde(default)]
    pub scope_versions: Vec<String>,
    #[serde(default)]
    pub scope_instances: Vec<String>,
    #[serde(default)]
    pub scope_commands: Vec<String>,
    /// Nested roles (role of roles)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[validate(nested)]
    pub roles: Vec<Role>,
    /// Fine-grained permission strings carried alongside the level
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<String>,
}

impl Role {
    /// Unscoped role with the given level
    pub fn new(name: impl Into<String>, permission: PermissionLevel) -> Self {
        Self {
            name: name.into(),
            description: None,
            permission,
            scope_gardens: Vec::new(),
            scope_namespaces: Vec::new(),
            scope_systems: Vec::new(),
            scope_versions: Vec::new(),
            scope_instances: Vec::new(),
            scope_commands: Vec::new(),
            roles: Vec::new(),
            permissions: Vec::new(),
        }
    }

    /// Allow-list for one scope dimension
    pub fn allow_list(&self, dimension: ScopeDimension) -> &[String] {
        match dimension {
            ScopeDimension::Garden => &self.scope_gardens,
            ScopeDimension::Namespace => &self.scope_namespaces,
            ScopeDimension::System => &self.scope_systems,
            ScopeDimension::Version => &self.scope_versions,
            ScopeDimension::Instance => &self.scope_instances,
            ScopeDimension::Command => &self.scope_commands,
        }
    }

    pub fn allow_list_mut(&mut self, dimension: ScopeDimension) -> &mut Vec<String> {
        match dimension {
            ScopeDimension::Garden => &mut self.scope_gardens,
            ScopeDimension::Namespace => &mut self.scope_namespaces,
            ScopeDimension::System => &mut self.scope_systems,
            ScopeDimension::Version => &mut self.scope_versions,
            ScopeDimension::Instance => &mut self.scope_instances,
            ScopeDimension::Command => &mut self.scope_commands,
        }
    }

    /// Builder-style scope restriction
    pub fn scoped<I, S>(mut self, dimension: ScopeDimension, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allow_list_mut(dimension)
            .extend(values.into_iter().map(Into::into));
        self
    }

    /// True when no dimension is restricted
    pub fn is_unscoped(&self) -> bool {
        ScopeDimension::ALL
            .iter()
            .all(|dimension| self.allow_list(*dimension).is_empty())
    }
}
