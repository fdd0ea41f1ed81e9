//! Scope tuple used to restrict where a permission applies

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the six scope dimensions, outermost first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeDimension {
    Garden,
    Namespace,
    System,
    Version,
    Instance,
    Command,
}

impl ScopeDimension {
    pub const ALL: [ScopeDimension; 6] = [
        ScopeDimension::Garden,
        ScopeDimension::Namespace,
        ScopeDimension::System,
        ScopeDimension::Version,
        ScopeDimension::Instance,
        ScopeDimension::Command,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeDimension::Garden => "garden",
            ScopeDimension::Namespace => "namespace",
            ScopeDimension::System => "system",
            ScopeDimension::Version => "version",
            ScopeDimension::Instance => "instance",
            ScopeDimension::Command => "command",
        }
    }
}

impl fmt::Display for ScopeDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scope query; an unset field does not filter on that dimension
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub garden_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_name: Option<String>,
}

impl ScopeQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn garden(name: impl Into<String>) -> Self {
        Self::default().with(ScopeDimension::Garden, name)
    }

    pub fn get(&self, dimension: ScopeDimension) -> Option<&str> {
        self.slot(dimension).as_deref()
    }

    pub fn with(mut self, dimension: ScopeDimension, value: impl Into<String>) -> Self {
        *self.slot_mut(dimension) = Some(value.into());
        self
    }

    /// True when nothing below the garden level is specified
    pub fn is_garden_only(&self) -> bool {
        ScopeDimension::ALL[1..]
            .iter()
            .all(|dimension| self.get(*dimension).is_none())
    }

    fn slot(&self, dimension: ScopeDimension) -> &Option<String> {
        match dimension {
            ScopeDimension::Garden => &self.garden_name,
            ScopeDimension::Namespace => &self.namespace,
            ScopeDimension::System => &self.system_name,
            ScopeDimension::Version => &self.system_version,
            ScopeDimension::Instance => &self.instance_name,
            ScopeDimension::Command => &self.command_name,
        }
    }

    fn slot_mut(&mut self, dimension: ScopeDimension) -> &mut Option<String> {
        match dimension {
            ScopeDimension::Garden => &mut self.garden_name,
            ScopeDimension::Namespace => &mut self.namespace,
            ScopeDimension::System => &mut self.system_name,
            ScopeDimension::Version => &mut self.system_version,
            ScopeDimension::Instance => &mut self.instance_name,
            ScopeDimension::Command => &mut self.command_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_query_builder() {
        let query = ScopeQuery::garden("g1").with(ScopeDimension::Namespace, "ns1");
        assert_eq!(query.get(ScopeDimension::Garden), Some("g1"));
        assert_eq!(query.get(ScopeDimension::Namespace), Some("ns1"));
        assert_eq!(query.get(ScopeDimension::Command), None);
        assert!(!query.is_garden_only());
        assert!(ScopeQuery::garden("g1").is_garden_only());
    }

    #[test]
    fn test_scope_query_deserialize_partial() {
        let query: ScopeQuery = serde_json::from_str(r#"{"garden_name": "g1"}"#).unwrap();
        assert_eq!(query, ScopeQuery::garden("g1"));
    }
}
