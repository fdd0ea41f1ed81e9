//! Garden, system and instance domain models

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Upstream sends `null` for empty collections; read it as the default
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// How a garden is connected to the local one
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConnectionType {
    Local,
    Http,
    Stomp,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Garden status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GardenStatus {
    Initializing,
    Running,
    Stopped,
    Blocked,
    MissingConfiguration,
    NotConfigured,
    Error,
    Unreachable,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Publishing or receiving connection of a garden
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    #[serde(default)]
    pub api: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub config: Map<String, Value>,
}

/// Garden: a named deployment domain hosting systems.
///
/// Gardens form a tree through `parent`; `children` carries whatever nesting
/// the upstream payload delivered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Garden {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub connection_type: ConnectionType,
    #[serde(default)]
    pub status: GardenStatus,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub has_parent: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub children: Vec<Garden>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub systems: Vec<System>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub publishing_connections: Vec<Connection>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub receiving_connections: Vec<Connection>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: Map<String, Value>,
}

impl Garden {
    pub fn new(name: impl Into<String>, connection_type: ConnectionType) -> Self {
        Self {
            id: None,
            name: name.into(),
            connection_type,
            status: GardenStatus::Running,
            parent: None,
            has_parent: false,
            children: Vec::new(),
            systems: Vec::new(),
            publishing_connections: Vec::new(),
            receiving_connections: Vec::new(),
            metadata: Map::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self.has_parent = true;
        self
    }

    pub fn with_child(mut self, child: Garden) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_system(mut self, system: System) -> Self {
        self.systems.push(system);
        self
    }

    pub fn is_local(&self) -> bool {
        self.connection_type == ConnectionType::Local
    }

    /// Same garden: by id when both carry one, otherwise by name
    pub fn same_identity(&self, other: &Garden) -> bool {
        match (&self.id, &other.id) {
            (Some(a), Some(b)) => a == b,
            _ => self.name == other.name,
        }
    }
}

/// Plugin system registered in a garden
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct System {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub namespace: String,
    pub name: String,
    pub version: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub instances: Vec<Instance>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub commands: Vec<Command>,
}

impl System {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            namespace: namespace.into(),
            name: name.into(),
            version: version.into(),
            instances: Vec::new(),
            commands: Vec::new(),
        }
    }

    pub fn with_instance(mut self, name: impl Into<String>) -> Self {
        self.instances.push(Instance::new(name));
        self
    }

    pub fn with_command(mut self, name: impl Into<String>) -> Self {
        self.commands.push(Command {
            name: name.into(),
            description: None,
        });
        self
    }

    /// Same system: by id when both carry one, otherwise namespace/name/version
    pub fn same_identity(&self, other: &System) -> bool {
        match (&self.id, &other.id) {
            (Some(a), Some(b)) => a == b,
            _ => {
                self.namespace == other.namespace
                    && self.name == other.name
                    && self.version == other.version
            }
        }
    }
}

/// Running instance of a system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub status: String,
}

impl Instance {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            status: "RUNNING".to_string(),
        }
    }

    pub fn same_identity(&self, other: &Instance) -> bool {
        match (&self.id, &other.id) {
            (Some(a), Some(b)) => a == b,
            _ => self.name == other.name,
        }
    }
}

/// Command exposed by a system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}
