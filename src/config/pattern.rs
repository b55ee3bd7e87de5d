//! Pattern and component description types.
//!
//! A pattern file is the unit of a provisioning request: a named, identified
//! collection of component descriptions. Component configuration is kept as
//! loosely typed data and read through typed accessors.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::ConfigError;

/// A declarative pattern: the set of components to provision together.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(from = "PatternDocument")]
pub struct PatternFile {
    /// Human readable pattern name.
    pub name: String,
    /// Pattern identifier. Derived from the name when the file has none.
    pub id: Uuid,
    /// Optional pattern version.
    #[serde(default)]
    pub version: Option<String>,
    /// Component descriptions.
    #[serde(default)]
    pub components: Vec<ComponentDefinition>,
}

/// Pattern file as written, before the identifier is settled.
#[derive(Deserialize)]
struct PatternDocument {
    name: String,
    #[serde(default)]
    id: Option<Uuid>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    components: Vec<ComponentDefinition>,
}

impl From<PatternDocument> for PatternFile {
    fn from(document: PatternDocument) -> Self {
        let id = document
            .id
            .unwrap_or_else(|| derive_pattern_id(&document.name));
        Self {
            name: document.name,
            id,
            version: document.version,
            components: document.components,
        }
    }
}

/// Stable identifier of a pattern that does not declare one.
#[must_use]
fn derive_pattern_id(name: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
}

/// Description of one deployable unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentDefinition {
    /// Name of the component; also used as `metadata.name` of the resource.
    pub display_name: String,
    /// Resource type and schema version.
    pub component: ComponentKind,
    /// Model the component belongs to, used to pick its registrant.
    #[serde(default)]
    pub model: Option<String>,
    /// Free-form annotations, labels and flags.
    #[serde(default)]
    pub metadata: ComponentMetadata,
    /// Free-form resource configuration.
    #[serde(default)]
    pub configuration: Configuration,
    /// Display names of components that must be provisioned first.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

/// Resource type tag and schema version of a component.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ComponentKind {
    /// Resource kind, e.g. `Deployment`.
    pub kind: String,
    /// Schema version, either `v1` or `group/version`.
    #[serde(alias = "apiVersion")]
    pub version: String,
}

/// Component metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ComponentMetadata {
    /// Informational component that must never be deployed.
    #[serde(default)]
    pub is_annotation: bool,
    /// Everything else, including `annotations` and `labels`.
    #[serde(flatten)]
    pub additional: Map<String, Value>,
}

/// Loosely typed key/value configuration of a component.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(transparent)]
pub struct Configuration(Map<String, Value>);

/// A routing/registration target associated with a component.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Connection {
    /// Connection kind (e.g. "kubernetes").
    pub kind: String,
    /// Connection name.
    pub name: String,
}

impl PatternFile {
    /// Returns the display names of all components.
    #[must_use]
    pub fn component_names(&self) -> Vec<&str> {
        self.components
            .iter()
            .map(|c| c.display_name.as_str())
            .collect()
    }

    /// Returns the components that will actually be deployed.
    pub fn deployable(&self) -> impl Iterator<Item = &ComponentDefinition> {
        self.components.iter().filter(|c| !c.metadata.is_annotation)
    }
}

impl ComponentMetadata {
    /// Returns the raw `annotations` entry, if any.
    #[must_use]
    pub fn annotations(&self) -> Option<&Value> {
        self.additional.get("annotations")
    }

    /// Returns the raw `labels` entry, if any.
    #[must_use]
    pub fn labels(&self) -> Option<&Value> {
        self.additional.get("labels")
    }
}

impl Configuration {
    /// Creates an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Returns the raw value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Stores a value, returning the previous one.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    /// Iterates over all entries.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Reads a required string value.
    ///
    /// # Errors
    ///
    /// Returns `MissingKey` if absent and `WrongType` if not a string.
    pub fn get_str(&self, key: &str) -> Result<&str, ConfigError> {
        self.optional_str(key)?.ok_or_else(|| ConfigError::MissingKey {
            key: key.to_string(),
        })
    }

    /// Reads an optional string value.
    ///
    /// # Errors
    ///
    /// Returns `WrongType` if present but not a string.
    pub fn optional_str(&self, key: &str) -> Result<Option<&str>, ConfigError> {
        match self.0.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(_) => Err(ConfigError::WrongType {
                key: key.to_string(),
                expected: "string",
            }),
        }
    }

    /// Reads a required map of string values.
    ///
    /// # Errors
    ///
    /// Returns `MissingKey` if absent and `WrongType` if the value is not an
    /// object or any of its values is not a string.
    pub fn get_string_map(&self, key: &str) -> Result<BTreeMap<String, String>, ConfigError> {
        let wrong_type = || ConfigError::WrongType {
            key: key.to_string(),
            expected: "map of strings",
        };

        let Some(value) = self.0.get(key) else {
            return Err(ConfigError::MissingKey {
                key: key.to_string(),
            });
        };
        let object = value.as_object().ok_or_else(wrong_type)?;

        object
            .iter()
            .map(|(k, v)| {
                v.as_str()
                    .map(|s| (k.clone(), s.to_string()))
                    .ok_or_else(wrong_type)
            })
            .collect()
    }

    /// Stores a map of string values.
    pub fn set_string_map(&mut self, key: impl Into<String>, map: &BTreeMap<String, String>) {
        let object = map
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        self.0.insert(key.into(), Value::Object(object));
    }
}

impl From<Map<String, Value>> for Configuration {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl Connection {
    /// Creates a new connection.
    #[must_use]
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}
