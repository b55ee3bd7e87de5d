//! Canonical resource construction.
//!
//! Turns a component description into the flat map that is serialized for the
//! API server. This is a pure transformation.

use serde_json::{Map, Value};

use crate::config::ComponentDefinition;
use crate::error::KubeError;

/// Configuration keys that are always taken from the typed fields instead.
pub const RESERVED_KEYS: &[&str] = &["apiVersion", "kind", "metadata"];

/// Canonical resource representation of a component.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct K8sResource(Map<String, Value>);

impl K8sResource {
    /// Builds the canonical resource for a component.
    ///
    /// Every configuration entry except the reserved keys is copied to the top
    /// level of the resource.
    #[must_use]
    pub fn from_component(component: &ComponentDefinition) -> Self {
        let mut metadata = Map::new();
        metadata.insert(
            String::from("name"),
            Value::String(component.display_name.clone()),
        );
        metadata.insert(
            String::from("annotations"),
            component.metadata.annotations().cloned().unwrap_or(Value::Null),
        );
        metadata.insert(
            String::from("labels"),
            component.metadata.labels().cloned().unwrap_or(Value::Null),
        );

        let mut resource = Map::new();
        resource.insert(
            String::from("apiVersion"),
            Value::String(component.component.version.clone()),
        );
        resource.insert(
            String::from("kind"),
            Value::String(component.component.kind.clone()),
        );
        resource.insert(String::from("metadata"), Value::Object(metadata));

        for (key, value) in component.configuration.iter() {
            if RESERVED_KEYS.contains(&key.as_str()) {
                continue;
            }
            resource.insert(key.clone(), value.clone());
        }

        Self(resource)
    }

    /// Returns the resource kind, or an empty string.
    #[must_use]
    pub fn kind(&self) -> &str {
        self.str_field("kind")
    }

    /// Returns the API version, or an empty string.
    #[must_use]
    pub fn api_version(&self) -> &str {
        self.str_field("apiVersion")
    }

    /// Returns `metadata.name`, if set.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.0
            .get("metadata")
            .and_then(|m| m.get("name"))
            .and_then(Value::as_str)
    }

    /// Returns the top-level value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns the collection path for this resource.
    #[must_use]
    pub fn api_path(&self, namespace: Option<&str>) -> String {
        api_path(self.api_version(), self.kind(), namespace)
    }

    /// Serializes the resource as JSON.
    ///
    /// # Errors
    ///
    /// Returns a marshal error if serialization fails.
    pub fn to_json(&self) -> Result<Vec<u8>, KubeError> {
        serde_json::to_vec(&self.0).map_err(|e| KubeError::marshal("k8s resource", e.to_string()))
    }

    /// Serializes the resource as a YAML manifest.
    ///
    /// # Errors
    ///
    /// Returns a marshal error if serialization fails.
    pub fn to_yaml(&self) -> Result<String, KubeError> {
        serde_yaml::to_string(&self.0)
            .map_err(|e| KubeError::marshal("k8s manifest", e.to_string()))
    }

    fn str_field(&self, key: &str) -> &str {
        self.0.get(key).and_then(Value::as_str).unwrap_or_default()
    }
}

impl From<Map<String, Value>> for K8sResource {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Derives the REST resource segment from a kind.
///
/// This is a naive pluralization (`Ingress` becomes `ingresss`); the real
/// name is only available through API discovery.
#[must_use]
pub fn kind_to_resource(kind: &str) -> String {
    format!("{}s", kind.to_lowercase())
}

/// Builds the collection path for a kind.
///
/// Grouped versions (`apps/v1`) live under `/apis`, the core group under
/// `/api`. An empty namespace is treated as cluster scope.
#[must_use]
pub fn api_path(api_version: &str, kind: &str, namespace: Option<&str>) -> String {
    let root = if api_version.contains('/') { "apis" } else { "api" };
    let resource = kind_to_resource(kind);

    match namespace.filter(|ns| !ns.is_empty()) {
        Some(ns) => format!("/{root}/{api_version}/namespaces/{ns}/{resource}"),
        None => format!("/{root}/{api_version}/{resource}"),
    }
}
