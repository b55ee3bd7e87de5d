//! Configuration types for the provisioner itself.
//!
//! These structs map to `patternctl.yaml` and describe how to reach the
//! cluster and how provisioning requests are decorated and scheduled.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default API server address (a local `kubectl proxy`).
pub const DEFAULT_API_SERVER: &str = "http://127.0.0.1:8001";

/// Default prefix for the annotations stamped on every provisioned component.
pub const DEFAULT_ANNOTATION_PREFIX: &str = "design.pattern.io";

/// Default field manager identity sent with apply and dry-run requests.
pub const DEFAULT_FIELD_MANAGER: &str = "patternctl";

/// Default number of components handled at the same time.
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

/// The root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ProvisionerConfig {
    /// Cluster connection settings.
    #[serde(default)]
    pub cluster: ClusterConfig,
    /// Provisioning behaviour.
    #[serde(default)]
    pub provision: ProvisionSettings,
    /// Host registry settings.
    #[serde(default)]
    pub registry: RegistryConfig,
}

/// Cluster connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClusterConfig {
    /// Base URL of the Kubernetes API server.
    #[serde(default = "default_api_server")]
    pub api_server: String,
    /// Optional pre-issued bearer token.
    #[serde(default)]
    pub token: Option<String>,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Provisioning behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProvisionSettings {
    /// Prefix for the pattern name/id annotations.
    #[serde(default = "default_annotation_prefix")]
    pub annotation_prefix: String,
    /// Field manager identity.
    #[serde(default = "default_field_manager")]
    pub field_manager: String,
    /// Maximum number of components provisioned at the same time.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Whether `apply` runs a dry run of every component first.
    #[serde(default)]
    pub dry_run_before_apply: bool,
}

/// Host registry settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RegistryConfig {
    /// Connection used when no model mapping matches.
    #[serde(default)]
    pub default_connection: Option<ConnectionConfig>,
    /// Model name to connection mapping.
    #[serde(default)]
    pub models: HashMap<String, ConnectionConfig>,
}

/// A configured registration target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Connection kind (e.g. "kubernetes").
    pub kind: String,
    /// Connection name.
    pub name: String,
}

fn default_api_server() -> String {
    String::from(DEFAULT_API_SERVER)
}

const fn default_timeout_secs() -> u64 {
    30
}

fn default_annotation_prefix() -> String {
    String::from(DEFAULT_ANNOTATION_PREFIX)
}

fn default_field_manager() -> String {
    String::from(DEFAULT_FIELD_MANAGER)
}

const fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            api_server: default_api_server(),
            token: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for ProvisionSettings {
    fn default() -> Self {
        Self {
            annotation_prefix: default_annotation_prefix(),
            field_manager: default_field_manager(),
            max_concurrency: default_max_concurrency(),
            dry_run_before_apply: false,
        }
    }
}
