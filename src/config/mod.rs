//! Configuration module for the pattern provisioner.
//!
//! This module handles all configuration-related functionality:
//! - Parsing `patternctl.yaml` and pattern files
//! - Typed access to loosely typed component configuration
//! - Validation of configuration and patterns

mod spec;
mod pattern;
mod parser;
mod validator;

pub use spec::{
    ClusterConfig, ConnectionConfig, ProvisionSettings, ProvisionerConfig, RegistryConfig,
    DEFAULT_ANNOTATION_PREFIX, DEFAULT_API_SERVER, DEFAULT_FIELD_MANAGER, DEFAULT_MAX_CONCURRENCY,
};
pub use pattern::{
    ComponentDefinition, ComponentKind, ComponentMetadata, Configuration, Connection, PatternFile,
};
pub use parser::{ConfigParser, find_config_file};
pub use validator::{ConfigValidator, PatternValidator, ValidationResult};
