//! Validation of provisioner configuration and pattern files.
//!
//! Both validators collect every problem they find; errors block a request,
//! warnings are reported but tolerated.

use crate::error::{ConfigError, ProvisionError, Result};
use std::collections::HashSet;
use tracing::debug;

use super::pattern::{ComponentDefinition, PatternFile};
use super::spec::ProvisionerConfig;

/// Validator for provisioner configuration.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validator for pattern files.
#[derive(Debug, Default)]
pub struct PatternValidator;

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a provisioner configuration.
    ///
    /// # Errors
    ///
    /// Returns the first error if validation fails.
    pub fn validate(&self, config: &ProvisionerConfig) -> Result<ValidationResult> {
        let mut result = ValidationResult::default();

        if reqwest::Url::parse(&config.cluster.api_server).is_err() {
            result.push_error(
                "cluster.api_server",
                format!("'{}' is not a valid URL", config.cluster.api_server),
            );
        }

        if config.cluster.timeout_secs == 0 {
            result.push_error("cluster.timeout_secs", "Timeout must be at least 1 second");
        }

        if config.provision.annotation_prefix.trim().is_empty() {
            result.push_error("provision.annotation_prefix", "Annotation prefix cannot be empty");
        }

        if config.provision.field_manager.trim().is_empty() {
            result.push_error("provision.field_manager", "Field manager cannot be empty");
        }

        if config.provision.max_concurrency == 0 {
            result.push_error("provision.max_concurrency", "Concurrency must be at least 1");
        }

        if config.cluster.token.is_some() && config.cluster.api_server.starts_with("http://") {
            result
                .warnings
                .push(String::from("cluster.token: bearer token will be sent over plain HTTP"));
        }

        result.into_result("Configuration")
    }
}

impl PatternValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a pattern file.
    ///
    /// # Errors
    ///
    /// Returns the first error if validation fails.
    pub fn validate(&self, pattern: &PatternFile) -> Result<ValidationResult> {
        self.check(pattern).into_result("Pattern")
    }

    /// Collects all problems of a pattern without failing.
    #[must_use]
    pub fn check(&self, pattern: &PatternFile) -> ValidationResult {
        let mut result = ValidationResult::default();

        if pattern.name.trim().is_empty() {
            result.push_error("name", "Pattern name cannot be empty");
        }

        if pattern.components.is_empty() {
            result.warnings.push(String::from("No components defined in pattern"));
        }

        let names: HashSet<&str> = pattern
            .components
            .iter()
            .map(|c| c.display_name.as_str())
            .collect();
        let annotation_only: HashSet<&str> = pattern
            .components
            .iter()
            .filter(|c| c.metadata.is_annotation)
            .map(|c| c.display_name.as_str())
            .collect();

        let mut seen = HashSet::new();
        for (i, component) in pattern.components.iter().enumerate() {
            let prefix = format!("components[{i}]");

            if !seen.insert(component.display_name.as_str()) {
                result.push_error(
                    format!("{prefix}.displayName"),
                    format!("Duplicate component name: {}", component.display_name),
                );
            }

            Self::validate_component(component, &prefix, &names, &annotation_only, &mut result);
        }

        result
    }

    fn validate_component(
        component: &ComponentDefinition,
        prefix: &str,
        names: &HashSet<&str>,
        annotation_only: &HashSet<&str>,
        result: &mut ValidationResult,
    ) {
        if component.display_name.trim().is_empty() {
            result.push_error(format!("{prefix}.displayName"), "Component name cannot be empty");
        }

        // Annotation-only components are never sent anywhere.
        if component.metadata.is_annotation {
            return;
        }

        if component.component.kind.is_empty() {
            result.push_error(format!("{prefix}.component.kind"), "Kind cannot be empty");
        }

        if component.component.version.is_empty() {
            result.push_error(format!("{prefix}.component.version"), "Version cannot be empty");
        }

        match component.configuration.optional_str("namespace") {
            Ok(Some(_)) => {}
            Ok(None) => result.warnings.push(format!(
                "{prefix}.configuration.namespace: '{}' has no namespace and cannot be applied",
                component.display_name
            )),
            Err(e) => result.push_error(format!("{prefix}.configuration.namespace"), e.to_string()),
        }

        for dependency in &component.depends_on {
            if dependency == &component.display_name {
                result.push_error(
                    format!("{prefix}.dependsOn"),
                    format!("'{dependency}' depends on itself"),
                );
            } else if annotation_only.contains(dependency.as_str()) {
                result.warnings.push(format!(
                    "{prefix}.dependsOn: '{dependency}' is annotation-only and is ignored"
                ));
            } else if !names.contains(dependency.as_str()) {
                result.push_error(
                    format!("{prefix}.dependsOn"),
                    format!("Unknown dependency '{dependency}'"),
                );
            }
        }
    }
}

impl ValidationResult {
    fn push_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    fn into_result(self, subject: &str) -> Result<Self> {
        match self.errors.first() {
            None => {
                debug!("{subject} validation passed");
                Ok(self)
            }
            Some(first_error) => Err(ProvisionError::Config(ConfigError::ValidationError {
                message: first_error.message.clone(),
                field: Some(first_error.field.clone()),
            })),
        }
    }

    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    /// Joins all error messages into one line each.
    #[must_use]
    pub fn summary(&self) -> String {
        self.errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}
