//! Error types for the pattern provisioner.
//!
//! This module provides the error hierarchy for every step of a provisioning
//! request: configuration, cluster communication, planning, and stage
//! execution.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the pattern provisioner.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Kubernetes API errors.
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Planning errors.
    #[error("Planning error: {0}")]
    Plan(#[from] PlanError),

    /// Stage chain errors.
    #[error("{0}")]
    Stage(#[from] StageError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// A required key is absent from a configuration map.
    #[error("missing key {key}")]
    MissingKey {
        /// The absent key.
        key: String,
    },

    /// A configuration value has an unexpected type.
    #[error("wrong type for key {key}: expected {expected}")]
    WrongType {
        /// The offending key.
        key: String,
        /// Name of the expected type.
        expected: &'static str,
    },
}

/// Errors raised while talking to the cluster control plane.
#[derive(Debug, Error)]
pub enum KubeError {
    /// Dry run could not be performed or returned an unusable answer.
    #[error("dry run failed: {message}")]
    DryRun {
        /// Description of the problem.
        message: String,
    },

    /// The API server refused a component during a dry run.
    #[error("dry run rejected '{component}': {message}")]
    DryRunRejected {
        /// Display name of the component.
        component: String,
        /// Reason given by the API server.
        message: String,
    },

    /// A resource or status payload could not be encoded or decoded.
    #[error("failed to marshal {context}: {message}")]
    Marshal {
        /// What was being encoded or decoded.
        context: String,
        /// Underlying serializer message.
        message: String,
    },

    /// The target namespace could not be read from the component configuration.
    #[error("unable to extract namespace from component configuration: {source}")]
    NamespaceExtraction {
        /// The typed accessor failure.
        #[source]
        source: ConfigError,
    },

    /// The control plane rejected an apply with a structured status.
    #[error("failed to apply component '{component}': {status}")]
    StatusApply {
        /// Display name of the component.
        component: String,
        /// Serialized status payload returned by the API server.
        status: String,
    },

    /// Applying a manifest failed for a non-status reason.
    #[error("failed to apply manifest: {message}")]
    ApplyManifest {
        /// Description of the failure.
        message: String,
    },

    /// Transport-level failure that carries no parsable status.
    #[error("request to API server failed: {message}")]
    Transport {
        /// Description of the failure.
        message: String,
    },
}

/// Errors returned by the generic REST primitive of a cluster client.
///
/// The first two shapes carry the raw response body, which for a rejected
/// dry run holds the control plane's Status object.
#[derive(Debug, Error)]
pub enum RestError {
    /// The server answered with a non-success status code.
    #[error("server responded with status {code}: {}", String::from_utf8_lossy(.body))]
    Status {
        /// HTTP status code.
        code: u16,
        /// Raw response body.
        body: Vec<u8>,
    },

    /// The server answered with an object of an unexpected kind.
    #[error("unexpected object in response: {message}")]
    UnexpectedObject {
        /// Description of the mismatch.
        message: String,
        /// Raw response body.
        body: Vec<u8>,
    },

    /// The request never produced a usable response.
    #[error("{0}")]
    Transport(String),
}

/// Errors returned by the manifest apply primitive of a cluster client.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// The control plane rejected the request with a Status object.
    #[error("{}", status_message(.0))]
    Status(serde_json::Map<String, serde_json::Value>),

    /// The manifest could not be interpreted.
    #[error("invalid manifest: {0}")]
    Manifest(String),

    /// API discovery does not list the kind for its group version.
    #[error("kind {kind} is not served by {api_version}")]
    UnknownKind {
        /// Object kind.
        kind: String,
        /// Group version that was searched.
        api_version: String,
    },

    /// Any other failure.
    #[error("{0}")]
    Transport(String),
}

fn status_message(status: &serde_json::Map<String, serde_json::Value>) -> &str {
    status
        .get("message")
        .and_then(serde_json::Value::as_str)
        .unwrap_or("request rejected by API server")
}

impl RestError {
    /// Returns the raw response body for the two body-carrying shapes.
    #[must_use]
    pub fn body(&self) -> Option<&[u8]> {
        match self {
            Self::Status { body, .. } | Self::UnexpectedObject { body, .. } => Some(body),
            Self::Transport(_) => None,
        }
    }
}

/// Planning errors.
#[derive(Debug, Error)]
pub enum PlanError {
    /// The plan contains a dependency cycle.
    #[error("infeasible execution: detected cycle in the plan")]
    Infeasible,

    /// The plan could not be built.
    #[error("failed to create plan: {message}")]
    Creation {
        /// Description of the problem.
        message: String,
    },
}

/// Errors produced by the stage chain.
#[derive(Debug, Error)]
pub enum StageError {
    /// Per-component failures collected during execution.
    #[error("{}", .0.join("\n"))]
    Aggregate(Vec<String>),

    /// The pattern did not pass validation.
    #[error("pattern validation failed: {message}")]
    InvalidPattern {
        /// Joined validation messages.
        message: String,
    },
}

/// Result type alias for provisioner operations.
pub type Result<T> = std::result::Result<T, ProvisionError>;

impl ProvisionError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error aborts a whole provisioning request.
    ///
    /// Aggregated per-component failures are partial; everything else is fatal.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::Stage(StageError::Aggregate(_)))
    }

    /// Collapses a list of errors into one aggregate, or `None` if empty.
    #[must_use]
    pub fn merge(errors: Vec<Self>) -> Option<Self> {
        if errors.is_empty() {
            return None;
        }
        Some(Self::Stage(StageError::Aggregate(
            errors.iter().map(ToString::to_string).collect(),
        )))
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a validation error without a specific field.
    #[must_use]
    pub fn validation_general(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: None,
        }
    }
}

impl KubeError {
    /// Creates a dry-run error.
    #[must_use]
    pub fn dry_run(message: impl Into<String>) -> Self {
        Self::DryRun {
            message: message.into(),
        }
    }

    /// Creates a marshalling error.
    #[must_use]
    pub fn marshal(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Marshal {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Creates a transport error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_empty_is_none() {
        assert!(ProvisionError::merge(vec![]).is_none());
    }

    #[test]
    fn test_merge_joins_with_newline() {
        let merged = ProvisionError::merge(vec![
            ProvisionError::internal("first"),
            ProvisionError::Kube(KubeError::transport("second")),
        ]);

        let message = merged.map(|e| e.to_string()).unwrap_or_default();
        assert_eq!(
            message,
            "Internal error: first\nKubernetes error: request to API server failed: second"
        );
    }

    #[test]
    fn test_fatal_classification() {
        assert!(ProvisionError::Plan(PlanError::Infeasible).is_fatal());
        assert!(!ProvisionError::Stage(StageError::Aggregate(vec![])).is_fatal());
    }

    #[test]
    fn test_wrong_type_message_names_key() {
        let err = ConfigError::WrongType {
            key: String::from("namespace"),
            expected: "string",
        };
        assert_eq!(err.to_string(), "wrong type for key namespace: expected string");
    }
}
