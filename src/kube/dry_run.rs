//! Speculative, non-mutating validation of resources.
//!
//! The API server reports a rejected dry run as an error response carrying a
//! Status object. That object is the verdict, so rejection is returned as a
//! normal outcome rather than an error.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::ComponentDefinition;
use crate::error::{KubeError, Result};

use super::client::{ClusterClient, RestRequest};
use super::resource::K8sResource;

/// Verdict of a dry run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DryRunOutcome {
    /// Object returned by the API server (a Status on rejection).
    pub status: Map<String, Value>,
    /// Whether the resource would be accepted.
    pub success: bool,
}

impl DryRunOutcome {
    /// Returns the server supplied message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.status.get("message").and_then(Value::as_str)
    }
}

/// Dry-runs a component, reading its optional namespace from configuration.
///
/// # Errors
///
/// Returns an error if the namespace has the wrong type or the dry run itself
/// fails.
pub async fn dry_run_component(
    client: &dyn ClusterClient,
    component: &ComponentDefinition,
    field_manager: &str,
) -> Result<DryRunOutcome> {
    let resource = K8sResource::from_component(component);
    let namespace = component
        .configuration
        .optional_str("namespace")
        .map_err(|source| KubeError::NamespaceExtraction { source })?;

    dry_run(client, &resource, namespace, field_manager).await
}

/// Asks the API server whether `resource` would be accepted.
///
/// # Errors
///
/// Returns `DryRun` for missing kind/apiVersion or a status without `kind`,
/// `Marshal` for an unparsable body, and `Transport` for failures that carry
/// no body. A rejected resource is not an error.
pub async fn dry_run(
    client: &dyn ClusterClient,
    resource: &K8sResource,
    namespace: Option<&str>,
    field_manager: &str,
) -> Result<DryRunOutcome> {
    if resource.kind().is_empty() || resource.api_version().is_empty() {
        return Err(KubeError::dry_run("\"kind\" and \"apiVersion\" cannot be empty").into());
    }

    let path = resource.api_path(namespace);
    let data = resource.to_json()?;

    debug!("Dry run of {} '{}' at {path}", resource.kind(), resource.name().unwrap_or_default());

    let request = RestRequest::post(path)
        .body(data)
        .header("Content-Type", "application/json")
        .header("Accept", "application/json")
        .param("dryRun", "All")
        .param("fieldValidation", "Strict")
        .param("fieldManager", field_manager);

    let body = match client.request(request).await {
        Ok(body) => body,
        Err(e) => match e.body() {
            Some(body) => body.to_vec(),
            None => return Err(KubeError::transport(e.to_string()).into()),
        },
    };

    Ok(format_dry_run_response(&body)?)
}

/// Interprets the body returned for a dry run.
fn format_dry_run_response(body: &[u8]) -> std::result::Result<DryRunOutcome, KubeError> {
    let status: Map<String, Value> = serde_json::from_slice(body).map_err(|e| {
        KubeError::marshal(
            "Status object",
            format!("cannot deserialize Status object from the server: {e}"),
        )
    })?;

    if status.get("kind").is_none_or(Value::is_null) {
        return Err(KubeError::dry_run("nil response to dry run request to Kubernetes"));
    }

    let success = status.get("status").and_then(Value::as_str) != Some("Failure");
    Ok(DryRunOutcome { status, success })
}
