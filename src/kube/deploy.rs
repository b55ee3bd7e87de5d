//! Real application and removal of components.

use tracing::{debug, info};

use crate::config::ComponentDefinition;
use crate::error::{ClusterError, KubeError, Result};

use super::client::{ApplyOptions, ClusterClient};
use super::resource::K8sResource;

/// Applies (or deletes, with `is_delete`) a component on the cluster.
///
/// The component must carry a string `namespace` in its configuration.
/// Nothing is retried.
///
/// # Errors
///
/// Returns `NamespaceExtraction` for a missing or mistyped namespace,
/// `StatusApply` when the API server rejects the object with a Status, and
/// `ApplyManifest` for any other failure.
pub async fn deploy(
    client: &dyn ClusterClient,
    component: &ComponentDefinition,
    is_delete: bool,
) -> Result<()> {
    let resource = K8sResource::from_component(component);
    let manifest = resource.to_yaml()?;

    let namespace = component
        .configuration
        .get_str("namespace")
        .map_err(|source| KubeError::NamespaceExtraction { source })?;

    let options = ApplyOptions {
        namespace: namespace.to_string(),
        update: true,
        delete: is_delete,
    };

    debug!(
        "Submitting {} '{}' to namespace {namespace} (delete: {is_delete})",
        resource.kind(),
        component.display_name
    );

    match client.apply_manifest(manifest.as_bytes(), &options).await {
        Ok(()) => {
            info!(
                "{} {} '{}'",
                if is_delete { "Deleted" } else { "Applied" },
                resource.kind(),
                component.display_name
            );
            Ok(())
        }
        Err(ClusterError::Status(status)) => {
            let status = serde_json::to_string(&status)
                .map_err(|e| KubeError::marshal("Status object", e.to_string()))?;
            Err(KubeError::StatusApply {
                component: component.display_name.clone(),
                status,
            }
            .into())
        }
        Err(other) => Err(KubeError::ApplyManifest {
            message: other.to_string(),
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ComponentKind, ComponentMetadata, Configuration};
    use crate::error::{ConfigError, ProvisionError};
    use crate::kube::testing::FakeCluster;
    use serde_json::{json, Value};

    fn component(configuration: Value) -> ComponentDefinition {
        ComponentDefinition {
            display_name: String::from("cache"),
            component: ComponentKind {
                kind: String::from("ConfigMap"),
                version: String::from("v1"),
            },
            model: None,
            metadata: ComponentMetadata::default(),
            configuration: match configuration {
                Value::Object(map) => Configuration::from(map),
                _ => Configuration::new(),
            },
            depends_on: vec![],
        }
    }

    #[tokio::test]
    async fn test_deploy_submits_manifest() {
        let cluster = FakeCluster::new();
        let comp = component(json!({"namespace": "default", "data": {"k": "v"}}));

        deploy(&cluster, &comp, false).await.unwrap();

        let applied = cluster.applied();
        assert_eq!(applied.len(), 1);
        let (manifest, options) = &applied[0];
        assert!(manifest.contains("kind: ConfigMap"));
        assert_eq!(
            options,
            &ApplyOptions {
                namespace: String::from("default"),
                update: true,
                delete: false,
            }
        );
    }

    #[tokio::test]
    async fn test_delete_flag_is_forwarded() {
        let cluster = FakeCluster::new();
        deploy(&cluster, &component(json!({"namespace": "default"})), true)
            .await
            .unwrap();
        assert!(cluster.applied()[0].1.delete);
    }

    #[tokio::test]
    async fn test_missing_namespace() {
        let cluster = FakeCluster::new();
        let result = deploy(&cluster, &component(json!({})), false).await;

        assert!(matches!(
            result,
            Err(ProvisionError::Kube(KubeError::NamespaceExtraction {
                source: ConfigError::MissingKey { .. }
            }))
        ));
        assert!(cluster.applied().is_empty());
    }

    #[tokio::test]
    async fn test_status_error_carries_component_and_payload() {
        let cluster = FakeCluster::new();
        let mut status = serde_json::Map::new();
        status.insert(String::from("kind"), json!("Status"));
        status.insert(String::from("message"), json!("forbidden"));
        cluster.fail_apply(ClusterError::Status(status));

        let result = deploy(&cluster, &component(json!({"namespace": "default"})), false).await;
        match result {
            Err(ProvisionError::Kube(KubeError::StatusApply { component, status })) => {
                assert_eq!(component, "cache");
                assert!(status.contains("forbidden"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_other_errors_are_apply_failures() {
        let cluster = FakeCluster::new();
        cluster.fail_apply(ClusterError::Transport(String::from("timeout")));

        let result = deploy(&cluster, &component(json!({"namespace": "default"})), false).await;
        assert!(matches!(
            result,
            Err(ProvisionError::Kube(KubeError::ApplyManifest { .. }))
        ));
    }
}
