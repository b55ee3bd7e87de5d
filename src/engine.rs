//! Provisioning engine.
//!
//! This module wires configuration, cluster client, planner and registry into
//! a stage chain and turns the outcome of a run into a [`ProvisionReport`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::{PatternFile, ProvisionerConfig};
use crate::error::{ProvisionError, Result, StageError};
use crate::kube::{ClusterClient, K8sResource, KubeClient};
use crate::planner::{DependencyPlanner, Planner};
use crate::provider::{ClusterActionProvider, Registry, StaticRegistry};
use crate::stages::{Chain, DryRunStage, ProvisionStage, StageData, ValidateStage};

/// Operation requested for a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    /// Validate every component against the API server without persisting.
    DryRun,
    /// Apply every component.
    Apply,
    /// Delete every component.
    Delete,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DryRun => write!(f, "dry-run"),
            Self::Apply => write!(f, "apply"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// Outcome of a provisioning run.
#[derive(Debug, Clone, Serialize)]
pub struct ProvisionReport {
    /// Pattern name.
    pub pattern: String,
    /// Pattern identifier.
    pub pattern_id: String,
    /// Operation performed.
    pub operation: Operation,
    /// Whether every component succeeded.
    pub success: bool,
    /// Result store contents.
    pub results: BTreeMap<String, String>,
    /// Per-component error messages.
    pub errors: Vec<String>,
    /// Start of the run.
    pub started_at: DateTime<Utc>,
    /// End of the run.
    pub finished_at: DateTime<Utc>,
}

impl ProvisionReport {
    /// Returns the run duration in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

impl std::fmt::Display for ProvisionReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = if self.success { "successful" } else { "failed" };
        writeln!(f, "{} of '{}' {status}:", self.operation, self.pattern)?;
        for (key, value) in &self.results {
            writeln!(f, "  {key}: {value}")?;
        }

        if !self.errors.is_empty() {
            writeln!(f, "  Errors:")?;
            for error in &self.errors {
                writeln!(f, "    - {error}")?;
            }
        }

        Ok(())
    }
}

/// Façade running provisioning requests.
pub struct Provisioner {
    config: ProvisionerConfig,
    client: Arc<dyn ClusterClient>,
    planner: Arc<dyn Planner>,
    registry: Arc<dyn Registry>,
}

impl Provisioner {
    /// Creates a provisioner talking to the configured API server.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: ProvisionerConfig) -> Result<Self> {
        let client = KubeClient::new(&config.cluster, &config.provision.field_manager)?;
        Ok(Self::new(config, Arc::new(client)))
    }

    /// Creates a provisioner with an explicit cluster client.
    #[must_use]
    pub fn new(config: ProvisionerConfig, client: Arc<dyn ClusterClient>) -> Self {
        let planner = Arc::new(DependencyPlanner::new(config.provision.max_concurrency));
        let registry = Arc::new(StaticRegistry::new(&config.registry));
        Self {
            config,
            client,
            planner,
            registry,
        }
    }

    /// Replaces the planner.
    #[must_use]
    pub fn with_planner(mut self, planner: Arc<dyn Planner>) -> Self {
        self.planner = planner;
        self
    }

    /// Replaces the host registry.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<dyn Registry>) -> Self {
        self.registry = registry;
        self
    }

    /// Builds the stage chain for an operation.
    #[must_use]
    pub fn chain(&self, operation: Operation) -> Chain {
        let settings = &self.config.provision;
        let chain = Chain::new().add(ValidateStage::new());

        let provision = |is_delete: bool| {
            ProvisionStage::new(
                Arc::clone(&self.planner),
                Arc::new(ClusterActionProvider::new(Arc::clone(&self.client), is_delete)),
                Arc::clone(&self.registry),
                is_delete,
            )
            .with_annotation_prefix(&settings.annotation_prefix)
            .with_field_manager(&settings.field_manager)
        };
        let dry_run = || {
            DryRunStage::new(Arc::clone(&self.client), &settings.field_manager)
                .with_max_concurrency(settings.max_concurrency)
        };

        match operation {
            Operation::DryRun => chain.add(dry_run()),
            Operation::Apply if settings.dry_run_before_apply => {
                chain.add(dry_run()).add(provision(false))
            }
            Operation::Apply => chain.add(provision(false)),
            Operation::Delete => chain.add(provision(true)),
        }
    }

    /// Runs an operation on a pattern.
    ///
    /// Per-component failures end up in the report; only fatal errors are
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns validation, planning and other fatal errors.
    pub async fn run(&self, pattern: PatternFile, operation: Operation) -> Result<ProvisionReport> {
        let started_at = Utc::now();
        let name = pattern.name.clone();
        let pattern_id = pattern.id.to_string();

        info!("Starting {operation} of pattern '{name}'");

        let mut data = StageData::new(pattern);
        let errors = match self.chain(operation).process(&mut data).await {
            Ok(()) => vec![],
            Err(ProvisionError::Stage(StageError::Aggregate(messages))) => {
                warn!("{} components of '{name}' failed", messages.len());
                messages
            }
            Err(err) => {
                error!("{operation} of pattern '{name}' aborted: {err}");
                return Err(err);
            }
        };

        let results = data.results().await.into_iter().collect();
        let report = ProvisionReport {
            pattern: name,
            pattern_id,
            operation,
            success: errors.is_empty(),
            results,
            errors,
            started_at,
            finished_at: Utc::now(),
        };

        info!(
            "Finished {operation} of '{}' in {}ms",
            report.pattern,
            report.duration_ms()
        );
        Ok(report)
    }

    /// Applies a pattern.
    ///
    /// # Errors
    ///
    /// See [`Provisioner::run`].
    pub async fn apply(&self, pattern: PatternFile) -> Result<ProvisionReport> {
        self.run(pattern, Operation::Apply).await
    }

    /// Deletes a pattern.
    ///
    /// # Errors
    ///
    /// See [`Provisioner::run`].
    pub async fn delete(&self, pattern: PatternFile) -> Result<ProvisionReport> {
        self.run(pattern, Operation::Delete).await
    }

    /// Dry-runs a pattern.
    ///
    /// # Errors
    ///
    /// See [`Provisioner::run`].
    pub async fn dry_run(&self, pattern: PatternFile) -> Result<ProvisionReport> {
        self.run(pattern, Operation::DryRun).await
    }
}

impl std::fmt::Debug for Provisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provisioner")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Renders the deployable components of a pattern as a multi-document YAML
/// manifest.
///
/// # Errors
///
/// Returns an error if a resource cannot be serialized.
pub fn render(pattern: &PatternFile) -> Result<String> {
    let documents = pattern
        .deployable()
        .map(|component| K8sResource::from_component(component).to_yaml())
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(documents.join("---\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigParser;
    use crate::error::{ClusterError, PlanError};
    use crate::kube::testing::FakeCluster;

    const PATTERN: &str = r"
name: shop
components:
  - displayName: db
    component: {kind: StatefulSet, version: apps/v1}
    configuration:
      namespace: shop
  - displayName: web
    component: {kind: Deployment, version: apps/v1}
    dependsOn: [db]
    configuration:
      namespace: shop
  - displayName: readme
    component: {kind: Note, version: v1}
    metadata:
      isAnnotation: true
";

    fn pattern(yaml: &str) -> PatternFile {
        ConfigParser::parse_pattern(yaml, None).unwrap()
    }

    #[tokio::test]
    async fn test_apply_reports_every_component() {
        let cluster = Arc::new(FakeCluster::new());
        let provisioner = Provisioner::new(ProvisionerConfig::default(), cluster.clone());

        let report = provisioner.apply(pattern(PATTERN)).await.unwrap();

        assert!(report.success);
        assert_eq!(report.operation, Operation::Apply);
        assert_eq!(
            report.results.get("web.isProvisioned").map(String::as_str),
            Some("deployed Deployment/web")
        );
        assert_eq!(report.results.len(), 2);

        let applied = cluster.applied();
        assert_eq!(applied.len(), 2);
        assert!(applied[0].0.contains("name: db"));
        assert!(applied[1].0.contains("design.pattern.io.name: shop"));
    }

    #[tokio::test]
    async fn test_partial_failure_is_reported() {
        let cluster = Arc::new(FakeCluster::new());
        cluster.fail_apply(ClusterError::Transport(String::from("connection reset")));
        let provisioner = Provisioner::new(ProvisionerConfig::default(), cluster.clone());

        let report = provisioner.apply(pattern(PATTERN)).await.unwrap();

        assert!(!report.success);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.results.len(), 1);
    }

    #[tokio::test]
    async fn test_cycle_is_fatal() {
        let cyclic = pattern(
            r"
name: loop
components:
  - displayName: a
    component: {kind: Pod, version: v1}
    dependsOn: [b]
    configuration: {namespace: default}
  - displayName: b
    component: {kind: Pod, version: v1}
    dependsOn: [a]
    configuration: {namespace: default}
",
        );
        let cluster = Arc::new(FakeCluster::new());
        let provisioner = Provisioner::new(ProvisionerConfig::default(), cluster.clone());

        let err = provisioner.apply(cyclic).await.unwrap_err();

        assert!(matches!(err, ProvisionError::Plan(PlanError::Infeasible)));
        assert!(cluster.applied().is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_before_apply_blocks_rejected_pattern() {
        let cluster = Arc::new(FakeCluster::new());
        cluster.respond(Err(crate::error::RestError::Status {
            code: 422,
            body: br#"{"kind":"Status","status":"Failure","message":"invalid"}"#.to_vec(),
        }));
        let mut config = ProvisionerConfig::default();
        config.provision.dry_run_before_apply = true;
        let provisioner = Provisioner::new(config, cluster.clone());

        let report = provisioner.apply(pattern(PATTERN)).await.unwrap();

        assert!(!report.success);
        assert!(report.errors.iter().any(|e| e.contains("invalid")));
        assert_eq!(
            report.results.get("db.dryRun").map(String::as_str),
            Some("rejected: invalid")
        );
        assert!(cluster.applied().is_empty());
    }

    #[tokio::test]
    async fn test_delete_uses_reverse_order() {
        let cluster = Arc::new(FakeCluster::new());
        let provisioner = Provisioner::new(ProvisionerConfig::default(), cluster.clone());

        let report = provisioner.delete(pattern(PATTERN)).await.unwrap();

        assert_eq!(
            report.results.get("db.isProvisioned").map(String::as_str),
            Some("deleted StatefulSet/db")
        );
        let applied = cluster.applied();
        assert!(applied[0].0.contains("name: web"));
        assert!(applied.iter().all(|(_, options)| options.delete));
    }

    #[test]
    fn test_render_skips_annotation_components() {
        let manifest = render(&pattern(PATTERN)).unwrap();
        assert_eq!(manifest.matches("kind:").count(), 2);
        assert!(!manifest.contains("Note"));
    }

    #[test]
    fn test_chain_shape_follows_operation() {
        let mut config = ProvisionerConfig::default();
        let cluster: Arc<dyn ClusterClient> = Arc::new(FakeCluster::new());
        assert_eq!(Provisioner::new(config.clone(), cluster.clone()).chain(Operation::Apply).len(), 2);

        config.provision.dry_run_before_apply = true;
        let provisioner = Provisioner::new(config, cluster);
        assert_eq!(provisioner.chain(Operation::Apply).len(), 3);
        assert_eq!(provisioner.chain(Operation::DryRun).len(), 2);
    }
}
