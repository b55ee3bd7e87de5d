//! Dry-run stage.
//!
//! Sends every deployable component to the API server with `dryRun=All` and
//! records the verdict. Rejections are partial failures: the chain continues
//! and the next stage decides what to do with them.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::DEFAULT_MAX_CONCURRENCY;
use crate::error::{KubeError, ProvisionError};
use crate::kube::{dry_run_component, ClusterClient};

use super::{Stage, StageData, StageOutcome};

/// Suffix of the result store key written for a dry-run verdict.
pub const DRY_RUN_SUFFIX_KEY: &str = ".dryRun";

/// Stage validating components against the live API server.
pub struct DryRunStage {
    client: Arc<dyn ClusterClient>,
    field_manager: String,
    max_concurrency: usize,
}

impl DryRunStage {
    /// Creates a dry-run stage.
    #[must_use]
    pub fn new(client: Arc<dyn ClusterClient>, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }

    /// Sets how many dry-run requests may be in flight at once.
    #[must_use]
    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = limit.max(1);
        self
    }
}

impl std::fmt::Debug for DryRunStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DryRunStage")
            .field("field_manager", &self.field_manager)
            .field("max_concurrency", &self.max_concurrency)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Stage for DryRunStage {
    fn name(&self) -> &'static str {
        "dry-run"
    }

    async fn run(&self, data: &mut StageData, error: Option<ProvisionError>) -> StageOutcome {
        if let Some(err) = error {
            return StageOutcome::Terminate(err);
        }

        let requests: Vec<_> = data
            .pattern
            .deployable()
            .map(|component| async move {
                let verdict =
                    dry_run_component(self.client.as_ref(), component, &self.field_manager).await;
                (component.display_name.clone(), verdict)
            })
            .collect();
        let verdicts: Vec<_> = stream::iter(requests)
            .buffered(self.max_concurrency)
            .collect()
            .await;

        let mut errors = Vec::new();
        let mut store = data.other.lock().await;

        for (name, verdict) in verdicts {
            let entry = match verdict {
                Ok(outcome) if outcome.success => {
                    debug!("'{name}' accepted by dry run");
                    String::from("accepted")
                }
                Ok(outcome) => {
                    let message = outcome.message().unwrap_or("no reason given").to_string();
                    warn!("'{name}' rejected by dry run: {message}");
                    let entry = format!("rejected: {message}");
                    errors.push(
                        KubeError::DryRunRejected {
                            component: name.clone(),
                            message,
                        }
                        .into(),
                    );
                    entry
                }
                Err(err) => {
                    warn!("Dry run of '{name}' failed: {err}");
                    let entry = format!("rejected: {err}");
                    errors.push(err);
                    entry
                }
            };
            store.insert(format!("{name}{DRY_RUN_SUFFIX_KEY}"), entry);
        }

        StageOutcome::Continue(ProvisionError::merge(errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RestError;
    use crate::kube::testing::FakeCluster;
    use crate::stages::test_support::pattern;

    const PATTERN: &str = r"
name: dry
components:
  - displayName: web
    component: {kind: Service, version: v1}
    configuration:
      namespace: default
  - displayName: note
    component: {kind: Comment, version: v1}
    metadata:
      isAnnotation: true
";

    #[tokio::test]
    async fn test_accepted_component_is_recorded() {
        let cluster = Arc::new(FakeCluster::new());
        let stage = DryRunStage::new(cluster.clone(), "tester");
        let mut data = StageData::new(pattern(PATTERN));

        let outcome = stage.run(&mut data, None).await;

        assert!(matches!(outcome, StageOutcome::Continue(None)));
        assert_eq!(
            data.results().await,
            vec![(String::from("web.dryRun"), String::from("accepted"))]
        );
        assert_eq!(cluster.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_rejection_is_partial_failure() {
        let cluster = Arc::new(FakeCluster::new());
        cluster.respond(Err(RestError::Status {
            code: 422,
            body: br#"{"kind":"Status","status":"Failure","message":"spec.ports: Required value"}"#
                .to_vec(),
        }));
        let stage = DryRunStage::new(cluster, "tester");
        let mut data = StageData::new(pattern(PATTERN));

        let outcome = stage.run(&mut data, None).await;

        let StageOutcome::Continue(Some(err)) = outcome else {
            panic!("expected a partial error");
        };
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("dry run rejected 'web'"));
        assert!(!err.to_string().contains("Internal"));
        assert!(err.to_string().contains("spec.ports: Required value"));
        assert_eq!(
            data.results().await,
            vec![(
                String::from("web.dryRun"),
                String::from("rejected: spec.ports: Required value")
            )]
        );
    }

    #[tokio::test]
    async fn test_requests_are_bounded() {
        let mut yaml = String::from("name: many\ncomponents:\n");
        for i in 0..12 {
            yaml.push_str(&format!(
                "  - displayName: c{i}\n    component: {{kind: ConfigMap, version: v1}}\n"
            ));
        }
        let cluster = Arc::new(FakeCluster::new());
        let stage = DryRunStage::new(cluster.clone(), "tester").with_max_concurrency(3);
        let mut data = StageData::new(pattern(&yaml));

        let outcome = stage.run(&mut data, None).await;

        assert!(matches!(outcome, StageOutcome::Continue(None)));
        assert_eq!(cluster.requests().len(), 12);
        assert_eq!(data.results().await.len(), 12);
        assert!(cluster.peak_requests() <= 3);
        assert!(cluster.peak_requests() > 1);
    }

    #[tokio::test]
    async fn test_incoming_error_terminates() {
        let cluster = Arc::new(FakeCluster::new());
        let stage = DryRunStage::new(cluster.clone(), "tester");
        let mut data = StageData::new(pattern(PATTERN));

        let outcome = stage
            .run(&mut data, Some(ProvisionError::internal("boom")))
            .await;

        assert!(matches!(outcome, StageOutcome::Terminate(_)));
        assert!(cluster.requests().is_empty());
    }
}
