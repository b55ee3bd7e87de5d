//! Provisioning stage.
//!
//! Filters annotation-only components, asks the planner for a plan and runs
//! the action provider for every component of that plan. Per-component
//! failures are collected and handed to the next stage as one aggregate.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, info_span, warn};

use crate::config::{ComponentDefinition, Connection, PatternFile};
use crate::error::{PlanError, ProvisionError};
use crate::planner::{ComponentCallback, ComponentFuture, Planner};
use crate::provider::{ActionProvider, CompConfigPair, Registry};

use super::{ResultStore, Stage, StageData, StageOutcome};

/// Suffix of the result store key written for a provisioned component.
pub const PROVISION_SUFFIX_KEY: &str = ".isProvisioned";

/// Label naming the tool that manages a component.
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Label carrying the component display name.
pub const NAME_LABEL: &str = "app.kubernetes.io/name";

/// Stage applying (or deleting) every deployable component of a pattern.
pub struct ProvisionStage {
    planner: Arc<dyn Planner>,
    action: Arc<dyn ActionProvider>,
    registry: Arc<dyn Registry>,
    is_delete: bool,
    annotation_prefix: String,
    field_manager: String,
}

impl ProvisionStage {
    /// Creates a provisioning stage.
    #[must_use]
    pub fn new(
        planner: Arc<dyn Planner>,
        action: Arc<dyn ActionProvider>,
        registry: Arc<dyn Registry>,
        is_delete: bool,
    ) -> Self {
        Self {
            planner,
            action,
            registry,
            is_delete,
            annotation_prefix: String::from(crate::config::DEFAULT_ANNOTATION_PREFIX),
            field_manager: String::from(crate::config::DEFAULT_FIELD_MANAGER),
        }
    }

    /// Sets the prefix of the pattern annotations.
    #[must_use]
    pub fn with_annotation_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.annotation_prefix = prefix.into();
        self
    }

    /// Sets the value of the managed-by label.
    #[must_use]
    pub fn with_field_manager(mut self, field_manager: impl Into<String>) -> Self {
        self.field_manager = field_manager.into();
        self
    }

    fn callback(
        &self,
        annotations: BTreeMap<String, String>,
        store: ResultStore,
        errors: Arc<Mutex<Vec<ProvisionError>>>,
    ) -> ComponentCallback {
        let action = Arc::clone(&self.action);
        let registry = Arc::clone(&self.registry);
        let field_manager = self.field_manager.clone();

        Arc::new(move |name: String, mut component: ComponentDefinition| -> ComponentFuture {
            let action = Arc::clone(&action);
            let registry = Arc::clone(&registry);
            let store = Arc::clone(&store);
            let errors = Arc::clone(&errors);
            let field_manager = field_manager.clone();
            let annotations = annotations.clone();

            Box::pin(async move {
                assign_additional_labels(&mut component, &field_manager);
                let hosts = generate_hosts(&component, registry.as_ref());
                merge_annotations(&mut component, &annotations);

                match action.provision(CompConfigPair { component, hosts }).await {
                    Ok(message) => {
                        debug!("'{name}': {message}");
                        store
                            .lock()
                            .await
                            .insert(format!("{name}{PROVISION_SUFFIX_KEY}"), message);
                        true
                    }
                    Err(err) => {
                        warn!("Failed to provision '{name}': {err}");
                        errors.lock().await.push(err);
                        false
                    }
                }
            })
        })
    }
}

impl std::fmt::Debug for ProvisionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvisionStage")
            .field("is_delete", &self.is_delete)
            .field("annotation_prefix", &self.annotation_prefix)
            .field("field_manager", &self.field_manager)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Stage for ProvisionStage {
    fn name(&self) -> &'static str {
        "provision"
    }

    async fn run(&self, data: &mut StageData, error: Option<ProvisionError>) -> StageOutcome {
        if let Some(err) = error {
            return StageOutcome::Terminate(err);
        }

        filter_annotation_components(&mut data.pattern);

        let plan = match self.planner.create_plan(&data.pattern, self.is_delete) {
            Ok(plan) => plan,
            Err(err) => return StageOutcome::Terminate(err),
        };

        if !plan.is_feasible() {
            return StageOutcome::Terminate(PlanError::Infeasible.into());
        }

        let errors = Arc::new(Mutex::new(Vec::new()));
        let callback = self.callback(
            additional_annotations(&data.pattern, &self.annotation_prefix),
            Arc::clone(&data.other),
            Arc::clone(&errors),
        );

        let span = info_span!(
            "provision",
            pattern = %data.pattern.name,
            delete = self.is_delete
        );
        let summary = plan.execute(callback, span).await;
        info!("Pattern '{}': {summary}", data.pattern.name);

        let mut collected = std::mem::take(&mut *errors.lock().await);
        if !summary.all_successful() && collected.len() < summary.failed {
            // Callbacks that panicked never reached the error list.
            collected.push(ProvisionError::internal(format!(
                "{} component(s) aborted before reporting a result",
                summary.failed - collected.len()
            )));
        }
        StageOutcome::Continue(ProvisionError::merge(collected))
    }
}

/// Removes annotation-only components from the pattern.
pub fn filter_annotation_components(pattern: &mut PatternFile) {
    let before = pattern.components.len();
    pattern
        .components
        .retain(|component| !component.metadata.is_annotation);

    let removed = before - pattern.components.len();
    if removed > 0 {
        debug!("Skipping {removed} annotation-only components");
    }
}

/// Adds the mandatory labels to the component metadata.
///
/// Existing labels are kept; a non-object `labels` entry is replaced.
pub fn assign_additional_labels(component: &mut ComponentDefinition, field_manager: &str) {
    let labels = component
        .metadata
        .additional
        .entry("labels")
        .or_insert_with(|| Value::Object(Map::new()));

    if !labels.is_object() {
        warn!(
            "Replacing non-object labels of '{}'",
            component.display_name
        );
        *labels = Value::Object(Map::new());
    }

    if let Value::Object(labels) = labels {
        labels.insert(
            String::from(MANAGED_BY_LABEL),
            Value::String(field_manager.to_string()),
        );
        labels.insert(
            String::from(NAME_LABEL),
            Value::String(component.display_name.clone()),
        );
    }
}

/// Returns the hosts a component is registered with.
#[must_use]
pub fn generate_hosts(component: &ComponentDefinition, registry: &dyn Registry) -> HashSet<Connection> {
    HashSet::from([registry.registrant(component)])
}

/// Returns the annotations identifying the pattern a component belongs to.
#[must_use]
pub fn additional_annotations(pattern: &PatternFile, prefix: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (format!("{prefix}.name"), pattern.name.clone()),
        (format!("{prefix}.id"), pattern.id.to_string()),
    ])
}

/// Merges `extra` into `configuration["annotations"]`.
///
/// A missing or mistyped annotations entry counts as empty. Keys of `extra`
/// win on conflict, so merging twice gives the same result.
pub fn merge_annotations(component: &mut ComponentDefinition, extra: &BTreeMap<String, String>) {
    let mut annotations = component
        .configuration
        .get_string_map("annotations")
        .unwrap_or_default();

    annotations.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
    component
        .configuration
        .set_string_map("annotations", &annotations);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{KubeError, Result, StageError};
    use crate::planner::{DependencyPlanner, ExecutionSummary, Plan};
    use crate::provider::StaticRegistry;
    use crate::stages::test_support::{names, pattern};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing::Span;

    const PATTERN: &str = r"
name: shop
id: 6f1c3a56-3b7e-4f2b-9a53-6a2f2f0b8d11
components:
  - displayName: db
    component: {kind: StatefulSet, version: apps/v1}
    configuration:
      namespace: shop
  - displayName: api
    component: {kind: Deployment, version: apps/v1}
    dependsOn: [db]
    configuration:
      namespace: shop
      annotations:
        team: payments
  - displayName: web
    component: {kind: Deployment, version: apps/v1}
    dependsOn: [api]
    configuration:
      namespace: shop
  - displayName: note
    component: {kind: Comment, version: v1}
    metadata:
      isAnnotation: true
";

    /// Records provisioned components and fails the configured names.
    #[derive(Default)]
    struct ScriptedAction {
        failing: Vec<&'static str>,
        fails_when: Option<fn(&str) -> bool>,
        calls: AtomicUsize,
        seen: Mutex<Vec<CompConfigPair>>,
    }

    #[async_trait]
    impl ActionProvider for ScriptedAction {
        async fn provision(&self, pair: CompConfigPair) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let name = pair.component.display_name.clone();
            self.seen.lock().await.push(pair);
            tokio::task::yield_now().await;
            if self.failing.contains(&name.as_str()) || self.fails_when.is_some_and(|f| f(&name)) {
                return Err(KubeError::ApplyManifest {
                    message: format!("{name} refused"),
                }
                .into());
            }
            Ok(format!("deployed {name}"))
        }
    }

    struct CyclicPlanner;

    struct CyclicPlan;

    #[async_trait]
    impl Plan for CyclicPlan {
        fn is_feasible(&self) -> bool {
            false
        }

        async fn execute(&self, _callback: ComponentCallback, _span: Span) -> ExecutionSummary {
            ExecutionSummary::default()
        }
    }

    impl Planner for CyclicPlanner {
        fn create_plan(&self, _pattern: &PatternFile, _is_delete: bool) -> Result<Box<dyn Plan>> {
            Ok(Box::new(CyclicPlan))
        }
    }

    fn stage(planner: Arc<dyn Planner>, action: Arc<ScriptedAction>) -> ProvisionStage {
        ProvisionStage::new(planner, action, Arc::new(StaticRegistry::default()), false)
            .with_annotation_prefix("example.io")
            .with_field_manager("tester")
    }

    #[tokio::test]
    async fn test_all_components_provisioned() {
        let action = Arc::new(ScriptedAction::default());
        let stage = stage(Arc::new(DependencyPlanner::default()), action.clone());
        let mut data = StageData::new(pattern(PATTERN));

        let outcome = stage.run(&mut data, None).await;

        assert!(matches!(outcome, StageOutcome::Continue(None)));
        assert_eq!(names(&data.pattern.components), vec!["db", "api", "web"]);
        assert_eq!(
            data.results().await,
            vec![
                (String::from("api.isProvisioned"), String::from("deployed api")),
                (String::from("db.isProvisioned"), String::from("deployed db")),
                (String::from("web.isProvisioned"), String::from("deployed web")),
            ]
        );
    }

    #[tokio::test]
    async fn test_components_are_decorated() {
        let action = Arc::new(ScriptedAction::default());
        let stage = stage(Arc::new(DependencyPlanner::default()), action.clone());
        let mut data = StageData::new(pattern(PATTERN));

        let _ = stage.run(&mut data, None).await;

        let seen = action.seen.lock().await;
        let api = seen
            .iter()
            .find(|pair| pair.component.display_name == "api")
            .unwrap();

        let annotations = api.component.configuration.get_string_map("annotations").unwrap();
        assert_eq!(annotations["team"], "payments");
        assert_eq!(annotations["example.io.name"], "shop");
        assert_eq!(
            annotations["example.io.id"],
            "6f1c3a56-3b7e-4f2b-9a53-6a2f2f0b8d11"
        );

        let labels = api.component.metadata.labels().unwrap();
        assert_eq!(labels[MANAGED_BY_LABEL], "tester");
        assert_eq!(labels[NAME_LABEL], "api");

        assert_eq!(api.hosts, HashSet::from([Connection::new("kubernetes", "kubernetes")]));
    }

    #[tokio::test]
    async fn test_failures_are_aggregated() {
        let action = Arc::new(ScriptedAction {
            failing: vec!["db", "web"],
            ..ScriptedAction::default()
        });
        let stage = stage(Arc::new(DependencyPlanner::default()), action.clone());
        let mut data = StageData::new(pattern(PATTERN));

        let outcome = stage.run(&mut data, None).await;

        assert_eq!(action.calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            data.results().await,
            vec![(String::from("api.isProvisioned"), String::from("deployed api"))]
        );

        let StageOutcome::Continue(Some(ProvisionError::Stage(StageError::Aggregate(messages)))) =
            outcome
        else {
            panic!("expected an aggregate error");
        };
        assert_eq!(messages.len(), 2);
        assert!(messages.iter().any(|m| m.contains("db refused")));
        assert!(messages.iter().any(|m| m.contains("web refused")));
    }

    #[tokio::test]
    async fn test_infeasible_plan_terminates_without_actions() {
        let action = Arc::new(ScriptedAction::default());
        let stage = stage(Arc::new(CyclicPlanner), action.clone());
        let mut data = StageData::new(pattern(PATTERN));

        let outcome = stage.run(&mut data, None).await;

        let StageOutcome::Terminate(err) = outcome else {
            panic!("expected termination");
        };
        assert_eq!(
            err.to_string(),
            "Planning error: infeasible execution: detected cycle in the plan"
        );
        assert!(err.is_fatal());
        assert_eq!(action.calls.load(Ordering::SeqCst), 0);
        assert!(data.results().await.is_empty());
    }

    struct PanickingAction;

    #[async_trait]
    impl ActionProvider for PanickingAction {
        async fn provision(&self, pair: CompConfigPair) -> Result<String> {
            if pair.component.display_name == "api" {
                panic!("action crashed");
            }
            Ok(String::from("ok"))
        }
    }

    #[tokio::test]
    async fn test_aborted_component_is_reported() {
        let stage = ProvisionStage::new(
            Arc::new(DependencyPlanner::new(4)),
            Arc::new(PanickingAction),
            Arc::new(StaticRegistry::default()),
            false,
        );
        let mut data = StageData::new(pattern(PATTERN));

        let outcome = stage.run(&mut data, None).await;

        let StageOutcome::Continue(Some(err)) = outcome else {
            panic!("expected an aggregate error");
        };
        assert!(err.to_string().contains("1 component(s) aborted"));
        assert_eq!(data.results().await.len(), 2);
    }

    #[tokio::test]
    async fn test_incoming_error_terminates() {
        let action = Arc::new(ScriptedAction::default());
        let stage = stage(Arc::new(DependencyPlanner::default()), action.clone());
        let mut data = StageData::new(pattern(PATTERN));

        let outcome = stage
            .run(&mut data, Some(ProvisionError::internal("earlier stage")))
            .await;

        assert!(matches!(outcome, StageOutcome::Terminate(ProvisionError::Internal(_))));
        assert_eq!(action.calls.load(Ordering::SeqCst), 0);
    }

    fn every_seventh(name: &str) -> bool {
        name.trim_start_matches('c')
            .parse::<usize>()
            .is_ok_and(|i| i % 7 == 0)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_writes_are_not_lost() {
        let mut yaml = String::from("name: wide\ncomponents:\n");
        for i in 0..500 {
            yaml.push_str(&format!(
                "  - displayName: c{i}\n    component: {{kind: ConfigMap, version: v1}}\n"
            ));
        }
        let action = Arc::new(ScriptedAction {
            fails_when: Some(every_seventh as fn(&str) -> bool),
            ..ScriptedAction::default()
        });
        let stage = stage(Arc::new(DependencyPlanner::new(64)), action.clone());
        let mut data = StageData::new(pattern(&yaml));

        let outcome = stage.run(&mut data, None).await;

        assert_eq!(action.calls.load(Ordering::SeqCst), 500);
        assert_eq!(data.results().await.len(), 428);
        let StageOutcome::Continue(Some(err)) = outcome else {
            panic!("expected an aggregate error");
        };
        assert_eq!(err.to_string().lines().count(), 72);
    }

    #[test]
    fn test_pattern_without_id_keeps_its_annotations() {
        let yaml = "name: shop\ncomponents: []\n";
        let first = additional_annotations(&pattern(yaml), "example.io");
        let second = additional_annotations(&pattern(yaml), "example.io");

        assert_eq!(first, second);
        let other = additional_annotations(&pattern("name: blog\n"), "example.io");
        assert_ne!(first["example.io.id"], other["example.io.id"]);
    }

    #[test]
    fn test_merge_annotations_is_idempotent() {
        let mut data = pattern(PATTERN);
        let extra = additional_annotations(&data, "example.io");
        let component = &mut data.components[1];

        merge_annotations(component, &extra);
        let once = component.configuration.clone();
        merge_annotations(component, &extra);

        assert_eq!(component.configuration, once);
    }

    #[test]
    fn test_merge_annotations_replaces_mistyped_entry() {
        let mut data = pattern(PATTERN);
        let extra = additional_annotations(&data, "example.io");
        let component = &mut data.components[0];
        component
            .configuration
            .insert("annotations", Value::String(String::from("oops")));

        merge_annotations(component, &extra);

        let annotations = component.configuration.get_string_map("annotations").unwrap();
        assert_eq!(annotations.len(), 2);
    }

    #[test]
    fn test_labels_keep_existing_entries() {
        let mut data = pattern(
            r"
name: p
components:
  - displayName: web
    component: {kind: Service, version: v1}
    metadata:
      labels:
        tier: frontend
",
        );
        let component = &mut data.components[0];

        assign_additional_labels(component, "patternctl");

        let labels = component.metadata.labels().unwrap();
        assert_eq!(labels["tier"], "frontend");
        assert_eq!(labels[NAME_LABEL], "web");
    }
}
