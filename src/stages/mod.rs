//! Stage chain for provisioning requests.
//!
//! A request flows through a list of stages. Each stage receives the shared
//! [`StageData`] and the error left by the previous stage, and decides whether
//! the chain continues.

mod dry_run;
mod provision;
mod validate;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::config::PatternFile;
use crate::error::{ProvisionError, Result};

pub use dry_run::{DryRunStage, DRY_RUN_SUFFIX_KEY};
pub use provision::{
    additional_annotations, assign_additional_labels, filter_annotation_components,
    generate_hosts, merge_annotations, ProvisionStage, MANAGED_BY_LABEL, NAME_LABEL,
    PROVISION_SUFFIX_KEY,
};
pub use validate::ValidateStage;

/// Per-component results shared between concurrently running callbacks.
pub type ResultStore = Arc<Mutex<HashMap<String, String>>>;

/// Data threaded through the chain.
#[derive(Debug, Clone)]
pub struct StageData {
    /// Pattern being provisioned; stages may narrow its component list.
    pub pattern: PatternFile,
    /// Results keyed by `<component><suffix>`.
    pub other: ResultStore,
}

impl StageData {
    /// Creates stage data with an empty result store.
    #[must_use]
    pub fn new(pattern: PatternFile) -> Self {
        Self {
            pattern,
            other: ResultStore::default(),
        }
    }

    /// Returns a sorted copy of the result store.
    pub async fn results(&self) -> Vec<(String, String)> {
        let mut results: Vec<(String, String)> = self
            .other
            .lock()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        results.sort();
        results
    }
}

/// What a stage wants the chain to do next.
#[derive(Debug)]
pub enum StageOutcome {
    /// Run the next stage, handing over an optional (partial) error.
    Continue(Option<ProvisionError>),
    /// Stop the chain with a fatal error.
    Terminate(ProvisionError),
}

/// A single step of the chain.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Runs the stage.
    async fn run(&self, data: &mut StageData, error: Option<ProvisionError>) -> StageOutcome;
}

/// Ordered list of stages.
#[derive(Default)]
pub struct Chain {
    stages: Vec<Box<dyn Stage>>,
}

impl Chain {
    /// Creates an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a stage.
    #[must_use]
    pub fn add(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if the chain has no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Runs every stage in order.
    ///
    /// # Errors
    ///
    /// Returns the error of a terminating stage, or the error carried out of
    /// the last stage.
    pub async fn process(&self, data: &mut StageData) -> Result<()> {
        let mut carried: Option<ProvisionError> = None;

        for stage in &self.stages {
            debug!("Running stage {}", stage.name());
            match stage.run(data, carried.take()).await {
                StageOutcome::Continue(next) => carried = next,
                StageOutcome::Terminate(err) => {
                    error!("Stage {} terminated the chain: {err}", stage.name());
                    return Err(err);
                }
            }
        }

        carried.map_or(Ok(()), Err)
    }
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.stages.iter().map(|s| s.name()))
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::config::{ComponentDefinition, ConfigParser, PatternFile};

    pub fn pattern(yaml: &str) -> PatternFile {
        ConfigParser::parse_pattern(yaml, None).unwrap()
    }

    pub fn names(components: &[ComponentDefinition]) -> Vec<&str> {
        components.iter().map(|c| c.display_name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{PlanError, StageError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Recording {
        calls: Arc<AtomicUsize>,
        outcome: fn(Option<ProvisionError>) -> StageOutcome,
    }

    #[async_trait]
    impl Stage for Recording {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn run(&self, _data: &mut StageData, error: Option<ProvisionError>) -> StageOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.outcome)(error)
        }
    }

    fn data() -> StageData {
        StageData::new(test_support::pattern("name: empty\ncomponents: []\n"))
    }

    #[tokio::test]
    async fn test_terminate_stops_chain() {
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = Chain::new()
            .add(Recording {
                calls: calls.clone(),
                outcome: |_| StageOutcome::Terminate(PlanError::Infeasible.into()),
            })
            .add(Recording {
                calls: calls.clone(),
                outcome: StageOutcome::Continue,
            });

        let result = chain.process(&mut data()).await;

        assert!(matches!(result, Err(ProvisionError::Plan(PlanError::Infeasible))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_carried_error_reaches_next_stage_and_caller() {
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = Chain::new()
            .add(Recording {
                calls: calls.clone(),
                outcome: |_| {
                    StageOutcome::Continue(Some(
                        StageError::Aggregate(vec![String::from("partial")]).into(),
                    ))
                },
            })
            .add(Recording {
                calls: calls.clone(),
                outcome: StageOutcome::Continue,
            });

        let err = chain.process(&mut data()).await.unwrap_err();

        assert_eq!(err.to_string(), "partial");
        assert!(!err.is_fatal());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_empty_chain_succeeds() {
        let chain = Chain::new();
        assert!(chain.is_empty());
        assert!(chain.process(&mut data()).await.is_ok());
    }
}
