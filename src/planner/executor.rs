//! Wave-by-wave execution of dependency plans.
//!
//! Components of one wave run concurrently on a `JoinSet`, bounded by a
//! semaphore. The next wave starts once the current one has finished.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn, Instrument, Span};

use crate::config::ComponentDefinition;

use super::plan::{ComponentCallback, ExecutionSummary, Plan};

/// Plan produced by the dependency planner.
#[derive(Debug, Clone)]
pub struct DependencyPlan {
    /// Components grouped by wave; `None` if the graph is cyclic.
    waves: Option<Vec<Vec<ComponentDefinition>>>,
    /// Maximum callbacks in flight.
    max_concurrency: usize,
}

impl DependencyPlan {
    /// Creates a plan from precomputed waves.
    #[must_use]
    pub fn new(waves: Option<Vec<Vec<ComponentDefinition>>>, max_concurrency: usize) -> Self {
        Self {
            waves,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Returns the number of components in the plan.
    #[must_use]
    pub fn component_count(&self) -> usize {
        self.waves
            .as_ref()
            .map_or(0, |waves| waves.iter().map(Vec::len).sum())
    }

    /// Executes a single wave and returns `(succeeded, failed)`.
    async fn execute_wave(
        wave: &[ComponentDefinition],
        callback: &ComponentCallback,
        semaphore: &Arc<Semaphore>,
        span: &Span,
    ) -> (usize, usize) {
        let mut join_set = JoinSet::new();

        for component in wave {
            let name = component.display_name.clone();
            let component = component.clone();
            let callback = Arc::clone(callback);
            let semaphore = Arc::clone(semaphore);

            join_set.spawn(
                async move {
                    let Ok(_permit) = semaphore.acquire_owned().await else {
                        error!("Concurrency limiter closed before '{name}' could run");
                        return false;
                    };
                    let succeeded = callback(name.clone(), component).await;
                    if !succeeded {
                        warn!("Component '{name}' failed");
                    }
                    succeeded
                }
                .instrument(span.clone()),
            );
        }

        let mut succeeded = 0;
        let mut failed = 0;
        while let Some(join_result) = join_set.join_next().await {
            match join_result {
                Ok(true) => succeeded += 1,
                Ok(false) => failed += 1,
                Err(e) => {
                    error!("Component task panicked: {e}");
                    failed += 1;
                }
            }
        }

        (succeeded, failed)
    }
}

#[async_trait]
impl Plan for DependencyPlan {
    fn is_feasible(&self) -> bool {
        self.waves.is_some()
    }

    async fn execute(&self, callback: ComponentCallback, span: Span) -> ExecutionSummary {
        let mut summary = ExecutionSummary::default();

        let Some(waves) = &self.waves else {
            warn!("Refusing to execute an infeasible plan");
            return summary;
        };

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        info!("Executing plan with {} components", self.component_count());

        for (i, wave) in waves.iter().enumerate() {
            let (succeeded, failed) = Self::execute_wave(wave, &callback, &semaphore, &span).await;

            summary.attempted += wave.len();
            summary.succeeded += succeeded;
            summary.failed += failed;

            if failed > 0 {
                // Later waves still run; their dependencies may be partially missing.
                warn!("Wave {i}: {failed} of {} components failed", wave.len());
            }
        }

        info!("{summary}");
        summary
    }
}
