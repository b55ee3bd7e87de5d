//! Plan and planner capabilities.
//!
//! The provisioning stage only relies on these traits: a planner turns a
//! pattern into a plan, and a plan reports feasibility and runs a callback
//! once per component.

use async_trait::async_trait;
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::Span;

use crate::config::{ComponentDefinition, PatternFile};
use crate::error::Result;

/// Future returned by a component callback; resolves to `true` on success.
pub type ComponentFuture = Pin<Box<dyn Future<Output = bool> + Send>>;

/// Callback invoked once per scheduled component with its name.
///
/// It may be called from several tasks at the same time.
pub type ComponentCallback =
    Arc<dyn Fn(String, ComponentDefinition) -> ComponentFuture + Send + Sync>;

/// An executable, dependency-ordered provisioning plan.
#[async_trait]
pub trait Plan: Send + Sync {
    /// Returns false when the plan cannot be executed (dependency cycle).
    fn is_feasible(&self) -> bool;

    /// Runs `callback` for every component, instrumenting work with `span`.
    ///
    /// Returns once every component has been attempted; a failing component
    /// does not stop the others.
    async fn execute(&self, callback: ComponentCallback, span: Span) -> ExecutionSummary;
}

/// Builds plans for patterns.
pub trait Planner: Send + Sync {
    /// Creates a plan for the given pattern.
    ///
    /// # Errors
    ///
    /// Returns an error if the plan cannot be built.
    fn create_plan(&self, pattern: &PatternFile, is_delete: bool) -> Result<Box<dyn Plan>>;
}

/// Counts of an executed plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionSummary {
    /// Components whose callback was invoked.
    pub attempted: usize,
    /// Callbacks that returned true.
    pub succeeded: usize,
    /// Callbacks that returned false or panicked.
    pub failed: usize,
}

impl ExecutionSummary {
    /// Returns true if every attempted component succeeded.
    #[must_use]
    pub const fn all_successful(&self) -> bool {
        self.failed == 0
    }
}

impl std::fmt::Display for ExecutionSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Executed {} components: {} successful, {} failed",
            self.attempted, self.succeeded, self.failed
        )
    }
}
