//! Planning module for provisioning requests.
//!
//! This module defines the plan capability consumed by the provisioning
//! stage and a default planner ordering components by their dependencies.

mod plan;
mod graph;
mod executor;

pub use plan::{ComponentCallback, ComponentFuture, ExecutionSummary, Plan, Planner};
pub use graph::DependencyPlanner;
pub use executor::DependencyPlan;
