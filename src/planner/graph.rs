//! Default planner based on `dependsOn` declarations.
//!
//! Components form a directed graph from dependency to dependent. The graph is
//! split into waves: every component in a wave only depends on components of
//! earlier waves.

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::config::{ComponentDefinition, PatternFile};
use crate::error::{PlanError, Result};

use super::executor::DependencyPlan;
use super::plan::{Plan, Planner};

/// Planner that orders components by their declared dependencies.
#[derive(Debug, Clone)]
pub struct DependencyPlanner {
    /// Upper bound of components running at the same time.
    max_concurrency: usize,
}

impl DependencyPlanner {
    /// Creates a planner with the given concurrency limit (at least one).
    #[must_use]
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Splits the components into dependency waves.
    ///
    /// Returns `Ok(None)` when the graph contains a cycle. For deletion the
    /// edges are reversed so dependents are removed first.
    ///
    /// # Errors
    ///
    /// Returns `PlanError::Creation` on duplicate component names.
    pub fn waves(
        pattern: &PatternFile,
        is_delete: bool,
    ) -> Result<Option<Vec<Vec<ComponentDefinition>>>> {
        let mut graph: DiGraph<usize, ()> = DiGraph::new();
        let mut nodes: HashMap<&str, NodeIndex> = HashMap::new();

        for (i, component) in pattern.components.iter().enumerate() {
            let idx = graph.add_node(i);
            if nodes.insert(component.display_name.as_str(), idx).is_some() {
                return Err(PlanError::Creation {
                    message: format!("duplicate component name '{}'", component.display_name),
                }
                .into());
            }
        }

        for component in &pattern.components {
            let dependent = nodes[component.display_name.as_str()];
            for dependency in &component.depends_on {
                let Some(&dependency_idx) = nodes.get(dependency.as_str()) else {
                    warn!(
                        "'{}' depends on '{dependency}' which is not part of the plan",
                        component.display_name
                    );
                    continue;
                };
                if is_delete {
                    graph.add_edge(dependent, dependency_idx, ());
                } else {
                    graph.add_edge(dependency_idx, dependent, ());
                }
            }
        }

        let mut in_degree: HashMap<NodeIndex, usize> = graph
            .node_indices()
            .map(|idx| (idx, graph.neighbors_directed(idx, Direction::Incoming).count()))
            .collect();
        let mut remaining: Vec<NodeIndex> = graph.node_indices().collect();
        let mut waves = Vec::new();

        while !remaining.is_empty() {
            let (ready, blocked): (Vec<NodeIndex>, Vec<NodeIndex>) = remaining
                .iter()
                .copied()
                .partition(|idx| in_degree.get(idx).copied().unwrap_or_default() == 0);

            if ready.is_empty() {
                debug!("{} components are part of a dependency cycle", blocked.len());
                return Ok(None);
            }

            for &idx in &ready {
                for neighbor in graph.neighbors_directed(idx, Direction::Outgoing) {
                    if let Some(degree) = in_degree.get_mut(&neighbor) {
                        *degree = degree.saturating_sub(1);
                    }
                }
            }

            waves.push(
                ready
                    .iter()
                    .map(|&idx| pattern.components[graph[idx]].clone())
                    .collect(),
            );
            remaining = blocked;
        }

        Ok(Some(waves))
    }
}

impl Default for DependencyPlanner {
    fn default() -> Self {
        Self::new(8)
    }
}

impl Planner for DependencyPlanner {
    fn create_plan(&self, pattern: &PatternFile, is_delete: bool) -> Result<Box<dyn Plan>> {
        let waves = Self::waves(pattern, is_delete)?;
        debug!(
            "Created plan for '{}' with {} waves",
            pattern.name,
            waves.as_ref().map_or(0, Vec::len)
        );
        Ok(Box::new(DependencyPlan::new(waves, self.max_concurrency)))
    }
}
