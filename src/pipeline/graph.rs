// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 gantry contributors

//! Dependency graph builder for pipeline tasks
//!
//! Builds a directed graph of task ids from declared dependencies and rejects
//! any edge whose insertion would close a cycle. An edge `from → to` means
//! "`from` depends on `to`". Edges are checked incrementally, in declaration
//! order: a rejected edge is never added and previously accepted edges are
//! retained. Graphs are always rebuilt from scratch for a pipeline version,
//! never mutated in place after registration.

use petgraph::algo::{has_path_connecting, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::HashMap;

use crate::errors::GantryError;
use crate::pipeline::Pipeline;

/// Validated task dependency graph
///
/// petgraph stores edges in both directions, which supplies the reverse
/// adjacency view (`dependents`) without a separate index.
pub struct PipelineGraph {
    graph: DiGraph<String, ()>,
    id_to_index: HashMap<String, NodeIndex>,
}

impl PipelineGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            id_to_index: HashMap::new(),
        }
    }

    /// Build and validate the graph for a pipeline version
    ///
    /// All tasks are inserted as nodes first, then every declared dependency
    /// edge in deterministic (sorted) order. Fails without partial effect on
    /// the pipeline: the caller must discard the graph on error.
    pub fn build(pipeline: &Pipeline) -> Result<Self, GantryError> {
        let mut graph = Self::new();

        for id in pipeline.task_ids() {
            graph.add_node(id)?;
        }

        for id in pipeline.task_ids() {
            let task = &pipeline.tasks[id];
            let mut parents: Vec<&str> = task.depends_on.keys().map(String::as_str).collect();
            parents.sort_unstable();

            for parent in parents {
                graph.add_edge(id, parent)?;
            }
        }

        Ok(graph)
    }

    /// Insert a task node
    pub fn add_node(&mut self, id: &str) -> Result<(), GantryError> {
        if self.id_to_index.contains_key(id) {
            return Err(GantryError::DuplicateTask { task: id.to_string() });
        }

        let index = self.graph.add_node(id.to_string());
        self.id_to_index.insert(id.to_string(), index);
        Ok(())
    }

    /// Insert a dependency edge `from → to` (`from` depends on `to`)
    ///
    /// Both endpoints must already be nodes. The edge is committed only if
    /// `to` cannot already reach `from`; otherwise `DependencyCycle` is
    /// returned and the graph is left exactly as it was.
    pub fn add_edge(&mut self, from: &str, to: &str) -> Result<(), GantryError> {
        let from_index = self.index_of(from)?;
        let to_index = self.index_of(to)?;

        // Covers from == to as well: every node reaches itself.
        if has_path_connecting(&self.graph, to_index, from_index, None) {
            return Err(GantryError::DependencyCycle {
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        self.graph.add_edge(from_index, to_index, ());
        Ok(())
    }

    /// Whether a task id is present in the graph
    pub fn exists(&self, id: &str) -> bool {
        self.id_to_index.contains_key(id)
    }

    /// Tasks `id` depends on, in declaration order
    pub fn dependencies(&self, id: &str) -> Result<Vec<String>, GantryError> {
        self.neighbors(id, Direction::Outgoing)
    }

    /// Tasks that depend on `id`, in declaration order
    pub fn dependents(&self, id: &str) -> Result<Vec<String>, GantryError> {
        self.neighbors(id, Direction::Incoming)
    }

    /// All task ids in the graph, sorted
    pub fn task_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.id_to_index.keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    /// Number of tasks
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Whether the graph has no tasks
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Re-check acyclicity of the whole graph
    ///
    /// Always succeeds for a graph built through `add_edge`, which rejects
    /// cycle-closing edges up front; re-validation never mutates the graph.
    pub fn validate(&self) -> Result<(), GantryError> {
        match toposort(&self.graph, None) {
            Ok(_) => Ok(()),
            Err(cycle) => {
                let id = self.graph[cycle.node_id()].clone();
                Err(GantryError::DependencyCycle { from: id.clone(), to: id })
            }
        }
    }

    fn index_of(&self, id: &str) -> Result<NodeIndex, GantryError> {
        self.id_to_index
            .get(id)
            .copied()
            .ok_or_else(|| GantryError::TaskNotFound { task: id.to_string() })
    }

    fn neighbors(&self, id: &str, direction: Direction) -> Result<Vec<String>, GantryError> {
        let index = self.index_of(id)?;
        // petgraph iterates neighbors most-recent-first; reverse to get
        // insertion order back.
        let mut ids: Vec<String> = self
            .graph
            .neighbors_directed(index, direction)
            .map(|n| self.graph[n].clone())
            .collect();
        ids.reverse();
        Ok(ids)
    }
}

impl Default for PipelineGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{Pipeline, RequiredParentStatus, Task};
    use std::collections::HashMap;

    fn make_pipeline(tasks: Vec<(&str, Vec<&str>)>) -> Pipeline {
        Pipeline {
            namespace: "default".into(),
            id: "test".into(),
            name: "test".into(),
            description: None,
            version: 1,
            parallelism: 0,
            tasks: tasks
                .into_iter()
                .map(|(id, deps)| {
                    (
                        id.to_string(),
                        Task {
                            id: id.into(),
                            description: None,
                            image: "noop:latest".into(),
                            variables: HashMap::new(),
                            depends_on: deps
                                .into_iter()
                                .map(|d| (d.to_string(), RequiredParentStatus::Any))
                                .collect(),
                        },
                    )
                })
                .collect(),
        }
    }

    #[test]
    fn test_linear_graph() {
        let pipeline = make_pipeline(vec![("a", vec![]), ("b", vec!["a"]), ("c", vec!["b"])]);

        let graph = PipelineGraph::build(&pipeline).unwrap();
        assert_eq!(graph.dependencies("c").unwrap(), vec!["b"]);
        assert_eq!(graph.dependents("a").unwrap(), vec!["b"]);
        assert!(graph.exists("b"));
        assert!(!graph.exists("z"));
    }

    #[test]
    fn test_cycle_rejected_and_prior_edges_retained() {
        let mut graph = PipelineGraph::new();
        for id in ["a", "b", "c"] {
            graph.add_node(id).unwrap();
        }

        // a depends on b, b depends on c; c depending on a closes the loop
        graph.add_edge("a", "b").unwrap();
        graph.add_edge("b", "c").unwrap();
        let err = graph.add_edge("c", "a").unwrap_err();
        assert!(matches!(err, GantryError::DependencyCycle { .. }));

        // The rejected edge was never committed
        assert_eq!(graph.dependents("a").unwrap(), Vec::<String>::new());
        assert_eq!(graph.dependencies("a").unwrap(), vec!["b"]);
        assert_eq!(graph.dependencies("b").unwrap(), vec!["c"]);
        graph.validate().unwrap();
    }

    #[test]
    fn test_self_dependency_rejected() {
        let mut graph = PipelineGraph::new();
        graph.add_node("a").unwrap();

        let err = graph.add_edge("a", "a").unwrap_err();
        assert!(matches!(err, GantryError::DependencyCycle { .. }));
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let mut graph = PipelineGraph::new();
        graph.add_node("a").unwrap();

        let err = graph.add_node("a").unwrap_err();
        assert!(matches!(err, GantryError::DuplicateTask { .. }));
    }

    #[test]
    fn test_edge_to_undeclared_node() {
        let mut graph = PipelineGraph::new();
        graph.add_node("a").unwrap();

        let err = graph.add_edge("a", "ghost").unwrap_err();
        assert!(matches!(err, GantryError::TaskNotFound { .. }));
    }

    #[test]
    fn test_diamond_dependents() {
        let pipeline = make_pipeline(vec![
            ("a", vec![]),
            ("b", vec!["a"]),
            ("c", vec!["a"]),
            ("d", vec!["b", "c"]),
        ]);

        let graph = PipelineGraph::build(&pipeline).unwrap();
        assert_eq!(graph.dependents("a").unwrap(), vec!["b", "c"]);
        assert_eq!(graph.dependencies("d").unwrap(), vec!["b", "c"]);
    }

    #[test]
    fn test_revalidation_is_idempotent() {
        let pipeline = make_pipeline(vec![("a", vec![]), ("b", vec!["a"])]);

        let graph = PipelineGraph::build(&pipeline).unwrap();
        for _ in 0..3 {
            graph.validate().unwrap();
        }
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn test_empty_pipeline_builds() {
        let pipeline = make_pipeline(vec![]);

        let graph = PipelineGraph::build(&pipeline).unwrap();
        assert!(graph.is_empty());
        graph.validate().unwrap();
    }
}
