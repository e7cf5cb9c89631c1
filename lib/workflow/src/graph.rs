//! Task and edge storage for a workflow.
//!
//! Tasks are kept in insertion order (iteration order is load-bearing for
//! deterministic scheduling) with an id-to-index map for O(1) lookup. Edges
//! are ordered `(parent, child)` pairs: `edges` impose scheduling
//! dependencies and their insertion order drives input assembly;
//! `visual_edges` is a superset carrying additional display-only
//! relationships for observers.
//!
//! Acyclicity is checked by materializing the dependency edges into a
//! petgraph `DiGraph`.

use crate::task::Task;
use petgraph::graph::DiGraph;
use std::collections::HashMap;
use taskloom_core::TaskId;

/// Insertion-ordered storage for a workflow's tasks and edges.
#[derive(Debug, Clone, Default)]
pub struct TaskGraph {
    tasks: Vec<Task>,
    index: HashMap<TaskId, usize>,
    edges: Vec<(TaskId, TaskId)>,
    visual_edges: Vec<(TaskId, TaskId)>,
}

impl TaskGraph {
    /// Creates a new empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if a task with the given id is registered.
    #[must_use]
    pub fn contains(&self, id: &TaskId) -> bool {
        self.index.contains_key(id)
    }

    /// Returns the task with the given id, if any.
    #[must_use]
    pub fn task(&self, id: &TaskId) -> Option<&Task> {
        self.index.get(id).map(|&i| &self.tasks[i])
    }

    /// Returns all tasks in insertion order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }

    /// Returns all task ids in insertion order.
    pub fn task_ids(&self) -> impl Iterator<Item = &TaskId> {
        self.tasks.iter().map(Task::id)
    }

    /// Returns the number of registered tasks.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Returns the dependency edges in insertion order.
    #[must_use]
    pub fn edges(&self) -> &[(TaskId, TaskId)] {
        &self.edges
    }

    /// Returns the display edges in insertion order.
    #[must_use]
    pub fn visual_edges(&self) -> &[(TaskId, TaskId)] {
        &self.visual_edges
    }

    /// Inserts a task. The caller has already checked for duplicates.
    pub(crate) fn insert_task(&mut self, task: Task) {
        self.index.insert(task.id().clone(), self.tasks.len());
        self.tasks.push(task);
    }

    /// Appends a dependency edge, mirrored into the display edges.
    pub(crate) fn push_dependency_edge(&mut self, parent: TaskId, child: TaskId) {
        self.edges.push((parent.clone(), child.clone()));
        self.visual_edges.push((parent, child));
    }

    /// Appends a display-only edge.
    pub(crate) fn push_visual_edge(&mut self, parent: TaskId, child: TaskId) {
        self.visual_edges.push((parent, child));
    }

    /// Returns the ids of tasks with no incoming dependency edge, in task
    /// insertion order.
    #[must_use]
    pub fn roots(&self) -> Vec<&TaskId> {
        self.tasks
            .iter()
            .map(Task::id)
            .filter(|id| !self.has_incoming_edge(id))
            .collect()
    }

    /// Returns true if any dependency edge ends at the given task.
    #[must_use]
    pub fn has_incoming_edge(&self, id: &TaskId) -> bool {
        self.edges.iter().any(|(_, child)| child == id)
    }

    /// Returns the predecessors of a task in edge-insertion order.
    #[must_use]
    pub fn predecessors_of(&self, id: &TaskId) -> Vec<&TaskId> {
        self.edges
            .iter()
            .filter(|(_, child)| child == id)
            .map(|(parent, _)| parent)
            .collect()
    }

    /// Returns true if the dependency graph contains no cycle.
    #[must_use]
    pub fn is_acyclic(&self) -> bool {
        let mut graph = DiGraph::<(), ()>::new();
        let mut indices = HashMap::with_capacity(self.tasks.len());
        for task in &self.tasks {
            indices.insert(task.id(), graph.add_node(()));
        }
        for (parent, child) in &self.edges {
            if let (Some(&p), Some(&c)) = (indices.get(parent), indices.get(child)) {
                graph.add_edge(p, c, ());
            }
        }
        !petgraph::algo::is_cyclic_directed(&graph)
    }
}
