//! Workflow definition: a named, acyclic directed graph of tasks.
//!
//! Workflows are built by the developer ahead of registration: tasks are
//! added one at a time with their dependencies, each addition gated by the
//! endpoint policies and a whole-graph acyclicity re-check. There is no
//! ambient registry; a `Workflow` is a self-contained value handed to the
//! orchestrator.

use crate::error::RegistrationError;
use crate::graph::TaskGraph;
use crate::policy::{check_edge_policy, check_node_policy, EdgeDirection, NodeDirection};
use crate::task::Task;
use taskloom_core::{TaskId, WorkflowId};

/// A named workflow: tasks, dependency edges, and display edges.
#[derive(Debug, Clone)]
pub struct Workflow {
    id: WorkflowId,
    graph: TaskGraph,
}

impl Workflow {
    /// Creates a new empty workflow.
    #[must_use]
    pub fn new(id: impl Into<WorkflowId>) -> Self {
        Self {
            id: id.into(),
            graph: TaskGraph::new(),
        }
    }

    /// Returns the workflow id.
    #[must_use]
    pub fn id(&self) -> &WorkflowId {
        &self.id
    }

    /// Returns the workflow's task graph.
    #[must_use]
    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    pub(crate) fn graph_mut(&mut self) -> &mut TaskGraph {
        &mut self.graph
    }

    /// Registers a task, optionally depending on already-registered tasks.
    ///
    /// For each dependency `dep` (in order) the node policies of `dep` and
    /// the task are consulted, then the edge `dep -> task` is checked under
    /// both endpoint edge policies and appended to the dependency and display
    /// edges. The whole graph is re-checked for cycles afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error on a duplicate task id, an unregistered dependency, a
    /// policy rejection, or a dependency cycle. On error the workflow may
    /// hold a partial addition and should be discarded.
    pub fn add_task(
        &mut self,
        task: Task,
        dependencies: &[TaskId],
    ) -> Result<(), RegistrationError> {
        let task_id = task.id().clone();
        if self.graph.contains(&task_id) {
            return Err(RegistrationError::DuplicateTask { task_id });
        }

        self.graph.insert_task(task.clone());

        for dep in dependencies {
            let dep_task = self.graph.task(dep).ok_or_else(|| {
                RegistrationError::UnknownDependency {
                    task_id: task_id.clone(),
                    dependency: dep.clone(),
                }
            })?;

            check_node_policy(dep_task, &task, NodeDirection::Next)?;
            check_node_policy(dep_task, &task, NodeDirection::Previous)?;
            check_edge_policy(dep_task, &task, EdgeDirection::Outgoing)?;
            check_edge_policy(dep_task, &task, EdgeDirection::Incoming)?;

            self.graph
                .push_dependency_edge(dep.clone(), task_id.clone());
        }

        if !self.graph.is_acyclic() {
            return Err(RegistrationError::CycleDetected);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::{EdgeRule, NodeRule, TaskConstraints};

    fn task(id: &str) -> Task {
        Task::from_fn(id, |_| Ok(None)).unwrap()
    }

    fn deps(ids: &[&str]) -> Vec<TaskId> {
        ids.iter().map(|id| TaskId::from(*id)).collect()
    }

    #[test]
    fn add_task_records_edges_in_order() {
        let mut workflow = Workflow::new("Demo1");
        workflow.add_task(task("S1"), &[]).unwrap();
        workflow.add_task(task("S2"), &[]).unwrap();
        workflow.add_task(task("S3"), &deps(&["S1", "S2"])).unwrap();

        assert_eq!(
            workflow.graph().edges(),
            &[
                (TaskId::from("S1"), TaskId::from("S3")),
                (TaskId::from("S2"), TaskId::from("S3")),
            ]
        );
        // Dependency edges are mirrored into the display edges.
        assert_eq!(workflow.graph().visual_edges(), workflow.graph().edges());
    }

    #[test]
    fn duplicate_task_is_rejected() {
        let mut workflow = Workflow::new("Demo1");
        workflow.add_task(task("S1"), &[]).unwrap();

        let result = workflow.add_task(task("S1"), &[]);
        assert!(matches!(
            result,
            Err(RegistrationError::DuplicateTask { task_id }) if task_id.as_str() == "S1"
        ));
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let mut workflow = Workflow::new("Demo1");
        let result = workflow.add_task(task("S2"), &deps(&["S1"]));
        assert!(matches!(
            result,
            Err(RegistrationError::UnknownDependency { dependency, .. })
                if dependency.as_str() == "S1"
        ));
    }

    #[test]
    fn policy_rejection_blocks_static_edge() {
        let sealed = task("Sealed").with_constraints(
            TaskConstraints::new(
                None,
                NodeRule::allow_none(),
                NodeRule::allow_all(),
                EdgeRule::allow_all(),
                EdgeRule::allow_all(),
            )
            .unwrap(),
        );

        let mut workflow = Workflow::new("Demo1");
        workflow.add_task(sealed, &[]).unwrap();

        let result = workflow.add_task(task("Child"), &deps(&["Sealed"]));
        assert!(matches!(result, Err(RegistrationError::Policy(_))));
    }

    #[test]
    fn incoming_edge_policy_of_new_task_is_consulted() {
        let picky = task("Picky").with_constraints(
            TaskConstraints::new(
                None,
                NodeRule::allow_all(),
                NodeRule::allow_all(),
                EdgeRule::custom([("Expected", "Picky")]),
                EdgeRule::allow_all(),
            )
            .unwrap(),
        );

        let mut workflow = Workflow::new("Demo1");
        workflow.add_task(task("Other"), &[]).unwrap();
        let result = workflow.add_task(picky, &deps(&["Other"]));
        assert!(matches!(result, Err(RegistrationError::Policy(_))));
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let mut workflow = Workflow::new("Demo1");
        let result = workflow.add_task(task("A"), &deps(&["A"]));
        assert!(matches!(result, Err(RegistrationError::CycleDetected)));
    }

    #[test]
    fn diamond_is_acyclic() {
        let mut workflow = Workflow::new("Demo1");
        workflow.add_task(task("A"), &[]).unwrap();
        workflow.add_task(task("B"), &deps(&["A"])).unwrap();
        workflow.add_task(task("C"), &deps(&["A"])).unwrap();
        workflow.add_task(task("D"), &deps(&["B", "C"])).unwrap();

        assert_eq!(workflow.graph().task_count(), 4);
        assert!(workflow.graph().is_acyclic());
    }
}
