//! Observation events for external renderers and loggers.
//!
//! The orchestrator emits an [`ObservationEvent`] on every structural or
//! status change: workflow registration, task registration, dispatch,
//! completion, failure, spawn, edge addition, and abort. Each event carries a
//! read-only [`WorkflowSnapshot`] sufficient to draw the graph, annotate
//! per-task status/step/inputs/outputs, and render tentative nodes implied by
//! `custom` next-node policies.
//!
//! Observers subscribe through [`Observer`]; they must not mutate workflow
//! state.

use crate::constraints::Policy;
use crate::definition::Workflow;
use crate::state::{RunState, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use taskloom_core::{EventId, TaskId, WorkflowId};

/// The kind of change an observation event reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// A workflow was registered with the orchestrator.
    WorkflowRegistered,
    /// A statically-registered task was announced.
    TaskRegistered { task_id: TaskId },
    /// A task was handed to its body.
    TaskDispatched { task_id: TaskId },
    /// A task body returned normally.
    TaskCompleted { task_id: TaskId },
    /// A task body raised.
    TaskFailed { task_id: TaskId },
    /// A running task inserted a new task.
    TaskSpawned { creator: TaskId, task_id: TaskId },
    /// A dependency edge was added mid-run.
    EdgeAdded { parent: TaskId, child: TaskId },
    /// A spawn violation aborted the workflow.
    WorkflowAborted { reason: String },
}

/// A notification fired by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservationEvent {
    /// Unique id of this event.
    pub id: EventId,
    /// When the event was emitted.
    pub timestamp: DateTime<Utc>,
    /// The workflow the event belongs to.
    pub workflow_id: WorkflowId,
    /// What changed.
    pub kind: EventKind,
    /// The workflow as of this change.
    pub snapshot: WorkflowSnapshot,
}

impl ObservationEvent {
    pub(crate) fn new(workflow_id: WorkflowId, kind: EventKind, snapshot: WorkflowSnapshot) -> Self {
        Self {
            id: EventId::new(),
            timestamp: Utc::now(),
            workflow_id,
            kind,
            snapshot,
        }
    }
}

/// Read-only view of one task for renderers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    /// The task id.
    pub task_id: TaskId,
    /// Current status.
    pub status: TaskStatus,
    /// Step in which the task became ready, if assigned.
    pub execution_step: Option<u32>,
    /// Inputs recorded at dispatch time.
    pub inputs: Option<JsonValue>,
    /// Output recorded on completion.
    pub output: Option<JsonValue>,
    /// Successful spawns made by this task so far.
    pub spawn_count: u32,
    /// Free-form metadata supplied at task construction.
    pub metadata: HashMap<String, JsonValue>,
}

/// A node implied by a `custom` next-node policy but not yet materialized.
///
/// Renderers typically draw these dashed. `edge_admissible` reports whether
/// the owner's outgoing-edge policy would also admit the implied edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TentativeNode {
    /// The task whose next-node policy implies the node.
    pub source: TaskId,
    /// The implied (not yet registered) task id.
    pub task_id: TaskId,
    /// Whether `source -> task_id` would pass the source's outgoing-edge rule.
    pub edge_admissible: bool,
}

/// Read-only snapshot of a workflow and its execution state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSnapshot {
    /// The workflow id.
    pub workflow_id: WorkflowId,
    /// All registered tasks in insertion order.
    pub tasks: Vec<TaskSnapshot>,
    /// Dependency edges in insertion order.
    pub edges: Vec<(TaskId, TaskId)>,
    /// Display edges in insertion order (a superset of `edges`).
    pub visual_edges: Vec<(TaskId, TaskId)>,
    /// Nodes implied by `custom` next-node policies but not yet registered.
    pub tentative: Vec<TentativeNode>,
}

impl WorkflowSnapshot {
    /// Captures the current state of a workflow.
    pub(crate) fn capture(workflow: &Workflow, run: &RunState) -> Self {
        let tasks = workflow
            .graph()
            .tasks()
            .map(|task| {
                let state = run.task_state(task.id());
                TaskSnapshot {
                    task_id: task.id().clone(),
                    status: state.map_or(TaskStatus::Pending, |s| s.status()),
                    execution_step: state.and_then(|s| s.execution_step()),
                    inputs: state.and_then(|s| s.inputs().cloned()),
                    output: state.and_then(|s| s.output().cloned()),
                    spawn_count: state.map_or(0, |s| s.spawn_count()),
                    metadata: task.metadata().clone(),
                }
            })
            .collect();

        let mut tentative = Vec::new();
        for task in workflow.graph().tasks() {
            let next = task.constraints().next_nodes();
            if next.policy() != Policy::Custom {
                continue;
            }
            for candidate in next.nodes() {
                if workflow.graph().contains(candidate) {
                    continue;
                }
                tentative.push(TentativeNode {
                    source: task.id().clone(),
                    task_id: candidate.clone(),
                    edge_admissible: task
                        .constraints()
                        .outgoing_edges()
                        .admits(task.id(), candidate),
                });
            }
        }

        Self {
            workflow_id: workflow.id().clone(),
            tasks,
            edges: workflow.graph().edges().to_vec(),
            visual_edges: workflow.graph().visual_edges().to_vec(),
            tentative,
        }
    }
}

/// Receives observation events.
///
/// Implementations must treat the payload as read-only; the snapshot is a
/// copy, and mutating it has no effect on the orchestrator.
pub trait Observer: Send + Sync {
    /// Called after every structural or status change.
    fn on_event(&self, event: &ObservationEvent);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::{EdgeRule, NodeRule, TaskConstraints};
    use crate::task::Task;
    use serde_json::json;

    fn task(id: &str) -> Task {
        Task::from_fn(id, |_| Ok(None)).unwrap()
    }

    #[test]
    fn snapshot_captures_tasks_and_edges() {
        let mut workflow = Workflow::new("Demo1");
        workflow.add_task(task("S1"), &[]).unwrap();
        workflow
            .add_task(task("S2"), &[TaskId::from("S1")])
            .unwrap();

        let mut run = RunState::new();
        run.register_task(TaskId::from("S1"));
        run.register_task(TaskId::from("S2"));
        run.mark_running(&TaskId::from("S1"), json!([1, 2]));
        run.mark_done(&TaskId::from("S1"), Some(json!(103)));

        let snapshot = WorkflowSnapshot::capture(&workflow, &run);
        assert_eq!(snapshot.workflow_id.as_str(), "Demo1");
        assert_eq!(snapshot.tasks.len(), 2);
        assert_eq!(snapshot.tasks[0].task_id.as_str(), "S1");
        assert_eq!(snapshot.tasks[0].status, TaskStatus::Done);
        assert_eq!(snapshot.tasks[0].output, Some(json!(103)));
        assert_eq!(snapshot.tasks[1].status, TaskStatus::Pending);
        assert_eq!(
            snapshot.edges,
            vec![(TaskId::from("S1"), TaskId::from("S2"))]
        );
    }

    #[test]
    fn snapshot_lists_tentative_nodes_with_edge_admissibility() {
        let branch = task("BranchTask").with_constraints(
            TaskConstraints::new(
                Some(1),
                NodeRule::custom(["BranchA", "BranchB", "BranchC"]),
                NodeRule::allow_all(),
                EdgeRule::allow_all(),
                EdgeRule::custom([("BranchTask", "BranchA"), ("BranchTask", "BranchB")]),
            )
            .unwrap(),
        );

        let mut workflow = Workflow::new("Demo2");
        workflow.add_task(branch, &[]).unwrap();
        let mut run = RunState::new();
        run.register_task(TaskId::from("BranchTask"));

        let snapshot = WorkflowSnapshot::capture(&workflow, &run);
        assert_eq!(snapshot.tentative.len(), 3);

        let branch_a = snapshot
            .tentative
            .iter()
            .find(|t| t.task_id.as_str() == "BranchA")
            .unwrap();
        assert!(branch_a.edge_admissible);

        // BranchC is implied by the node policy but its edge is not admitted.
        let branch_c = snapshot
            .tentative
            .iter()
            .find(|t| t.task_id.as_str() == "BranchC")
            .unwrap();
        assert!(!branch_c.edge_admissible);
    }

    #[test]
    fn materialized_nodes_are_not_tentative() {
        let branch = task("BranchTask").with_constraints(
            TaskConstraints::new(
                None,
                NodeRule::custom(["Next"]),
                NodeRule::allow_all(),
                EdgeRule::allow_all(),
                EdgeRule::allow_all(),
            )
            .unwrap(),
        );

        let mut workflow = Workflow::new("Demo2");
        workflow.add_task(branch, &[]).unwrap();
        workflow.add_task(task("Next"), &[]).unwrap();
        let run = RunState::new();

        let snapshot = WorkflowSnapshot::capture(&workflow, &run);
        assert!(snapshot.tentative.is_empty());
    }

    #[test]
    fn event_kind_serde_uses_snake_case_tags() {
        let kind = EventKind::TaskSpawned {
            creator: TaskId::from("MapReduceStarter"),
            task_id: TaskId::from("Map_1"),
        };
        let json = serde_json::to_string(&kind).expect("serialize");
        assert!(json.contains("\"task_spawned\""));
        let parsed: EventKind = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(kind, parsed);
    }
}
