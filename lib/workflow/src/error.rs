//! Error types for the workflow crate.
//!
//! The taxonomy follows the lifecycle of a workflow:
//! - `ConstraintError`: malformed constraint records, caught at construction
//! - `RegistrationError`: static `add_task` failures (the workflow is discarded)
//! - `PolicyViolation`: a node or edge candidate rejected by a policy
//! - `TaskError`: a task body failed at runtime (the single task fails)
//! - `SpawnError`: a mid-run spawn violated a constraint (the workflow aborts)
//! - `OrchestratorError`: workflow-level operations on the orchestrator

use crate::constraints::{ConstraintField, Policy};
use crate::policy::{EdgeDirection, NodeDirection};
use std::fmt;
use taskloom_core::{TaskId, WorkflowId};

/// Errors from constraint-record construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstraintError {
    /// An `allow_none` policy was given a non-empty candidate list.
    AllowNoneWithCandidates { field: ConstraintField },
    /// A `custom` policy was given an empty candidate list.
    CustomWithoutCandidates { field: ConstraintField },
}

impl fmt::Display for ConstraintError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllowNoneWithCandidates { field } => {
                write!(f, "allow_none policy for {field} cannot take a candidate list")
            }
            Self::CustomWithoutCandidates { field } => {
                write!(f, "custom policy for {field} requires a non-empty candidate list")
            }
        }
    }
}

impl std::error::Error for ConstraintError {}

/// A node or edge candidate rejected by a task's policy.
///
/// Carries the offending ids, the consulted direction, and the policy that
/// rejected the candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyViolation {
    /// A node candidate was rejected.
    NodeRejected {
        /// The task whose policy was consulted.
        owner: TaskId,
        /// The rejected candidate.
        candidate: TaskId,
        direction: NodeDirection,
        policy: Policy,
    },
    /// An edge candidate was rejected.
    EdgeRejected {
        src: TaskId,
        dst: TaskId,
        /// The task whose policy was consulted (src for outgoing, dst for incoming).
        owner: TaskId,
        direction: EdgeDirection,
        policy: Policy,
    },
}

impl fmt::Display for PolicyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NodeRejected {
                owner,
                candidate,
                direction,
                policy,
            } => {
                write!(
                    f,
                    "task {candidate} rejected as {direction} node by policy of {owner} ({policy})"
                )
            }
            Self::EdgeRejected {
                src,
                dst,
                owner,
                direction,
                policy,
            } => {
                write!(
                    f,
                    "edge {src} -> {dst} rejected by {direction} edge policy of {owner} ({policy})"
                )
            }
        }
    }
}

impl std::error::Error for PolicyViolation {}

/// Errors from static workflow construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    /// Task ids must be non-empty strings.
    EmptyTaskId,
    /// A task with this id is already registered.
    DuplicateTask { task_id: TaskId },
    /// A declared dependency is not registered.
    UnknownDependency { task_id: TaskId, dependency: TaskId },
    /// A static edge was rejected by an endpoint policy.
    Policy(PolicyViolation),
    /// Adding the task introduced a dependency cycle.
    CycleDetected,
}

impl fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyTaskId => write!(f, "task id cannot be empty"),
            Self::DuplicateTask { task_id } => {
                write!(f, "task {task_id} is already registered")
            }
            Self::UnknownDependency { task_id, dependency } => {
                write!(f, "dependency {dependency} of task {task_id} is not registered")
            }
            Self::Policy(violation) => write!(f, "{violation}"),
            Self::CycleDetected => write!(f, "dependency cycle detected in workflow"),
        }
    }
}

impl std::error::Error for RegistrationError {}

impl From<PolicyViolation> for RegistrationError {
    fn from(violation: PolicyViolation) -> Self {
        Self::Policy(violation)
    }
}

/// Errors raised out of a task body.
///
/// A plain failure marks the single task as failed and the scheduling loop
/// continues. A `Spawn` failure means the whole workflow has already been
/// aborted; bodies propagate it with `?`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// The task body failed.
    Failed { message: String },
    /// A spawn attempt aborted the workflow.
    Spawn(SpawnError),
}

impl TaskError {
    /// Creates a task failure with the given message.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed { message } => write!(f, "task failed: {message}"),
            Self::Spawn(e) => write!(f, "spawn failed: {e}"),
        }
    }
}

impl std::error::Error for TaskError {}

impl From<SpawnError> for TaskError {
    fn from(e: SpawnError) -> Self {
        Self::Spawn(e)
    }
}

/// Errors from the mid-run spawn service.
///
/// Any of these aborts the owning workflow: the ready queue is emptied, every
/// non-terminal task is failed, and the violation is surfaced out of
/// `run_workflow`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpawnError {
    /// The target workflow is not registered.
    WorkflowNotFound { workflow_id: WorkflowId },
    /// The spawning task is not part of the workflow.
    CreatorNotFound { workflow_id: WorkflowId, creator: TaskId },
    /// The creator has exhausted its spawn quota.
    QuotaExceeded { creator: TaskId, max_spawn_count: u32 },
    /// The spawn was rejected by a node or edge policy.
    Policy(PolicyViolation),
    /// A task with the new task's id is already registered.
    DuplicateTask { task_id: TaskId },
    /// A requested edge touches neither the creator nor the new task.
    UnrelatedEdge { src: TaskId, dst: TaskId },
    /// A requested edge references an unregistered task.
    UnknownEdgeEndpoint { task_id: TaskId },
    /// The spawn would introduce a dependency cycle.
    CycleDetected,
}

impl fmt::Display for SpawnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WorkflowNotFound { workflow_id } => {
                write!(f, "workflow {workflow_id} is not registered")
            }
            Self::CreatorNotFound { workflow_id, creator } => {
                write!(f, "creator {creator} is not part of workflow {workflow_id}")
            }
            Self::QuotaExceeded {
                creator,
                max_spawn_count,
            } => {
                write!(
                    f,
                    "task {creator} exceeded its spawn quota of {max_spawn_count}"
                )
            }
            Self::Policy(violation) => write!(f, "{violation}"),
            Self::DuplicateTask { task_id } => {
                write!(f, "task {task_id} is already registered")
            }
            Self::UnrelatedEdge { src, dst } => {
                write!(
                    f,
                    "edge {src} -> {dst} is not related to the creator or the new task"
                )
            }
            Self::UnknownEdgeEndpoint { task_id } => {
                write!(f, "edge endpoint {task_id} is not registered")
            }
            Self::CycleDetected => write!(f, "spawn would introduce a dependency cycle"),
        }
    }
}

impl std::error::Error for SpawnError {}

impl From<PolicyViolation> for SpawnError {
    fn from(violation: PolicyViolation) -> Self {
        Self::Policy(violation)
    }
}

/// Errors from workflow-level orchestrator operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorError {
    /// The workflow is not registered.
    WorkflowNotFound { workflow_id: WorkflowId },
    /// A workflow with this id is already registered.
    AlreadyRegistered { workflow_id: WorkflowId },
    /// The workflow's scheduling loop is already running.
    AlreadyRunning { workflow_id: WorkflowId },
    /// The workflow was aborted by a spawn violation.
    Aborted {
        workflow_id: WorkflowId,
        violation: SpawnError,
    },
}

impl fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WorkflowNotFound { workflow_id } => {
                write!(f, "workflow {workflow_id} is not registered")
            }
            Self::AlreadyRegistered { workflow_id } => {
                write!(f, "workflow {workflow_id} is already registered")
            }
            Self::AlreadyRunning { workflow_id } => {
                write!(f, "workflow {workflow_id} is already running a scheduling loop")
            }
            Self::Aborted {
                workflow_id,
                violation,
            } => {
                write!(f, "workflow {workflow_id} aborted: {violation}")
            }
        }
    }
}

impl std::error::Error for OrchestratorError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constraint_error_display() {
        let err = ConstraintError::CustomWithoutCandidates {
            field: ConstraintField::NextNodes,
        };
        assert!(err.to_string().contains("custom policy"));
        assert!(err.to_string().contains("valid_next_nodes"));
    }

    #[test]
    fn policy_violation_display_carries_ids() {
        let err = PolicyViolation::NodeRejected {
            owner: TaskId::from("BranchTask"),
            candidate: TaskId::from("BranchC"),
            direction: NodeDirection::Next,
            policy: Policy::Custom,
        };
        let message = err.to_string();
        assert!(message.contains("BranchTask"));
        assert!(message.contains("BranchC"));
        assert!(message.contains("next"));
        assert!(message.contains("custom"));
    }

    #[test]
    fn spawn_error_display() {
        let err = SpawnError::QuotaExceeded {
            creator: TaskId::from("MapReduceStarter"),
            max_spawn_count: 8,
        };
        assert!(err.to_string().contains("spawn quota of 8"));
    }

    #[test]
    fn task_error_wraps_spawn_error() {
        let err = TaskError::from(SpawnError::CycleDetected);
        assert!(matches!(err, TaskError::Spawn(SpawnError::CycleDetected)));
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn orchestrator_error_display() {
        let err = OrchestratorError::AlreadyRunning {
            workflow_id: WorkflowId::from("Demo5"),
        };
        assert!(err.to_string().contains("already running"));
    }
}
