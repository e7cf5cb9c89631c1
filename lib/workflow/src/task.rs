//! Workflow tasks and the task-body contract.
//!
//! A task couples a workflow-unique id with an opaque body, a constraint
//! record, and optional free-form metadata consumed only by the observation
//! hook. Bodies are invoked by the scheduling loop with a [`TaskContext`]
//! exposing the spawn service and status queries.

use crate::constraints::TaskConstraints;
use crate::error::{RegistrationError, TaskError};
use crate::orchestrator::TaskContext;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use taskloom_core::TaskId;

/// User-supplied logic executed when a task is dispatched.
///
/// The returned value becomes the task's output and feeds downstream input
/// assembly; `None` contributes nothing downstream. Returning an error marks
/// the task as failed without aborting the workflow, except for
/// [`TaskError::Spawn`], which reports a workflow abort already in effect.
#[async_trait]
pub trait TaskRun: Send + Sync {
    /// Executes the task body.
    async fn run(&self, ctx: &mut TaskContext<'_>) -> Result<Option<JsonValue>, TaskError>;
}

/// Adapter implementing [`TaskRun`] for a plain function or closure.
pub struct TaskFn<F> {
    f: F,
}

impl<F> TaskFn<F>
where
    F: Fn(&mut TaskContext<'_>) -> Result<Option<JsonValue>, TaskError> + Send + Sync,
{
    /// Wraps the given function as a task body.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> TaskRun for TaskFn<F>
where
    F: Fn(&mut TaskContext<'_>) -> Result<Option<JsonValue>, TaskError> + Send + Sync,
{
    async fn run(&self, ctx: &mut TaskContext<'_>) -> Result<Option<JsonValue>, TaskError> {
        (self.f)(ctx)
    }
}

/// A workflow task.
///
/// Immutable once registered; the graph around it only changes through
/// `Workflow::add_task` and the orchestrator's spawn service.
#[derive(Clone)]
pub struct Task {
    id: TaskId,
    constraints: TaskConstraints,
    metadata: HashMap<String, JsonValue>,
    body: Arc<dyn TaskRun>,
}

impl Task {
    /// Creates a task with default (admit-everything) constraints.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is empty.
    pub fn new(id: impl Into<TaskId>, body: impl TaskRun + 'static) -> Result<Self, RegistrationError> {
        let id = id.into();
        if id.is_empty() {
            return Err(RegistrationError::EmptyTaskId);
        }
        Ok(Self {
            id,
            constraints: TaskConstraints::default(),
            metadata: HashMap::new(),
            body: Arc::new(body),
        })
    }

    /// Creates a task from a plain function or closure.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is empty.
    pub fn from_fn<F>(id: impl Into<TaskId>, f: F) -> Result<Self, RegistrationError>
    where
        F: Fn(&mut TaskContext<'_>) -> Result<Option<JsonValue>, TaskError>
            + Send
            + Sync
            + 'static,
    {
        Self::new(id, TaskFn::new(f))
    }

    /// Replaces the task's constraint record.
    #[must_use]
    pub fn with_constraints(mut self, constraints: TaskConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Returns the task id.
    #[must_use]
    pub fn id(&self) -> &TaskId {
        &self.id
    }

    /// Returns the task's constraint record.
    #[must_use]
    pub fn constraints(&self) -> &TaskConstraints {
        &self.constraints
    }

    /// Returns the task's metadata.
    #[must_use]
    pub fn metadata(&self) -> &HashMap<String, JsonValue> {
        &self.metadata
    }

    pub(crate) fn body(&self) -> Arc<dyn TaskRun> {
        Arc::clone(&self.body)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("constraints", &self.constraints)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::{EdgeRule, NodeRule, TaskConstraints};
    use serde_json::json;

    #[test]
    fn empty_id_is_rejected() {
        let result = Task::from_fn("", |_| Ok(None));
        assert!(matches!(result, Err(RegistrationError::EmptyTaskId)));
    }

    #[test]
    fn new_task_has_default_constraints() {
        let task = Task::from_fn("S1", |_| Ok(None)).unwrap();
        assert_eq!(task.id().as_str(), "S1");
        assert_eq!(task.constraints().max_spawn_count(), None);
        assert!(task.metadata().is_empty());
    }

    #[test]
    fn metadata_builder_accumulates_entries() {
        let task = Task::from_fn("MapReduceStarter", |_| Ok(None))
            .unwrap()
            .with_metadata("type", json!("map_reduce_starter"))
            .with_metadata("fanout", json!(6));

        assert_eq!(task.metadata()["type"], json!("map_reduce_starter"));
        assert_eq!(task.metadata()["fanout"], json!(6));
    }

    #[test]
    fn constraints_builder_replaces_record() {
        let constraints = TaskConstraints::new(
            Some(1),
            NodeRule::custom(["BranchA"]),
            NodeRule::allow_all(),
            EdgeRule::allow_all(),
            EdgeRule::allow_all(),
        )
        .unwrap();

        let task = Task::from_fn("BranchTask", |_| Ok(None))
            .unwrap()
            .with_constraints(constraints);
        assert_eq!(task.constraints().max_spawn_count(), Some(1));
    }

    #[test]
    fn debug_omits_body() {
        let task = Task::from_fn("S1", |_| Ok(None)).unwrap();
        let debug = format!("{task:?}");
        assert!(debug.contains("S1"));
        assert!(debug.contains(".."));
    }
}
