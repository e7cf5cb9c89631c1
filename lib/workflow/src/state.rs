//! Per-workflow execution state.
//!
//! The orchestrator owns one [`RunState`] per registered workflow: a record
//! per task (status, inputs, output, spawn count, execution step), the FIFO
//! ready queue, the running-loop flag, and the abort record a spawn violation
//! leaves behind for the scheduling loop to observe.
//!
//! Terminal statuses are sticky: once a task is done or failed no transition
//! changes it again.

use crate::error::SpawnError;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{HashMap, VecDeque};
use taskloom_core::TaskId;

/// Execution status of a task within a running workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting for predecessors, or not yet discovered.
    Pending,
    /// The task body is executing.
    Running,
    /// The body returned normally; the output is recorded.
    Done,
    /// The body raised, or the workflow was aborted before the task ran.
    Failed,
}

impl TaskStatus {
    /// Returns true if this is a terminal status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// Execution record for a single task.
#[derive(Debug, Clone)]
pub struct TaskState {
    status: TaskStatus,
    inputs: Option<JsonValue>,
    output: Option<JsonValue>,
    spawn_count: u32,
    execution_step: Option<u32>,
    enqueued: bool,
}

impl TaskState {
    fn new() -> Self {
        Self {
            status: TaskStatus::Pending,
            inputs: None,
            output: None,
            spawn_count: 0,
            execution_step: None,
            enqueued: false,
        }
    }

    /// Returns the current status.
    #[must_use]
    pub fn status(&self) -> TaskStatus {
        self.status
    }

    /// Returns the inputs recorded at dispatch time.
    #[must_use]
    pub fn inputs(&self) -> Option<&JsonValue> {
        self.inputs.as_ref()
    }

    /// Returns the output recorded on completion.
    #[must_use]
    pub fn output(&self) -> Option<&JsonValue> {
        self.output.as_ref()
    }

    /// Returns how many tasks this task has successfully spawned.
    #[must_use]
    pub fn spawn_count(&self) -> u32 {
        self.spawn_count
    }

    /// Returns the logical step in which the task became ready, if assigned.
    #[must_use]
    pub fn execution_step(&self) -> Option<u32> {
        self.execution_step
    }

    pub(crate) fn is_enqueued(&self) -> bool {
        self.enqueued
    }

    fn start(&mut self, inputs: JsonValue) {
        if self.status == TaskStatus::Pending {
            self.status = TaskStatus::Running;
            self.inputs = Some(inputs);
        }
    }

    fn complete(&mut self, output: Option<JsonValue>) {
        if !self.status.is_terminal() {
            self.status = TaskStatus::Done;
            self.output = output;
        }
    }

    fn fail(&mut self) {
        if !self.status.is_terminal() {
            self.status = TaskStatus::Failed;
        }
    }
}

/// Mutable execution state for one registered workflow.
#[derive(Debug, Default)]
pub struct RunState {
    task_states: HashMap<TaskId, TaskState>,
    ready_queue: VecDeque<(TaskId, JsonValue)>,
    running: bool,
    aborted: Option<SpawnError>,
}

impl RunState {
    /// Creates empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a task in pending state with a zero spawn count.
    pub(crate) fn register_task(&mut self, id: TaskId) {
        self.task_states.entry(id).or_insert_with(TaskState::new);
    }

    /// Returns the execution record for a task, if registered.
    #[must_use]
    pub fn task_state(&self, id: &TaskId) -> Option<&TaskState> {
        self.task_states.get(id)
    }

    /// Returns true if every registered task is done or failed.
    #[must_use]
    pub fn all_terminal(&self) -> bool {
        self.task_states.values().all(|s| s.status.is_terminal())
    }

    /// Returns the highest assigned execution step, or 0 if none is assigned.
    #[must_use]
    pub fn max_step(&self) -> u32 {
        self.task_states
            .values()
            .filter_map(|s| s.execution_step)
            .max()
            .unwrap_or(0)
    }

    /// Returns true if the workflow's scheduling loop is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    pub(crate) fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    /// Returns the violation that aborted the workflow, if any.
    #[must_use]
    pub fn aborted(&self) -> Option<&SpawnError> {
        self.aborted.as_ref()
    }

    pub(crate) fn record_abort(&mut self, violation: SpawnError) {
        if self.aborted.is_none() {
            self.aborted = Some(violation);
        }
    }

    /// Enqueues a task with its assembled inputs and latches it so discovery
    /// does not enqueue it again.
    pub(crate) fn enqueue(&mut self, id: TaskId, inputs: JsonValue) {
        if let Some(state) = self.task_states.get_mut(&id) {
            state.enqueued = true;
        }
        self.ready_queue.push_back((id, inputs));
    }

    /// Pops the next ready task in FIFO order.
    pub(crate) fn pop_ready(&mut self) -> Option<(TaskId, JsonValue)> {
        self.ready_queue.pop_front()
    }

    pub(crate) fn clear_queue(&mut self) {
        self.ready_queue.clear();
    }

    pub(crate) fn assign_step(&mut self, id: &TaskId, step: u32) {
        if let Some(state) = self.task_states.get_mut(id) {
            state.execution_step = Some(step);
        }
    }

    pub(crate) fn mark_running(&mut self, id: &TaskId, inputs: JsonValue) {
        if let Some(state) = self.task_states.get_mut(id) {
            state.start(inputs);
        }
    }

    pub(crate) fn mark_done(&mut self, id: &TaskId, output: Option<JsonValue>) {
        if let Some(state) = self.task_states.get_mut(id) {
            state.complete(output);
        }
    }

    pub(crate) fn mark_failed(&mut self, id: &TaskId) {
        if let Some(state) = self.task_states.get_mut(id) {
            state.fail();
        }
    }

    pub(crate) fn record_spawn(&mut self, id: &TaskId) {
        if let Some(state) = self.task_states.get_mut(id) {
            state.spawn_count += 1;
        }
    }

    /// Fails every task that is not yet terminal. Used by the abort path.
    pub(crate) fn fail_all_nonterminal(&mut self) {
        for state in self.task_states.values_mut() {
            state.fail();
        }
    }
}
