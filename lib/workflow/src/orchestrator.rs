//! Workflow orchestrator: scheduling loop and spawn service.
//!
//! The orchestrator owns all mutable execution state. One workflow runs one
//! scheduling loop at a time:
//! 1. Discover newly-ready tasks (pending, all predecessors terminal),
//!    assemble their inputs from predecessor outputs, and enqueue them; tasks
//!    unblocked in the same pass share an execution step.
//! 2. Drain the FIFO queue, dispatching each task body on the loop's own
//!    flow of control.
//! 3. Exit once every task is terminal, otherwise sleep briefly and repeat.
//!
//! Task bodies receive a [`TaskContext`] through which they may spawn new
//! tasks and edges into the still-running graph. Spawns are fully gated:
//! quota, node policies, edge policies, and global acyclicity. Any violation
//! aborts the workflow atomically.

use crate::definition::Workflow;
use crate::error::{OrchestratorError, SpawnError};
use crate::events::{EventKind, ObservationEvent, Observer, WorkflowSnapshot};
use crate::policy::{check_edge_policy, check_node_policy, EdgeDirection, NodeDirection};
use crate::state::{RunState, TaskState, TaskStatus};
use crate::task::Task;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::time::Duration;
use taskloom_core::{TaskId, WorkflowId};

/// Default cooperative sleep between discovery passes.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A mid-run request to insert a new task into a workflow.
///
/// `edges` are dependency edges to add alongside the task; each must touch
/// the creator or the new task. `input` seeds the new task immediately if it
/// ends up with no incoming dependency edge. The display edge from the
/// creator to the new task is added unless suppressed.
#[derive(Clone)]
pub struct SpawnRequest {
    task: Task,
    edges: Vec<(TaskId, TaskId)>,
    input: Option<JsonValue>,
    skip_visual_edge: bool,
}

impl SpawnRequest {
    /// Creates a request to spawn the given task with no edges or input.
    #[must_use]
    pub fn new(task: Task) -> Self {
        Self {
            task,
            edges: Vec::new(),
            input: None,
            skip_visual_edge: false,
        }
    }

    /// Adds a dependency edge to create alongside the task.
    #[must_use]
    pub fn with_edge(mut self, src: impl Into<TaskId>, dst: impl Into<TaskId>) -> Self {
        self.edges.push((src.into(), dst.into()));
        self
    }

    /// Adds several dependency edges to create alongside the task.
    #[must_use]
    pub fn with_edges(mut self, edges: impl IntoIterator<Item = (TaskId, TaskId)>) -> Self {
        self.edges.extend(edges);
        self
    }

    /// Supplies input data for the new task if it becomes a root.
    #[must_use]
    pub fn with_input(mut self, input: JsonValue) -> Self {
        self.input = Some(input);
        self
    }

    /// Suppresses the creator-to-new-task display edge.
    #[must_use]
    pub fn without_visual_edge(mut self) -> Self {
        self.skip_visual_edge = true;
        self
    }
}

/// Status and result pair returned by `check_task_status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatusReport {
    /// The task's current status.
    pub status: TaskStatus,
    /// The task's output, present once the task is done.
    pub result: Option<JsonValue>,
}

/// Handle passed to task bodies.
///
/// Exposes the running task's identity and inputs, the spawn service, and
/// status queries. Spawn calls are serialized with the scheduling loop: the
/// body runs on the loop's own flow of control.
pub struct TaskContext<'a> {
    workflow_id: WorkflowId,
    task_id: TaskId,
    inputs: JsonValue,
    orchestrator: &'a mut Orchestrator,
}

impl TaskContext<'_> {
    /// Returns the id of the workflow being run.
    #[must_use]
    pub fn workflow_id(&self) -> &WorkflowId {
        &self.workflow_id
    }

    /// Returns the id of the running task.
    #[must_use]
    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// Returns the inputs delivered to the running task.
    #[must_use]
    pub fn inputs(&self) -> &JsonValue {
        &self.inputs
    }

    /// Spawns a new task into the running workflow.
    ///
    /// # Errors
    ///
    /// Returns the violation if the spawn is inadmissible; the workflow has
    /// then already been aborted and the error should be propagated.
    pub fn spawn_task(&mut self, request: SpawnRequest) -> Result<(), SpawnError> {
        let workflow_id = self.workflow_id.clone();
        let creator = self.task_id.clone();
        self.orchestrator.spawn_task(&workflow_id, &creator, request)
    }

    /// Returns the status of another task in the running workflow.
    #[must_use]
    pub fn task_status(&self, task_id: &TaskId) -> Option<TaskStatusReport> {
        self.orchestrator
            .check_task_status(&self.workflow_id, task_id)
    }
}

/// Stores workflows, runs them, schedules at runtime, and gates every spawn.
pub struct Orchestrator {
    workflows: HashMap<WorkflowId, Workflow>,
    runs: HashMap<WorkflowId, RunState>,
    observers: Vec<Box<dyn Observer>>,
    poll_interval: Duration,
}

impl Orchestrator {
    /// Creates an orchestrator with the default poll interval.
    #[must_use]
    pub fn new() -> Self {
        Self {
            workflows: HashMap::new(),
            runs: HashMap::new(),
            observers: Vec::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Overrides the cooperative sleep between discovery passes.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Subscribes an observer to all observation events.
    pub fn add_observer(&mut self, observer: impl Observer + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Returns a registered workflow.
    #[must_use]
    pub fn workflow(&self, workflow_id: &WorkflowId) -> Option<&Workflow> {
        self.workflows.get(workflow_id)
    }

    /// Returns the execution state of a registered workflow.
    #[must_use]
    pub fn run_state(&self, workflow_id: &WorkflowId) -> Option<&RunState> {
        self.runs.get(workflow_id)
    }

    /// Registers a workflow and initializes its execution state.
    ///
    /// Observers receive a `WorkflowRegistered` event followed by a replay of
    /// the static structure (`TaskRegistered` per task, `EdgeAdded` per
    /// dependency edge).
    ///
    /// # Errors
    ///
    /// Returns an error if a workflow with the same id is already registered.
    pub fn register_workflow(&mut self, workflow: Workflow) -> Result<(), OrchestratorError> {
        let workflow_id = workflow.id().clone();
        if self.workflows.contains_key(&workflow_id) {
            return Err(OrchestratorError::AlreadyRegistered { workflow_id });
        }

        let mut run = RunState::new();
        for task in workflow.graph().tasks() {
            run.register_task(task.id().clone());
        }
        let task_ids: Vec<TaskId> = workflow.graph().task_ids().cloned().collect();
        let edges: Vec<(TaskId, TaskId)> = workflow.graph().edges().to_vec();

        tracing::info!(
            workflow_id = %workflow_id,
            tasks = task_ids.len(),
            edges = edges.len(),
            "registered workflow"
        );

        self.workflows.insert(workflow_id.clone(), workflow);
        self.runs.insert(workflow_id.clone(), run);

        self.emit(&workflow_id, EventKind::WorkflowRegistered);
        for task_id in task_ids {
            self.emit(&workflow_id, EventKind::TaskRegistered { task_id });
        }
        for (parent, child) in edges {
            self.emit(&workflow_id, EventKind::EdgeAdded { parent, child });
        }
        Ok(())
    }

    /// Runs a workflow to completion.
    ///
    /// `input_map` supplies the initial input per root task; roots without an
    /// entry receive an empty sequence. Returns once every task is terminal.
    ///
    /// # Errors
    ///
    /// Returns an error if the workflow is unknown, its loop is already
    /// running, or a spawn violation aborted the run.
    pub async fn run_workflow(
        &mut self,
        workflow_id: &WorkflowId,
        input_map: HashMap<TaskId, JsonValue>,
    ) -> Result<(), OrchestratorError> {
        let mut input_map = input_map;

        if !self.workflows.contains_key(workflow_id) {
            return Err(OrchestratorError::WorkflowNotFound {
                workflow_id: workflow_id.clone(),
            });
        }
        {
            let run = self.run_mut(workflow_id)?;
            if run.is_running() {
                return Err(OrchestratorError::AlreadyRunning {
                    workflow_id: workflow_id.clone(),
                });
            }
            run.set_running(true);
        }

        // Seed the current roots; they share execution step 1.
        let roots: Vec<TaskId> = self
            .workflow_ref(workflow_id)?
            .graph()
            .roots()
            .into_iter()
            .cloned()
            .collect();
        {
            let run = self.run_mut(workflow_id)?;
            for root in roots {
                let inputs = input_map
                    .remove(&root)
                    .unwrap_or_else(|| JsonValue::Array(Vec::new()));
                run.assign_step(&root, 1);
                run.enqueue(root, inputs);
            }
        }

        tracing::info!(workflow_id = %workflow_id, "running workflow");

        loop {
            self.discover_ready(workflow_id)?;
            self.drain_queue(workflow_id).await?;

            let run = self.run_mut(workflow_id)?;
            if let Some(violation) = run.aborted().cloned() {
                run.set_running(false);
                return Err(OrchestratorError::Aborted {
                    workflow_id: workflow_id.clone(),
                    violation,
                });
            }
            if run.all_terminal() {
                break;
            }
            tokio::time::sleep(self.poll_interval).await;
        }

        self.run_mut(workflow_id)?.set_running(false);
        tracing::info!(workflow_id = %workflow_id, "all tasks terminal, exiting loop");
        Ok(())
    }

    /// Returns the status (and result, once done) of a task.
    ///
    /// Safe to call at any time; returns `None` for unknown workflows or
    /// tasks.
    #[must_use]
    pub fn check_task_status(
        &self,
        workflow_id: &WorkflowId,
        task_id: &TaskId,
    ) -> Option<TaskStatusReport> {
        let state = self.runs.get(workflow_id)?.task_state(task_id)?;
        let result = if state.status() == TaskStatus::Done {
            state.output().cloned()
        } else {
            None
        };
        Some(TaskStatusReport {
            status: state.status(),
            result,
        })
    }

    /// Records a task's successful completion.
    ///
    /// Called by the dispatcher on normal body return; exposed for custom
    /// dispatchers. A no-op once the task is terminal.
    ///
    /// # Errors
    ///
    /// Returns an error if the workflow is unknown.
    pub fn complete_task(
        &mut self,
        workflow_id: &WorkflowId,
        task_id: &TaskId,
        result: Option<JsonValue>,
    ) -> Result<(), OrchestratorError> {
        let run = self.run_mut(workflow_id)?;
        let Some(state) = run.task_state(task_id) else {
            return Ok(());
        };
        if state.status().is_terminal() {
            return Ok(());
        }
        run.mark_done(task_id, result);
        tracing::info!(workflow_id = %workflow_id, task_id = %task_id, "task completed");
        self.emit(workflow_id, EventKind::TaskCompleted {
            task_id: task_id.clone(),
        });
        Ok(())
    }

    /// Inserts a new task (and optional edges) into a running workflow.
    ///
    /// Preconditions are checked in order: creator registered, spawn quota,
    /// node policies for creator and new task, unique id, per-edge
    /// relatedness and edge policies, and global acyclicity. If the new task
    /// has input data and no incoming dependency edge after insertion it is
    /// enqueued immediately as a root of the post-mutation graph.
    ///
    /// # Errors
    ///
    /// Any violation aborts the workflow: the ready queue is emptied, every
    /// non-terminal task is failed, and the violation is returned (and later
    /// surfaced out of `run_workflow`).
    pub fn spawn_task(
        &mut self,
        workflow_id: &WorkflowId,
        creator: &TaskId,
        request: SpawnRequest,
    ) -> Result<(), SpawnError> {
        let SpawnRequest {
            task: new_task,
            edges: new_edges,
            input,
            skip_visual_edge,
        } = request;

        if !self.workflows.contains_key(workflow_id) {
            return Err(SpawnError::WorkflowNotFound {
                workflow_id: workflow_id.clone(),
            });
        }

        // An aborted workflow accepts no further mutation.
        if let Some(run) = self.runs.get(workflow_id)
            && let Some(violation) = run.aborted()
        {
            return Err(violation.clone());
        }

        if let Some(violation) = self.validate_spawn(workflow_id, creator, &new_task) {
            return Err(self.abort_workflow(workflow_id, violation));
        }

        let new_id = new_task.id().clone();

        if let Some(workflow) = self.workflows.get_mut(workflow_id) {
            workflow.graph_mut().insert_task(new_task);
        }

        if let Some(run) = self.runs.get_mut(workflow_id) {
            run.register_task(new_id.clone());
            run.record_spawn(creator);
            // Provisional step; discovery overwrites it if the task is still
            // waiting for a pass when it becomes ready.
            let creator_step = run
                .task_state(creator)
                .and_then(TaskState::execution_step)
                .unwrap_or(0);
            run.assign_step(&new_id, creator_step + 1);
        }

        if !skip_visual_edge
            && let Some(workflow) = self.workflows.get_mut(workflow_id)
        {
            workflow
                .graph_mut()
                .push_visual_edge(creator.clone(), new_id.clone());
        }

        for (src, dst) in &new_edges {
            if src != creator && src != &new_id && dst != creator && dst != &new_id {
                let violation = SpawnError::UnrelatedEdge {
                    src: src.clone(),
                    dst: dst.clone(),
                };
                return Err(self.abort_workflow(workflow_id, violation));
            }
            if let Err(violation) = self.check_spawn_edge(workflow_id, src, dst) {
                return Err(self.abort_workflow(workflow_id, violation));
            }
            if let Some(workflow) = self.workflows.get_mut(workflow_id) {
                workflow
                    .graph_mut()
                    .push_dependency_edge(src.clone(), dst.clone());
            }
            self.emit(workflow_id, EventKind::EdgeAdded {
                parent: src.clone(),
                child: dst.clone(),
            });
        }

        if self
            .workflows
            .get(workflow_id)
            .is_some_and(|w| !w.graph().is_acyclic())
        {
            return Err(self.abort_workflow(workflow_id, SpawnError::CycleDetected));
        }

        // A spawn that created a true root must not wait for a discovery
        // pass; with dependencies attached, normal readiness picks it up.
        if let Some(input) = input {
            let is_root = self
                .workflows
                .get(workflow_id)
                .is_some_and(|w| !w.graph().has_incoming_edge(&new_id));
            if is_root && let Some(run) = self.runs.get_mut(workflow_id) {
                run.enqueue(new_id.clone(), input);
            }
        }

        tracing::info!(
            workflow_id = %workflow_id,
            creator = %creator,
            task_id = %new_id,
            "spawned task"
        );
        self.emit(workflow_id, EventKind::TaskSpawned {
            creator: creator.clone(),
            task_id: new_id,
        });
        Ok(())
    }

    /// Checks spawn preconditions that need only shared borrows: creator
    /// membership, quota, node policies, and id uniqueness.
    fn validate_spawn(
        &self,
        workflow_id: &WorkflowId,
        creator: &TaskId,
        new_task: &Task,
    ) -> Option<SpawnError> {
        let workflow = self.workflows.get(workflow_id)?;
        let Some(creator_task) = workflow.graph().task(creator) else {
            return Some(SpawnError::CreatorNotFound {
                workflow_id: workflow_id.clone(),
                creator: creator.clone(),
            });
        };

        let spawned = self
            .runs
            .get(workflow_id)
            .and_then(|r| r.task_state(creator))
            .map_or(0, TaskState::spawn_count);
        if let Some(max) = creator_task.constraints().max_spawn_count()
            && spawned >= max
        {
            return Some(SpawnError::QuotaExceeded {
                creator: creator.clone(),
                max_spawn_count: max,
            });
        }

        if let Err(violation) = check_node_policy(creator_task, new_task, NodeDirection::Next) {
            return Some(violation.into());
        }
        if let Err(violation) = check_node_policy(creator_task, new_task, NodeDirection::Previous) {
            return Some(violation.into());
        }

        if workflow.graph().contains(new_task.id()) {
            return Some(SpawnError::DuplicateTask {
                task_id: new_task.id().clone(),
            });
        }
        None
    }

    /// Checks both endpoint edge policies for a spawn-created edge.
    fn check_spawn_edge(
        &self,
        workflow_id: &WorkflowId,
        src: &TaskId,
        dst: &TaskId,
    ) -> Result<(), SpawnError> {
        let Some(workflow) = self.workflows.get(workflow_id) else {
            return Err(SpawnError::WorkflowNotFound {
                workflow_id: workflow_id.clone(),
            });
        };
        let Some(src_task) = workflow.graph().task(src) else {
            return Err(SpawnError::UnknownEdgeEndpoint {
                task_id: src.clone(),
            });
        };
        let Some(dst_task) = workflow.graph().task(dst) else {
            return Err(SpawnError::UnknownEdgeEndpoint {
                task_id: dst.clone(),
            });
        };
        check_edge_policy(src_task, dst_task, EdgeDirection::Outgoing)?;
        check_edge_policy(src_task, dst_task, EdgeDirection::Incoming)?;
        Ok(())
    }

    /// Aborts a workflow: empties the queue, fails every non-terminal task,
    /// clears the running flag, and records the violation for the loop.
    fn abort_workflow(&mut self, workflow_id: &WorkflowId, violation: SpawnError) -> SpawnError {
        tracing::error!(workflow_id = %workflow_id, error = %violation, "aborting workflow");
        if let Some(run) = self.runs.get_mut(workflow_id) {
            run.clear_queue();
            run.fail_all_nonterminal();
            run.set_running(false);
            run.record_abort(violation.clone());
        }
        self.emit(workflow_id, EventKind::WorkflowAborted {
            reason: violation.to_string(),
        });
        violation
    }

    /// Single atomic discovery pass: every pending task whose predecessors
    /// are all terminal is enqueued with assembled inputs; all tasks
    /// unblocked in the pass share one execution step.
    fn discover_ready(&mut self, workflow_id: &WorkflowId) -> Result<(), OrchestratorError> {
        let newly_ready = {
            let workflow = self.workflow_ref(workflow_id)?;
            let run = self.run_ref(workflow_id)?;

            let mut newly_ready = Vec::new();
            for task in workflow.graph().tasks() {
                let Some(state) = run.task_state(task.id()) else {
                    continue;
                };
                if state.status() != TaskStatus::Pending || state.is_enqueued() {
                    continue;
                }
                let predecessors = workflow.graph().predecessors_of(task.id());
                let unblocked = predecessors
                    .iter()
                    .all(|&p| run.task_state(p).is_some_and(|s| s.status().is_terminal()));
                if !unblocked {
                    continue;
                }
                newly_ready.push((task.id().clone(), assemble_inputs(run, &predecessors)));
            }
            newly_ready
        };

        if newly_ready.is_empty() {
            return Ok(());
        }

        let run = self.run_mut(workflow_id)?;
        let current_step = run.max_step() + 1;
        for (task_id, inputs) in newly_ready {
            tracing::debug!(workflow_id = %workflow_id, task_id = %task_id, step = current_step, "task ready");
            run.assign_step(&task_id, current_step);
            run.enqueue(task_id, inputs);
        }
        Ok(())
    }

    /// Drains the ready queue, dispatching tasks in FIFO order.
    async fn drain_queue(&mut self, workflow_id: &WorkflowId) -> Result<(), OrchestratorError> {
        while let Some((task_id, inputs)) = self.run_mut(workflow_id)?.pop_ready() {
            self.dispatch(workflow_id, &task_id, inputs).await?;
            if self.run_ref(workflow_id)?.aborted().is_some() {
                break;
            }
        }
        Ok(())
    }

    /// Dispatches a single task: marks it running, invokes the body, and
    /// records completion or failure. A body failure fails only this task.
    async fn dispatch(
        &mut self,
        workflow_id: &WorkflowId,
        task_id: &TaskId,
        inputs: JsonValue,
    ) -> Result<(), OrchestratorError> {
        let is_pending = self
            .run_ref(workflow_id)?
            .task_state(task_id)
            .is_some_and(|s| s.status() == TaskStatus::Pending);
        if !is_pending {
            return Ok(());
        }

        let Some(body) = self
            .workflow_ref(workflow_id)?
            .graph()
            .task(task_id)
            .map(Task::body)
        else {
            return Ok(());
        };

        self.run_mut(workflow_id)?
            .mark_running(task_id, inputs.clone());
        tracing::debug!(workflow_id = %workflow_id, task_id = %task_id, "dispatching task");
        self.emit(workflow_id, EventKind::TaskDispatched {
            task_id: task_id.clone(),
        });

        let result = {
            let mut ctx = TaskContext {
                workflow_id: workflow_id.clone(),
                task_id: task_id.clone(),
                inputs,
                orchestrator: self,
            };
            body.run(&mut ctx).await
        };

        match result {
            Ok(output) => {
                self.complete_task(workflow_id, task_id, output)?;
            }
            Err(error) => {
                if self.run_ref(workflow_id)?.aborted().is_some() {
                    // The abort path already failed this task along with the
                    // rest of the workflow.
                    tracing::error!(
                        workflow_id = %workflow_id,
                        task_id = %task_id,
                        error = %error,
                        "task raised after workflow abort"
                    );
                } else {
                    tracing::warn!(
                        workflow_id = %workflow_id,
                        task_id = %task_id,
                        error = %error,
                        "task failed"
                    );
                    self.run_mut(workflow_id)?.mark_failed(task_id);
                    self.emit(workflow_id, EventKind::TaskFailed {
                        task_id: task_id.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn emit(&self, workflow_id: &WorkflowId, kind: EventKind) {
        if self.observers.is_empty() {
            return;
        }
        let (Some(workflow), Some(run)) = (
            self.workflows.get(workflow_id),
            self.runs.get(workflow_id),
        ) else {
            return;
        };
        let event = ObservationEvent::new(
            workflow_id.clone(),
            kind,
            WorkflowSnapshot::capture(workflow, run),
        );
        for observer in &self.observers {
            observer.on_event(&event);
        }
    }

    fn workflow_ref(&self, workflow_id: &WorkflowId) -> Result<&Workflow, OrchestratorError> {
        self.workflows
            .get(workflow_id)
            .ok_or_else(|| OrchestratorError::WorkflowNotFound {
                workflow_id: workflow_id.clone(),
            })
    }

    fn run_ref(&self, workflow_id: &WorkflowId) -> Result<&RunState, OrchestratorError> {
        self.runs
            .get(workflow_id)
            .ok_or_else(|| OrchestratorError::WorkflowNotFound {
                workflow_id: workflow_id.clone(),
            })
    }

    fn run_mut(&mut self, workflow_id: &WorkflowId) -> Result<&mut RunState, OrchestratorError> {
        self.runs
            .get_mut(workflow_id)
            .ok_or_else(|| OrchestratorError::WorkflowNotFound {
                workflow_id: workflow_id.clone(),
            })
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

/// Collects predecessor outputs in edge-insertion order, omitting
/// predecessors whose output is absent or empty.
fn assemble_inputs(run: &RunState, predecessors: &[&TaskId]) -> JsonValue {
    let mut values = Vec::new();
    for &pred in predecessors {
        let Some(output) = run.task_state(pred).and_then(TaskState::output) else {
            continue;
        };
        if is_empty_value(output) {
            continue;
        }
        values.push(output.clone());
    }
    JsonValue::Array(values)
}

/// An output is empty if it is null, an empty string, or an empty
/// sequence/map. Numbers and booleans always count as present.
fn is_empty_value(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => true,
        JsonValue::String(s) => s.is_empty(),
        JsonValue::Array(items) => items.is_empty(),
        JsonValue::Object(entries) => entries.is_empty(),
        JsonValue::Bool(_) | JsonValue::Number(_) => false,
    }
}
