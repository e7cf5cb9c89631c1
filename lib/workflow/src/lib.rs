//! Dynamic workflow orchestration engine for taskloom.
//!
//! This crate drives directed acyclic task graphs whose shape may evolve
//! during execution:
//!
//! - **Graph Model**: insertion-ordered tasks with dependency and display edges
//! - **Constraints**: per-task spawn quotas and node/edge admission policies
//! - **Scheduling**: a cooperative loop that discovers ready tasks, assembles
//!   their inputs from predecessor outputs, and dispatches task bodies
//! - **Spawning**: mid-run insertion of tasks and edges, gated by policies
//!   and a global acyclicity check
//! - **Observation**: events with graph snapshots for external renderers

pub mod constraints;
pub mod definition;
pub mod error;
pub mod events;
pub mod graph;
pub mod orchestrator;
pub mod policy;
pub mod state;
pub mod task;

pub use constraints::{ConstraintField, EdgeRule, NodeRule, Policy, TaskConstraints};
pub use definition::Workflow;
pub use error::{
    ConstraintError, OrchestratorError, PolicyViolation, RegistrationError, SpawnError, TaskError,
};
pub use events::{
    EventKind, ObservationEvent, Observer, TaskSnapshot, TentativeNode, WorkflowSnapshot,
};
pub use graph::TaskGraph;
pub use orchestrator::{Orchestrator, SpawnRequest, TaskContext, TaskStatusReport};
pub use policy::{check_edge_policy, check_node_policy, EdgeDirection, NodeDirection};
pub use state::{RunState, TaskState, TaskStatus};
pub use task::{Task, TaskFn, TaskRun};
