//! Core domain types for the taskloom workflow engine.
//!
//! This crate provides the strongly-typed identifiers shared by the
//! orchestration crates.

pub mod id;

pub use id::{EventId, ParseIdError, TaskId, WorkflowId};
