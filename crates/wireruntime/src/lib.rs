//! Workflow execution runtime.
//!
//! This crate provides the node executor (the per-type registry with
//! interceptor chains), topological scheduling, and the workflow engine
//! that drives runs sequentially or level-parallel with pause / resume /
//! cancel / timeout controls.

mod context;
mod engine;
mod executor;
mod schedule;

pub use context::{ExecutionContext, RunStatus};
pub use engine::{EngineError, ExecuteOptions, RunStats, WorkflowEngine, WorkflowResult};
pub use executor::{ExecutorFn, NodeBehavior, NodeExecutor, TransformFn, ValidatorFn};
pub use schedule::{execution_order, level_partition};
