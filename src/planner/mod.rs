//! Planning module: diffing, plan assembly, binding, and execution.
//!
//! This module compares the desired graph against the persisted snapshot,
//! assembles an ordered step list, and executes it against the provider
//! with per-step snapshot commits.

mod binder;
mod diff;
mod executor;
mod plan;

pub use binder::OutputBinder;
pub use diff::{DiffDetail, DiffEngine, DiffResult, DiffType, NodeDiff};
pub use executor::{ApplyReport, PlanExecutor, StepOutcome, StepReport};
pub use plan::{ExecutionPlan, PlanAssembler, PlanStep, StepAction};
