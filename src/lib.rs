// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![forbid(unsafe_code)]               // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![warn(unused_imports)]              // Unused imports are flagged
#![warn(unused_variables)]            // Unused variables are flagged
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Strato
//!
//! A declarative, idempotent infrastructure topology compiler for
//! single-region cloud stacks.
//!
//! ## Overview
//!
//! Strato turns a YAML topology of named resources into provider API calls:
//!
//! - Define networks, subnets, databases, functions, and their wiring as code
//! - Compute a plan by diffing the topology against the persisted snapshot
//! - Apply changes in dependency order, binding emergent values as resources
//!   settle
//! - Keep a durable per-resource snapshot so a failed apply can be resumed
//!
//! ## Architecture
//!
//! The system is built around **snapshot-based planning**:
//!
//! 1. **Desired state**: Defined in `strato.topology.yaml`, compiled into a
//!    dependency graph
//! 2. **Applied state**: The snapshot persisted after the last apply
//! 3. **Planner**: Diffs the two and executes the resulting steps against
//!    the provider
//!
//! Live provider state is never consulted during planning; the snapshot is
//! the single source of truth for what exists.
//!
//! ## Modules
//!
//! - [`config`]: Topology parsing, validation, and hashing
//! - [`graph`]: Dependency graph construction and ordering
//! - [`state`]: Snapshot storage backends (local, S3)
//! - [`provider`]: Cloud provider API client
//! - [`planner`]: Diff computation, plan assembly, and execution
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! project:
//!   name: task-logger
//!   environment: dev
//!
//! resources:
//!   - name: core-network
//!     kind: network
//!     attributes:
//!       cidr: 10.0.0.0/16
//!
//!   - name: app-subnet
//!     kind: subnet
//!     refs:
//!       network: core-network
//!     attributes:
//!       tier: public
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod error;
pub mod graph;
pub mod planner;
pub mod provider;
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{TopologyConfig, TopologyHasher, TopologyParser, TopologyValidator};
pub use error::{Result, StratoError};
pub use graph::{DependencyResolver, DesiredStateGraph, GraphBuilder, KindRegistry};
pub use planner::{DiffEngine, ExecutionPlan, PlanAssembler, PlanExecutor};
pub use provider::{CloudProvider, HttpCloudProvider};
pub use state::{AppliedSnapshot, LocalSnapshotStore, S3SnapshotStore, SnapshotStore};
