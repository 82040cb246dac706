//! Desired-state graph: model, kind registry, construction, and ordering.
//!
//! The graph module turns a parsed topology into an immutable dependency
//! graph and computes deterministic orderings over it. Everything here runs
//! before the first provider call.

mod node;
mod registry;
mod builder;
mod resolver;

pub use node::{DesiredStateGraph, ResourceNode};
pub use registry::{KindRegistry, KindSpec, ReplaceStrategy};
pub use builder::GraphBuilder;
pub use resolver::DependencyResolver;
