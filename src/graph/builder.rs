//! Graph construction from a validated topology.
//!
//! The builder turns resource declarations into a [`DesiredStateGraph`],
//! rejecting structural defects the attribute validator cannot see: unknown
//! reference targets, slots the kind does not declare, references to kinds
//! a slot does not accept, and output references to fields the target kind
//! never emits. All checks run before any provider call is issued.

use std::collections::HashSet;

use tracing::debug;

use crate::config::TopologyConfig;
use crate::error::{GraphError, Result, StratoError};

use super::node::{DesiredStateGraph, ResourceNode};
use super::registry::KindRegistry;

/// Builder for the desired-state graph.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    registry: KindRegistry,
}

impl GraphBuilder {
    /// Creates a new graph builder with the built-in kind registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: KindRegistry::new(),
        }
    }

    /// Returns the kind registry the builder consults.
    #[must_use]
    pub const fn registry(&self) -> &KindRegistry {
        &self.registry
    }

    /// Builds the desired-state graph from a topology.
    ///
    /// # Errors
    ///
    /// Returns a [`GraphError`] for duplicate names, unknown or incompatible
    /// references, undeclared slots, or unknown output fields.
    pub fn build(&self, config: &TopologyConfig) -> Result<DesiredStateGraph> {
        debug!("Building desired-state graph ({} resources)", config.resources.len());

        let mut seen = HashSet::new();
        for resource in &config.resources {
            if !seen.insert(resource.name.as_str()) {
                return Err(StratoError::Graph(GraphError::DuplicateNode {
                    name: resource.name.clone(),
                }));
            }
        }

        let nodes: Vec<ResourceNode> = config
            .resources
            .iter()
            .enumerate()
            .map(|(i, decl)| ResourceNode::from_decl(decl, i))
            .collect();
        let graph = DesiredStateGraph::new(nodes);

        for node in graph.nodes() {
            self.check_slots(node, &graph)?;
            self.check_output_refs(node, &graph)?;
        }

        debug!("Graph built with {} nodes", graph.len());
        Ok(graph)
    }

    /// Checks every reference slot of a node against the registry and the
    /// graph.
    fn check_slots(&self, node: &ResourceNode, graph: &DesiredStateGraph) -> Result<()> {
        for (slot, target) in &node.refs {
            let Some(accepted) = self.registry.slot_accepts(node.kind, slot) else {
                return Err(StratoError::Graph(GraphError::UnknownSlot {
                    node: node.name.clone(),
                    kind: node.kind.to_string(),
                    slot: slot.clone(),
                }));
            };

            let Some(target_node) = graph.node(target) else {
                return Err(StratoError::Graph(GraphError::UnknownReference {
                    node: node.name.clone(),
                    slot: slot.clone(),
                    target: target.clone(),
                }));
            };

            if !accepted.contains(&target_node.kind) {
                return Err(StratoError::Graph(GraphError::IncompatibleReference {
                    node: node.name.clone(),
                    slot: slot.clone(),
                    target: target.clone(),
                    target_kind: target_node.kind.to_string(),
                    expected: accepted
                        .iter()
                        .map(|k| k.as_str())
                        .collect::<Vec<_>>()
                        .join(", "),
                }));
            }
        }

        Ok(())
    }

    /// Checks every output reference of a node against the registry and the
    /// graph.
    fn check_output_refs(&self, node: &ResourceNode, graph: &DesiredStateGraph) -> Result<()> {
        for (attr, target, output) in node.output_refs() {
            let Some(target_node) = graph.node(target) else {
                return Err(StratoError::Graph(GraphError::UnknownReference {
                    node: node.name.clone(),
                    slot: attr.to_string(),
                    target: target.to_string(),
                }));
            };

            if !self.registry.emits_output(target_node.kind, output) {
                return Err(StratoError::Graph(GraphError::UnknownOutput {
                    node: node.name.clone(),
                    target: target.to_string(),
                    output: output.to_string(),
                }));
            }
        }

        Ok(())
    }
}
