//! Desired-state graph types.
//!
//! A [`DesiredStateGraph`] is the in-memory model of the topology: one node
//! per declared resource, with edges derived from reference slots and output
//! references. The graph is immutable once built.

use std::collections::{BTreeMap, HashMap};

use crate::config::{AttrValue, ResourceDecl, ResourceKind};

/// A single node in the desired-state graph.
#[derive(Debug, Clone)]
pub struct ResourceNode {
    /// Unique resource name within the topology.
    pub name: String,
    /// The resource kind.
    pub kind: ResourceKind,
    /// Declared attributes, with file-sourced values already resolved.
    pub attributes: BTreeMap<String, AttrValue>,
    /// Reference slots: slot name to target resource name.
    pub refs: BTreeMap<String, String>,
    /// Position in the topology file, used for deterministic tie-breaking.
    pub decl_index: usize,
}

impl ResourceNode {
    /// Builds a node from a declaration and its position in the topology.
    #[must_use]
    pub fn from_decl(decl: &ResourceDecl, decl_index: usize) -> Self {
        Self {
            name: decl.name.clone(),
            kind: decl.kind,
            attributes: decl.attributes.clone(),
            refs: decl.refs.clone(),
            decl_index,
        }
    }

    /// Returns the names of all resources this node depends on.
    ///
    /// Dependencies come from reference slots and from output references in
    /// attribute values. Duplicates are removed, declaration order of the
    /// slots is preserved.
    #[must_use]
    pub fn dependency_names(&self) -> Vec<&str> {
        let mut deps: Vec<&str> = Vec::new();

        for target in self.refs.values() {
            if !deps.contains(&target.as_str()) {
                deps.push(target.as_str());
            }
        }

        for value in self.attributes.values() {
            if let Some((from, _)) = value.as_output_ref()
                && !deps.contains(&from)
            {
                deps.push(from);
            }
        }

        deps
    }

    /// Returns all output references in this node's attributes as
    /// `(attribute key, target, output)` triples.
    #[must_use]
    pub fn output_refs(&self) -> Vec<(&str, &str, &str)> {
        self.attributes
            .iter()
            .filter_map(|(key, value)| {
                value
                    .as_output_ref()
                    .map(|(from, output)| (key.as_str(), from, output))
            })
            .collect()
    }

    /// Renders all attributes symbolically for snapshot recording and
    /// hashing.
    #[must_use]
    pub fn symbolic_attributes(&self) -> BTreeMap<String, String> {
        self.attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.render_symbolic()))
            .collect()
    }
}

/// The complete desired-state graph for a topology.
#[derive(Debug, Clone, Default)]
pub struct DesiredStateGraph {
    /// Nodes in declaration order.
    nodes: Vec<ResourceNode>,
    /// Name to node position lookup.
    index: HashMap<String, usize>,
}

impl DesiredStateGraph {
    /// Creates a graph from a list of nodes.
    ///
    /// Callers must have rejected duplicate names already; the builder does.
    #[must_use]
    pub fn new(nodes: Vec<ResourceNode>) -> Self {
        let index = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.name.clone(), i))
            .collect();
        Self { nodes, index }
    }

    /// Returns all nodes in declaration order.
    #[must_use]
    pub fn nodes(&self) -> &[ResourceNode] {
        &self.nodes
    }

    /// Returns the number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Looks up a node by name.
    #[must_use]
    pub fn node(&self, name: &str) -> Option<&ResourceNode> {
        self.index.get(name).map(|&i| &self.nodes[i])
    }

    /// Returns true if the graph contains a node with the given name.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Returns the names of nodes that depend on the given node.
    #[must_use]
    pub fn dependents_of(&self, name: &str) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|n| n.dependency_names().contains(&name))
            .map(|n| n.name.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn node_with_refs(name: &str, refs: &[(&str, &str)]) -> ResourceNode {
        ResourceNode {
            name: String::from(name),
            kind: ResourceKind::Subnet,
            attributes: BTreeMap::new(),
            refs: refs
                .iter()
                .map(|(s, t)| ((*s).to_string(), (*t).to_string()))
                .collect(),
            decl_index: 0,
        }
    }

    #[test]
    fn test_dependency_names_from_refs_and_outputs() {
        let mut node = node_with_refs("logger-fn", &[("network", "core-network")]);
        node.kind = ResourceKind::Function;
        node.attributes.insert(
            String::from("env.DB_HOST"),
            AttrValue::Output {
                from: String::from("app-db"),
                output: String::from("endpoint"),
            },
        );

        let deps = node.dependency_names();
        assert_eq!(deps, vec!["core-network", "app-db"]);
    }

    #[test]
    fn test_dependency_names_deduplicated() {
        let mut node = node_with_refs("web", &[("subnet", "public-subnet")]);
        node.attributes.insert(
            String::from("gateway"),
            AttrValue::Output {
                from: String::from("public-subnet"),
                output: String::from("id"),
            },
        );

        assert_eq!(node.dependency_names(), vec!["public-subnet"]);
    }

    #[test]
    fn test_graph_lookup_and_dependents() {
        let graph = DesiredStateGraph::new(vec![
            node_with_refs("core-network", &[]),
            node_with_refs("public-subnet", &[("network", "core-network")]),
            node_with_refs("isolated-subnet", &[("network", "core-network")]),
        ]);

        assert_eq!(graph.len(), 3);
        assert!(graph.contains("public-subnet"));
        assert!(graph.node("missing").is_none());
        assert_eq!(
            graph.dependents_of("core-network"),
            vec!["public-subnet", "isolated-subnet"]
        );
    }
}
