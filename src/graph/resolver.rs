//! Dependency resolution over the desired-state graph.
//!
//! Produces a total creation order: dependencies strictly before dependents,
//! with declaration order breaking ties between unrelated nodes so the same
//! topology always yields the same ordering. Teardown uses the exact reverse.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{GraphError, Result, StratoError};

use super::node::DesiredStateGraph;

/// Resolver computing deterministic orderings over the graph.
#[derive(Debug, Default)]
pub struct DependencyResolver;

impl DependencyResolver {
    /// Creates a new resolver.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes the creation order as a list of node names.
    ///
    /// Kahn's algorithm; among nodes whose dependencies are all placed, the
    /// one declared earliest in the topology file goes next.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Cycle`] naming the members of a dependency
    /// cycle if one exists.
    pub fn creation_order(&self, graph: &DesiredStateGraph) -> Result<Vec<String>> {
        let mut in_degree: HashMap<&str, usize> = graph
            .nodes()
            .iter()
            .map(|n| (n.name.as_str(), n.dependency_names().len()))
            .collect();

        let mut order = Vec::with_capacity(graph.len());

        while order.len() < graph.len() {
            // Earliest-declared ready node; nodes() is declaration order
            let next = graph
                .nodes()
                .iter()
                .find(|n| in_degree.get(n.name.as_str()) == Some(&0));

            let Some(next) = next else {
                return Err(StratoError::Graph(GraphError::Cycle {
                    members: Self::extract_cycle(graph, &in_degree),
                }));
            };

            in_degree.remove(next.name.as_str());
            order.push(next.name.clone());

            for dependent in graph.dependents_of(&next.name) {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                }
            }
        }

        debug!("Creation order resolved: {}", order.join(", "));
        Ok(order)
    }

    /// Computes the teardown order: exact reverse of creation order, so
    /// dependents are deleted before their dependencies.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Cycle`] if the graph has a dependency cycle.
    pub fn teardown_order(&self, graph: &DesiredStateGraph) -> Result<Vec<String>> {
        let mut order = self.creation_order(graph)?;
        order.reverse();
        Ok(order)
    }

    /// Walks the unplaced nodes to extract one concrete cycle path.
    fn extract_cycle(graph: &DesiredStateGraph, in_degree: &HashMap<&str, usize>) -> Vec<String> {
        // Any unplaced node sits on or leads into a cycle; follow unplaced
        // dependencies until a name repeats.
        let Some(start) = graph
            .nodes()
            .iter()
            .find(|n| in_degree.contains_key(n.name.as_str()))
        else {
            return Vec::new();
        };

        let mut path: Vec<&str> = vec![start.name.as_str()];
        let mut current = start;

        loop {
            let Some(next_name) = current
                .dependency_names()
                .into_iter()
                .find(|d| in_degree.contains_key(d))
            else {
                return path.iter().map(|s| (*s).to_string()).collect();
            };

            if let Some(pos) = path.iter().position(|&n| n == next_name) {
                let mut members: Vec<String> =
                    path[pos..].iter().map(|s| (*s).to_string()).collect();
                members.push(next_name.to_string());
                return members;
            }

            path.push(next_name);
            match graph.node(next_name) {
                Some(node) => current = node,
                None => return path.iter().map(|s| (*s).to_string()).collect(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TopologyParser;
    use crate::graph::GraphBuilder;

    fn build(yaml: &str) -> DesiredStateGraph {
        let config = TopologyParser::new()
            .parse_yaml(yaml, None)
            .expect("parse topology");
        GraphBuilder::new().build(&config).expect("build graph")
    }

    #[test]
    fn test_dependencies_before_dependents() {
        let graph = build(
            r#"
project:
  name: test-stack
state:
  backend: local
resources:
  - name: logger-fn
    kind: function
    refs:
      network: core-network
    attributes:
      runtime: python3.10
      env.DB_HOST: { from: app-db, output: endpoint }
  - name: app-db
    kind: database-instance
    refs:
      subnet: isolated-subnet
    attributes:
      engine: mysql
      engine_version: "8.0.34"
      database_name: task_logger
  - name: isolated-subnet
    kind: subnet
    refs:
      network: core-network
    attributes:
      tier: isolated
  - name: core-network
    kind: network
    attributes:
      cidr: 10.0.0.0/16
"#,
        );

        let order = DependencyResolver::new()
            .creation_order(&graph)
            .expect("resolve order");

        let pos = |name: &str| order.iter().position(|n| n == name).expect("in order");
        assert!(pos("core-network") < pos("isolated-subnet"));
        assert!(pos("isolated-subnet") < pos("app-db"));
        assert!(pos("app-db") < pos("logger-fn"));
        assert_eq!(order.len(), 4);
    }

    #[test]
    fn test_declaration_order_breaks_ties() {
        let graph = build(
            r"
project:
  name: test-stack
state:
  backend: local
resources:
  - name: net-b
    kind: network
    attributes:
      cidr: 10.1.0.0/16
  - name: net-a
    kind: network
    attributes:
      cidr: 10.0.0.0/16
",
        );

        let order = DependencyResolver::new()
            .creation_order(&graph)
            .expect("resolve order");
        assert_eq!(order, vec!["net-b", "net-a"]);
    }

    #[test]
    fn test_teardown_is_reverse_of_creation() {
        let graph = build(
            r"
project:
  name: test-stack
state:
  backend: local
resources:
  - name: core-network
    kind: network
    attributes:
      cidr: 10.0.0.0/16
  - name: public-subnet
    kind: subnet
    refs:
      network: core-network
    attributes:
      tier: public
",
        );

        let resolver = DependencyResolver::new();
        let creation = resolver.creation_order(&graph).expect("creation order");
        let teardown = resolver.teardown_order(&graph).expect("teardown order");

        let mut reversed = creation.clone();
        reversed.reverse();
        assert_eq!(teardown, reversed);
    }

    #[test]
    fn test_cycle_reported_with_members() {
        let graph = build(
            r"
project:
  name: test-stack
state:
  backend: local
resources:
  - name: fn-a
    kind: function
    attributes:
      runtime: python3.10
      partner: { from: fn-b, output: id }
  - name: fn-b
    kind: function
    attributes:
      runtime: python3.10
      partner: { from: fn-a, output: id }
",
        );

        let err = DependencyResolver::new()
            .creation_order(&graph)
            .expect_err("cycle must fail");

        match err {
            StratoError::Graph(GraphError::Cycle { members }) => {
                assert!(members.contains(&String::from("fn-a")));
                assert!(members.contains(&String::from("fn-b")));
                assert!(members.len() >= 3, "cycle path repeats its start");
            }
            other => panic!("expected cycle error, got: {other}"),
        }
    }
}
