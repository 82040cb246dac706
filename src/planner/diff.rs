//! Diff engine comparing the desired graph against the applied snapshot.
//!
//! Classification runs entirely against the persisted snapshot; live
//! provider state is never queried. Attributes are compared in symbolic
//! form, so an output reference is the placeholder string `${node.output}`
//! on both sides and a dependency's emergent value changing does not by
//! itself reclassify a depender. When a referenced node is created or
//! replaced its emergent values do change, so dependers holding output
//! references are promoted to updates to re-bind them.

use std::collections::BTreeMap;
use tracing::debug;

use crate::graph::{DesiredStateGraph, KindRegistry, ReplaceStrategy, ResourceNode};
use crate::state::AppliedSnapshot;

/// Engine for computing diffs between desired and applied state.
#[derive(Debug, Default)]
pub struct DiffEngine {
    /// Kind registry for mutability and replace-strategy lookups.
    registry: KindRegistry,
}

/// Difference for a single node.
#[derive(Debug, Clone)]
pub struct NodeDiff {
    /// Resource name.
    pub name: String,
    /// Type of difference.
    pub diff_type: DiffType,
    /// Attribute-level details about the difference.
    pub details: Vec<DiffDetail>,
    /// Replace ordering, present only for replace classifications.
    pub replace_strategy: Option<ReplaceStrategy>,
}

/// Type of difference detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffType {
    /// Resource needs to be created.
    Create,
    /// Mutable attributes changed; update in place.
    Update,
    /// An immutable attribute changed; delete and recreate.
    Replace,
    /// Resource was removed from the topology.
    Delete,
    /// Resource is unchanged.
    NoOp,
}

/// Detail about a specific attribute difference.
#[derive(Debug, Clone)]
pub struct DiffDetail {
    /// Attribute that differs.
    pub field: String,
    /// Previously applied value (symbolic).
    pub old_value: Option<String>,
    /// Desired value (symbolic).
    pub new_value: Option<String>,
}

/// Complete diff result.
#[derive(Debug)]
pub struct DiffResult {
    /// Per-node diffs, desired nodes in declaration order followed by
    /// removed nodes.
    pub diffs: Vec<NodeDiff>,
    /// Number of resources to create.
    pub creates: usize,
    /// Number of resources to update in place.
    pub updates: usize,
    /// Number of resources to replace.
    pub replaces: usize,
    /// Number of resources to delete.
    pub deletes: usize,
    /// Number of unchanged resources.
    pub unchanged: usize,
}

impl DiffEngine {
    /// Creates a new diff engine.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: KindRegistry::new(),
        }
    }

    /// Computes the diff between the desired graph and the snapshot.
    ///
    /// A missing snapshot is treated as empty, so every node classifies as
    /// create on first run.
    #[must_use]
    pub fn compute_diff(
        &self,
        graph: &DesiredStateGraph,
        snapshot: Option<&AppliedSnapshot>,
    ) -> DiffResult {
        let mut diffs: Vec<NodeDiff> = graph
            .nodes()
            .iter()
            .map(|node| self.classify_node(node, snapshot))
            .collect();

        // Records in the snapshot but gone from the topology are deletes
        if let Some(snapshot) = snapshot {
            for name in snapshot.node_names() {
                if !graph.contains(name) {
                    debug!("Node {name} removed from topology");
                    diffs.push(NodeDiff {
                        name: name.to_string(),
                        diff_type: DiffType::Delete,
                        details: Vec::new(),
                        replace_strategy: None,
                    });
                }
            }
        }

        Self::promote_stale_dependers(graph, &mut diffs);

        let creates = diffs.iter().filter(|d| d.diff_type == DiffType::Create).count();
        let updates = diffs.iter().filter(|d| d.diff_type == DiffType::Update).count();
        let replaces = diffs.iter().filter(|d| d.diff_type == DiffType::Replace).count();
        let deletes = diffs.iter().filter(|d| d.diff_type == DiffType::Delete).count();
        let unchanged = diffs.iter().filter(|d| d.diff_type == DiffType::NoOp).count();

        DiffResult {
            diffs,
            creates,
            updates,
            replaces,
            deletes,
            unchanged,
        }
    }

    /// Classifies a single desired node against the snapshot.
    fn classify_node(&self, node: &ResourceNode, snapshot: Option<&AppliedSnapshot>) -> NodeDiff {
        let Some(record) = snapshot.and_then(|s| s.node(&node.name)) else {
            debug!("Node {} needs to be created", node.name);
            return NodeDiff {
                name: node.name.clone(),
                diff_type: DiffType::Create,
                details: Vec::new(),
                replace_strategy: None,
            };
        };

        // A kind change under the same name is a different resource
        if record.kind != node.kind {
            debug!(
                "Node {} changed kind ({} -> {}), replacing",
                node.name, record.kind, node.kind
            );
            return NodeDiff {
                name: node.name.clone(),
                diff_type: DiffType::Replace,
                details: vec![DiffDetail {
                    field: String::from("kind"),
                    old_value: Some(record.kind.to_string()),
                    new_value: Some(node.kind.to_string()),
                }],
                replace_strategy: Some(self.registry.spec(node.kind).replace_strategy),
            };
        }

        let desired = node.symbolic_attributes();
        let details = Self::attribute_details(&record.attributes, &desired);

        // A retargeted reference slot binds to a different parent resource;
        // that is structural, not an in-place edit
        let desired_deps: Vec<String> = node
            .dependency_names()
            .iter()
            .map(|s| (*s).to_string())
            .collect();
        let refs_changed = {
            let mut a = record.depends_on.clone();
            let mut b = desired_deps;
            a.sort_unstable();
            b.sort_unstable();
            a != b
        };

        if details.is_empty() && !refs_changed {
            debug!("Node {} is up to date", node.name);
            return NodeDiff {
                name: node.name.clone(),
                diff_type: DiffType::NoOp,
                details: Vec::new(),
                replace_strategy: None,
            };
        }

        let immutable_change = refs_changed
            || details
                .iter()
                .any(|d| !self.registry.is_mutable(node.kind, &d.field));

        if immutable_change {
            debug!("Node {} has immutable changes, replacing", node.name);
            NodeDiff {
                name: node.name.clone(),
                diff_type: DiffType::Replace,
                details,
                replace_strategy: Some(self.registry.spec(node.kind).replace_strategy),
            }
        } else {
            debug!("Node {} has mutable changes, updating in place", node.name);
            NodeDiff {
                name: node.name.clone(),
                diff_type: DiffType::Update,
                details,
                replace_strategy: None,
            }
        }
    }

    /// Computes attribute-level differences between two symbolic maps.
    fn attribute_details(
        old: &BTreeMap<String, String>,
        new: &BTreeMap<String, String>,
    ) -> Vec<DiffDetail> {
        let mut details = Vec::new();

        for (key, new_value) in new {
            match old.get(key) {
                Some(old_value) if old_value == new_value => {}
                Some(old_value) => details.push(DiffDetail {
                    field: key.clone(),
                    old_value: Some(old_value.clone()),
                    new_value: Some(new_value.clone()),
                }),
                None => details.push(DiffDetail {
                    field: key.clone(),
                    old_value: None,
                    new_value: Some(new_value.clone()),
                }),
            }
        }

        for (key, old_value) in old {
            if !new.contains_key(key) {
                details.push(DiffDetail {
                    field: key.clone(),
                    old_value: Some(old_value.clone()),
                    new_value: None,
                });
            }
        }

        details
    }

    /// Promotes no-op nodes holding output references to created or
    /// replaced nodes into updates, so their re-bound emergent values reach
    /// the provider.
    fn promote_stale_dependers(graph: &DesiredStateGraph, diffs: &mut [NodeDiff]) {
        // Fixed point: a promotion never introduces new create/replace
        // classifications, so one pass over output refs suffices
        let changed: Vec<String> = diffs
            .iter()
            .filter(|d| matches!(d.diff_type, DiffType::Create | DiffType::Replace))
            .map(|d| d.name.clone())
            .collect();

        for diff in diffs.iter_mut() {
            if diff.diff_type != DiffType::NoOp {
                continue;
            }
            let Some(node) = graph.node(&diff.name) else {
                continue;
            };

            for (attr, target, output) in node.output_refs() {
                if changed.iter().any(|c| c == target) {
                    debug!(
                        "Node {} re-binds ${{{target}.{output}}}, promoting to update",
                        diff.name
                    );
                    diff.diff_type = DiffType::Update;
                    diff.details.push(DiffDetail {
                        field: attr.to_string(),
                        old_value: Some(format!("${{{target}.{output}}}")),
                        new_value: Some(format!("${{{target}.{output}}}")),
                    });
                }
            }
        }
    }
}

impl DiffResult {
    /// Returns true if there are any changes.
    #[must_use]
    pub const fn has_changes(&self) -> bool {
        self.creates > 0 || self.updates > 0 || self.replaces > 0 || self.deletes > 0
    }

    /// Looks up the diff for a node by name.
    #[must_use]
    pub fn diff_for(&self, name: &str) -> Option<&NodeDiff> {
        self.diffs.iter().find(|d| d.name == name)
    }

    /// Filters to only diffs that require action.
    #[must_use]
    pub fn actionable_diffs(&self) -> Vec<&NodeDiff> {
        self.diffs
            .iter()
            .filter(|d| d.diff_type != DiffType::NoOp)
            .collect()
    }
}

impl std::fmt::Display for DiffType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Replace => "replace",
            Self::Delete => "delete",
            Self::NoOp => "no-op",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for NodeDiff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.diff_type)?;
        if !self.details.is_empty() {
            write!(f, " (")?;
            for (i, detail) in self.details.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", detail.field)?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ResourceKind, TopologyParser};
    use crate::graph::GraphBuilder;
    use crate::state::NodeRecord;

    fn build_graph(yaml: &str) -> DesiredStateGraph {
        let config = TopologyParser::new()
            .parse_yaml(yaml, None)
            .expect("parse topology");
        GraphBuilder::new().build(&config).expect("build graph")
    }

    fn two_tier_yaml() -> &'static str {
        r#"
project:
  name: test-stack
state:
  backend: local
resources:
  - name: core-network
    kind: network
    attributes:
      cidr: 10.0.0.0/16
  - name: isolated-subnet
    kind: subnet
    refs:
      network: core-network
    attributes:
      tier: isolated
  - name: app-db
    kind: database-instance
    refs:
      subnet: isolated-subnet
    attributes:
      engine: mysql
      engine_version: "8.0.34"
      database_name: task_logger
  - name: logger-fn
    kind: function
    refs:
      network: core-network
    attributes:
      runtime: python3.10
      env.DB_HOST: { from: app-db, output: endpoint }
"#
    }

    fn snapshot_matching(graph: &DesiredStateGraph) -> AppliedSnapshot {
        let mut snapshot = AppliedSnapshot::new("test-stack", "dev");
        for node in graph.nodes() {
            let mut record = NodeRecord::new(
                &node.name,
                node.kind,
                &format!("id-{}", node.name),
            );
            record.attributes = node.symbolic_attributes();
            record.depends_on = node
                .dependency_names()
                .iter()
                .map(|s| (*s).to_string())
                .collect();
            snapshot.set_node(record);
        }
        snapshot
    }

    #[test]
    fn test_empty_snapshot_creates_everything() {
        let graph = build_graph(two_tier_yaml());
        let result = DiffEngine::new().compute_diff(&graph, None);

        assert_eq!(result.creates, 4);
        assert_eq!(result.unchanged, 0);
        assert!(result.has_changes());
    }

    #[test]
    fn test_matching_snapshot_is_all_noop() {
        let graph = build_graph(two_tier_yaml());
        let snapshot = snapshot_matching(&graph);
        let result = DiffEngine::new().compute_diff(&graph, Some(&snapshot));

        assert_eq!(result.unchanged, 4);
        assert!(!result.has_changes());
    }

    #[test]
    fn test_mutable_change_is_update() {
        let graph = build_graph(two_tier_yaml());
        let mut snapshot = snapshot_matching(&graph);

        // Previously applied with a different timeout
        if let Some(record) = snapshot.nodes.get_mut("logger-fn") {
            record
                .attributes
                .insert(String::from("timeout_seconds"), String::from("10"));
        }

        let result = DiffEngine::new().compute_diff(&graph, Some(&snapshot));
        assert_eq!(
            result.diff_for("logger-fn").map(|d| d.diff_type),
            Some(DiffType::Update)
        );
    }

    #[test]
    fn test_immutable_change_is_replace() {
        let graph = build_graph(two_tier_yaml());
        let mut snapshot = snapshot_matching(&graph);

        if let Some(record) = snapshot.nodes.get_mut("app-db") {
            record
                .attributes
                .insert(String::from("engine_version"), String::from("5.7.44"));
        }

        let result = DiffEngine::new().compute_diff(&graph, Some(&snapshot));
        let diff = result.diff_for("app-db").expect("diff for app-db");
        assert_eq!(diff.diff_type, DiffType::Replace);
        assert_eq!(diff.replace_strategy, Some(ReplaceStrategy::DeleteThenCreate));
    }

    #[test]
    fn test_replace_promotes_output_referencing_depender() {
        let graph = build_graph(two_tier_yaml());
        let mut snapshot = snapshot_matching(&graph);

        if let Some(record) = snapshot.nodes.get_mut("app-db") {
            record
                .attributes
                .insert(String::from("engine_version"), String::from("5.7.44"));
        }

        let result = DiffEngine::new().compute_diff(&graph, Some(&snapshot));

        // logger-fn references ${app-db.endpoint}, which changes on replace
        assert_eq!(
            result.diff_for("logger-fn").map(|d| d.diff_type),
            Some(DiffType::Update)
        );
        // isolated-subnet has no output reference to app-db, stays no-op
        assert_eq!(
            result.diff_for("isolated-subnet").map(|d| d.diff_type),
            Some(DiffType::NoOp)
        );
    }

    #[test]
    fn test_removed_node_is_delete() {
        let graph = build_graph(two_tier_yaml());
        let mut snapshot = snapshot_matching(&graph);
        snapshot.set_node(NodeRecord::new(
            "old-address",
            ResourceKind::StaticAddress,
            "addr-9",
        ));

        let result = DiffEngine::new().compute_diff(&graph, Some(&snapshot));
        assert_eq!(result.deletes, 1);
        assert_eq!(
            result.diff_for("old-address").map(|d| d.diff_type),
            Some(DiffType::Delete)
        );
    }

    #[test]
    fn test_diff_is_deterministic() {
        let graph = build_graph(two_tier_yaml());
        let snapshot = snapshot_matching(&graph);

        let engine = DiffEngine::new();
        let a = engine.compute_diff(&graph, Some(&snapshot));
        let b = engine.compute_diff(&graph, Some(&snapshot));

        let names_a: Vec<_> = a.diffs.iter().map(|d| (&d.name, d.diff_type)).collect();
        let names_b: Vec<_> = b.diffs.iter().map(|d| (&d.name, d.diff_type)).collect();
        assert_eq!(names_a, names_b);
    }
}
