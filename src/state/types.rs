//! Snapshot types recording the last applied topology.
//!
//! The snapshot is the diff baseline: live provider state is never queried
//! during planning. Node records store attributes symbolically, so output
//! references keep their `${node.output}` placeholder form and a
//! dependency's changing emergent value does not reclassify its dependers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::ResourceKind;
use crate::error::{Result, StateError};

/// Current version of the snapshot format.
pub const STATE_VERSION: &str = "1.0";

/// The complete applied snapshot for one project/environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppliedSnapshot {
    /// Snapshot format version.
    pub version: String,
    /// Project name.
    pub project: String,
    /// Environment name.
    pub environment: String,
    /// Hash of the last fully applied topology. Empty while no apply has
    /// run to completion.
    pub topology_hash: String,
    /// Per-node records, keyed by resource name.
    pub nodes: BTreeMap<String, NodeRecord>,
    /// When the snapshot was last updated.
    pub last_updated: DateTime<Utc>,
    /// Apply history (recent entries).
    #[serde(default)]
    pub history: Vec<ApplyHistoryEntry>,
}

/// The recorded state of a single resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeRecord {
    /// Resource name (from the topology).
    pub name: String,
    /// Resource kind.
    pub kind: ResourceKind,
    /// Provider-assigned resource ID.
    pub provider_id: String,
    /// Attributes as applied, in symbolic form.
    pub attributes: BTreeMap<String, String>,
    /// Emergent outputs observed when the resource settled.
    pub outputs: BTreeMap<String, String>,
    /// Names of the resources this node depended on when applied.
    pub depends_on: Vec<String>,
    /// Provider IDs of superseded incarnations that still exist because
    /// their post-replacement delete has not succeeded yet. Each entry is
    /// planned for removal until the provider confirms the delete.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deposed: Vec<String>,
    /// When the resource was first created.
    pub created_at: DateTime<Utc>,
    /// When the record was last updated.
    pub updated_at: DateTime<Utc>,
}

/// A single entry in the apply history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyHistoryEntry {
    /// When the apply occurred.
    pub timestamp: DateTime<Utc>,
    /// Type of operation.
    pub operation: ApplyOperation,
    /// Topology hash at time of apply.
    pub topology_hash: String,
    /// Resources affected.
    pub resources: Vec<String>,
    /// Whether the apply ran to completion.
    pub success: bool,
    /// Optional error message.
    #[serde(default)]
    pub error: Option<String>,
}

/// Types of apply operations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApplyOperation {
    /// Plan execution.
    Apply,
    /// Full teardown.
    Destroy,
}

impl AppliedSnapshot {
    /// Creates a new empty snapshot.
    #[must_use]
    pub fn new(project: &str, environment: &str) -> Self {
        Self {
            version: STATE_VERSION.to_string(),
            project: project.to_string(),
            environment: environment.to_string(),
            topology_hash: String::new(),
            nodes: BTreeMap::new(),
            last_updated: Utc::now(),
            history: Vec::new(),
        }
    }

    /// Checks that the snapshot was written in the current format.
    ///
    /// # Errors
    ///
    /// Returns a version mismatch error if the snapshot was written by an
    /// incompatible version of the tool.
    pub fn ensure_version_supported(&self) -> Result<()> {
        if self.version == STATE_VERSION {
            Ok(())
        } else {
            Err(StateError::VersionMismatch {
                expected: STATE_VERSION.to_string(),
                found: self.version.clone(),
            }
            .into())
        }
    }

    /// Gets a node record by name.
    #[must_use]
    pub fn node(&self, name: &str) -> Option<&NodeRecord> {
        self.nodes.get(name)
    }

    /// Adds or replaces a node record.
    pub fn set_node(&mut self, record: NodeRecord) {
        self.nodes.insert(record.name.clone(), record);
        self.last_updated = Utc::now();
    }

    /// Removes a node record by name.
    pub fn remove_node(&mut self, name: &str) -> Option<NodeRecord> {
        let result = self.nodes.remove(name);
        if result.is_some() {
            self.last_updated = Utc::now();
        }
        result
    }

    /// Returns all recorded node names.
    #[must_use]
    pub fn node_names(&self) -> Vec<&str> {
        self.nodes.keys().map(String::as_str).collect()
    }

    /// Returns true if no resources are recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Adds a history entry.
    pub fn add_history(&mut self, entry: ApplyHistoryEntry) {
        // Keep only the last 100 entries
        const MAX_HISTORY: usize = 100;
        if self.history.len() >= MAX_HISTORY {
            self.history.remove(0);
        }
        self.history.push(entry);
    }
}

impl NodeRecord {
    /// Creates a new node record for a freshly created resource.
    #[must_use]
    pub fn new(name: &str, kind: ResourceKind, provider_id: &str) -> Self {
        let now = Utc::now();
        Self {
            name: name.to_string(),
            kind,
            provider_id: provider_id.to_string(),
            attributes: BTreeMap::new(),
            outputs: BTreeMap::new(),
            depends_on: Vec::new(),
            deposed: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns an emergent output value, if recorded.
    #[must_use]
    pub fn output(&self, name: &str) -> Option<&str> {
        self.outputs.get(name).map(String::as_str)
    }
}

impl ApplyHistoryEntry {
    /// Creates a new successful history entry.
    #[must_use]
    pub fn new(operation: ApplyOperation, topology_hash: &str, resources: Vec<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            topology_hash: topology_hash.to_string(),
            resources,
            success: true,
            error: None,
        }
    }

    /// Creates a failed history entry.
    #[must_use]
    pub fn failed(
        operation: ApplyOperation,
        topology_hash: &str,
        resources: Vec<String>,
        error: &str,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            topology_hash: topology_hash.to_string(),
            resources,
            success: false,
            error: Some(error.to_string()),
        }
    }
}

impl std::fmt::Display for ApplyOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let op = match self {
            Self::Apply => "apply",
            Self::Destroy => "destroy",
        };
        write!(f, "{op}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_node_roundtrip() {
        let mut snapshot = AppliedSnapshot::new("test-stack", "dev");
        assert!(snapshot.is_empty());

        let mut record = NodeRecord::new("app-db", ResourceKind::DatabaseInstance, "db-123");
        record.outputs.insert(
            String::from("endpoint"),
            String::from("db-123.internal:3306"),
        );
        snapshot.set_node(record);

        assert_eq!(snapshot.node_names(), vec!["app-db"]);
        assert_eq!(
            snapshot.node("app-db").and_then(|n| n.output("endpoint")),
            Some("db-123.internal:3306")
        );

        snapshot.remove_node("app-db");
        assert!(snapshot.is_empty());
    }

    #[test]
    fn test_version_guard() {
        let snapshot = AppliedSnapshot::new("test-stack", "dev");
        assert!(snapshot.ensure_version_supported().is_ok());

        let mut old = AppliedSnapshot::new("test-stack", "dev");
        old.version = String::from("0.9");
        assert!(matches!(
            old.ensure_version_supported(),
            Err(crate::error::StratoError::State(
                StateError::VersionMismatch { .. }
            ))
        ));
    }

    #[test]
    fn test_history_capped() {
        let mut snapshot = AppliedSnapshot::new("test-stack", "dev");
        for _ in 0..150 {
            snapshot.add_history(ApplyHistoryEntry::new(ApplyOperation::Apply, "abc", vec![]));
        }
        assert_eq!(snapshot.history.len(), 100);
    }
}
