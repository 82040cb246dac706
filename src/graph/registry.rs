//! The kind registry: per-kind structural and behavioral declarations.
//!
//! The registry is the single place that knows what each resource kind
//! accepts and emits. The builder consults it to check reference slots and
//! output references, the diff engine consults it to classify attribute
//! changes, and the plan assembler consults it for replace ordering. Adding
//! a new kind means adding one entry here, not touching per-kind code
//! elsewhere.

use std::collections::HashMap;

use crate::config::ResourceKind;

/// How a replacement is ordered for a kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceStrategy {
    /// Delete the old resource, then create the new one. Used when the
    /// provider cannot hold two instances at once (networks, databases).
    DeleteThenCreate,
    /// Create the new resource, then delete the old one. Used when a window
    /// of coexistence is cheaper than downtime (functions, endpoints).
    CreateThenDelete,
}

/// Structural and behavioral declaration for one resource kind.
#[derive(Debug, Clone)]
pub struct KindSpec {
    /// Reference slots this kind declares, and the kinds each slot accepts.
    pub slots: &'static [(&'static str, &'static [ResourceKind])],
    /// Attribute names that can change in place.
    pub mutable_attrs: &'static [&'static str],
    /// Attribute key prefixes that can change in place (for open-ended
    /// families like function environment variables).
    pub mutable_prefixes: &'static [&'static str],
    /// Emergent output fields this kind emits after settling.
    pub outputs: &'static [&'static str],
    /// Ordering used when an immutable attribute forces replacement.
    pub replace_strategy: ReplaceStrategy,
}

/// Registry of kind specifications.
#[derive(Debug)]
pub struct KindRegistry {
    specs: HashMap<ResourceKind, KindSpec>,
}

impl KindRegistry {
    /// Creates the registry with the built-in kind set.
    #[must_use]
    pub fn new() -> Self {
        let mut specs = HashMap::new();

        specs.insert(
            ResourceKind::Network,
            KindSpec {
                slots: &[],
                mutable_attrs: &[],
                mutable_prefixes: &["tag."],
                outputs: &["id"],
                replace_strategy: ReplaceStrategy::DeleteThenCreate,
            },
        );

        specs.insert(
            ResourceKind::Subnet,
            KindSpec {
                slots: &[("network", &[ResourceKind::Network])],
                mutable_attrs: &[],
                mutable_prefixes: &["tag."],
                outputs: &["id", "cidr"],
                replace_strategy: ReplaceStrategy::DeleteThenCreate,
            },
        );

        specs.insert(
            ResourceKind::SecurityRule,
            KindSpec {
                slots: &[("network", &[ResourceKind::Network])],
                mutable_attrs: &["port", "protocol", "cidr", "description"],
                mutable_prefixes: &[],
                outputs: &["id"],
                replace_strategy: ReplaceStrategy::DeleteThenCreate,
            },
        );

        specs.insert(
            ResourceKind::ComputeInstance,
            KindSpec {
                slots: &[("subnet", &[ResourceKind::Subnet])],
                mutable_attrs: &["instance_type"],
                mutable_prefixes: &["tag."],
                outputs: &["id", "private_ip"],
                replace_strategy: ReplaceStrategy::DeleteThenCreate,
            },
        );

        specs.insert(
            ResourceKind::StaticAddress,
            KindSpec {
                slots: &[("instance", &[ResourceKind::ComputeInstance])],
                mutable_attrs: &[],
                mutable_prefixes: &["tag."],
                outputs: &["public_ip"],
                replace_strategy: ReplaceStrategy::DeleteThenCreate,
            },
        );

        specs.insert(
            ResourceKind::DatabaseInstance,
            KindSpec {
                slots: &[("subnet", &[ResourceKind::Subnet])],
                mutable_attrs: &[
                    "allocated_storage_gb",
                    "backup_retention_days",
                    "instance_class",
                    "master_password",
                ],
                mutable_prefixes: &["tag."],
                outputs: &["endpoint", "port"],
                replace_strategy: ReplaceStrategy::DeleteThenCreate,
            },
        );

        specs.insert(
            ResourceKind::Function,
            KindSpec {
                slots: &[
                    ("network", &[ResourceKind::Network]),
                    ("subnet", &[ResourceKind::Subnet]),
                ],
                mutable_attrs: &["runtime", "handler", "code", "timeout_seconds", "memory_mb"],
                mutable_prefixes: &["env.", "tag."],
                outputs: &["id"],
                replace_strategy: ReplaceStrategy::CreateThenDelete,
            },
        );

        specs.insert(
            ResourceKind::FunctionEndpoint,
            KindSpec {
                slots: &[("function", &[ResourceKind::Function])],
                mutable_attrs: &["auth"],
                mutable_prefixes: &[],
                outputs: &["url"],
                replace_strategy: ReplaceStrategy::CreateThenDelete,
            },
        );

        Self { specs }
    }

    /// Returns the specification for a kind.
    ///
    /// Every variant of [`ResourceKind`] has an entry, so lookup never fails.
    #[must_use]
    pub fn spec(&self, kind: ResourceKind) -> &KindSpec {
        &self.specs[&kind]
    }

    /// Returns the kinds accepted by a slot of the given kind, or `None` if
    /// the kind declares no such slot.
    #[must_use]
    pub fn slot_accepts(&self, kind: ResourceKind, slot: &str) -> Option<&'static [ResourceKind]> {
        self.spec(kind)
            .slots
            .iter()
            .find(|(name, _)| *name == slot)
            .map(|(_, accepted)| *accepted)
    }

    /// Returns true if the kind emits the named output.
    #[must_use]
    pub fn emits_output(&self, kind: ResourceKind, output: &str) -> bool {
        self.spec(kind).outputs.contains(&output)
    }

    /// Returns true if the attribute can change in place for the kind.
    #[must_use]
    pub fn is_mutable(&self, kind: ResourceKind, attr: &str) -> bool {
        let spec = self.spec(kind);
        spec.mutable_attrs.contains(&attr)
            || spec.mutable_prefixes.iter().any(|p| attr.starts_with(p))
    }
}

impl Default for KindRegistry {
    fn default() -> Self {
        Self::new()
    }
}
