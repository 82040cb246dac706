//! Plan assembly: turning a diff into an ordered step list.
//!
//! Deletes of removed nodes come first, dependents before their
//! dependencies. Surviving nodes follow in creation order, with replace
//! classifications expanded into their per-kind two-step form.

use std::collections::BTreeMap;
use tracing::debug;

use crate::config::ResourceKind;
use crate::error::Result;
use crate::graph::{DependencyResolver, DesiredStateGraph, ReplaceStrategy};
use crate::state::{AppliedSnapshot, NodeRecord};

use super::diff::{DiffResult, DiffType};

/// One queued action against one resource.
#[derive(Debug, Clone)]
pub struct PlanStep {
    /// Resource name.
    pub name: String,
    /// Resource kind.
    pub kind: ResourceKind,
    /// The action to perform.
    pub action: StepAction,
    /// Declared attributes in symbolic form. Placeholders are substituted
    /// with emergent values at execution time.
    pub attributes: BTreeMap<String, String>,
    /// Names of the resources this step's node depends on.
    pub depends_on: Vec<String>,
}

/// The action a step performs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepAction {
    /// Create a new resource.
    Create,
    /// Update mutable attributes of an existing resource.
    Update {
        /// Provider ID of the resource to update.
        resource_id: String,
    },
    /// Delete a resource and drop its snapshot record.
    Delete {
        /// Provider ID of the resource to delete.
        resource_id: String,
    },
    /// Delete a superseded incarnation after a create-then-delete
    /// replacement. The node's snapshot record already points at the new
    /// resource; on success the old ID is dropped from the record's
    /// deposed list.
    RemoveReplaced {
        /// Provider ID of the superseded resource.
        resource_id: String,
    },
    /// Nothing to do; listed for plan visibility.
    NoOp,
}

/// An ordered, executable plan.
#[derive(Debug, Default)]
pub struct ExecutionPlan {
    /// Steps in execution order.
    pub steps: Vec<PlanStep>,
}

/// Assembler turning diffs into ordered plans.
#[derive(Debug, Default)]
pub struct PlanAssembler {
    resolver: DependencyResolver,
}

impl PlanAssembler {
    /// Creates a new plan assembler.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            resolver: DependencyResolver::new(),
        }
    }

    /// Assembles the execution plan for an apply.
    ///
    /// # Errors
    ///
    /// Returns a cycle error if the desired graph is not acyclic.
    pub fn assemble(
        &self,
        graph: &DesiredStateGraph,
        diff: &DiffResult,
        snapshot: Option<&AppliedSnapshot>,
    ) -> Result<ExecutionPlan> {
        let creation_order = self.resolver.creation_order(graph)?;
        let mut steps = Vec::new();

        // Removed nodes first, dependents before dependencies
        for name in Self::removed_teardown_order(diff, snapshot) {
            let record = snapshot.and_then(|s| s.node(&name));
            if let Some(record) = record {
                Self::push_deposed_removals(&mut steps, record);
            }
            steps.push(PlanStep {
                name: name.clone(),
                kind: record.map_or(ResourceKind::Network, |r| r.kind),
                action: StepAction::Delete {
                    resource_id: record.map_or_else(String::new, |r| r.provider_id.clone()),
                },
                attributes: BTreeMap::new(),
                depends_on: Vec::new(),
            });
        }

        // Surviving nodes in creation order
        for name in &creation_order {
            let Some(node) = graph.node(name) else {
                continue;
            };
            let Some(node_diff) = diff.diff_for(name) else {
                continue;
            };

            let attributes = node.symbolic_attributes();
            let depends_on: Vec<String> = node
                .dependency_names()
                .iter()
                .map(|s| (*s).to_string())
                .collect();
            let record = snapshot.and_then(|s| s.node(name));
            let provider_id = record.map(|r| r.provider_id.clone());

            // A deposed ID is a previous incarnation whose delete has not
            // succeeded yet; keep planning its removal until it does
            if let Some(record) = record {
                Self::push_deposed_removals(&mut steps, record);
            }

            match node_diff.diff_type {
                DiffType::Create => steps.push(PlanStep {
                    name: node.name.clone(),
                    kind: node.kind,
                    action: StepAction::Create,
                    attributes,
                    depends_on,
                }),
                DiffType::Update => steps.push(PlanStep {
                    name: node.name.clone(),
                    kind: node.kind,
                    action: StepAction::Update {
                        resource_id: provider_id.unwrap_or_default(),
                    },
                    attributes,
                    depends_on,
                }),
                DiffType::Replace => {
                    let strategy = node_diff
                        .replace_strategy
                        .unwrap_or(ReplaceStrategy::DeleteThenCreate);
                    let old_id = provider_id.unwrap_or_default();

                    match strategy {
                        ReplaceStrategy::DeleteThenCreate => {
                            steps.push(PlanStep {
                                name: node.name.clone(),
                                kind: node.kind,
                                action: StepAction::Delete {
                                    resource_id: old_id,
                                },
                                attributes: BTreeMap::new(),
                                depends_on: Vec::new(),
                            });
                            steps.push(PlanStep {
                                name: node.name.clone(),
                                kind: node.kind,
                                action: StepAction::Create,
                                attributes,
                                depends_on,
                            });
                        }
                        ReplaceStrategy::CreateThenDelete => {
                            steps.push(PlanStep {
                                name: node.name.clone(),
                                kind: node.kind,
                                action: StepAction::Create,
                                attributes,
                                depends_on,
                            });
                            steps.push(PlanStep {
                                name: node.name.clone(),
                                kind: node.kind,
                                action: StepAction::RemoveReplaced {
                                    resource_id: old_id,
                                },
                                attributes: BTreeMap::new(),
                                depends_on: Vec::new(),
                            });
                        }
                    }
                }
                DiffType::NoOp => steps.push(PlanStep {
                    name: node.name.clone(),
                    kind: node.kind,
                    action: StepAction::NoOp,
                    attributes,
                    depends_on,
                }),
                DiffType::Delete => {}
            }
        }

        debug!("Assembled plan with {} steps", steps.len());
        Ok(ExecutionPlan { steps })
    }

    /// Assembles a full teardown plan: every recorded node deleted,
    /// dependents before dependencies.
    #[must_use]
    pub fn assemble_destroy(&self, snapshot: &AppliedSnapshot) -> ExecutionPlan {
        let names: Vec<String> = snapshot
            .node_names()
            .iter()
            .map(|s| (*s).to_string())
            .collect();
        let ordered = Self::teardown_order_of(&names, snapshot);

        let mut steps = Vec::new();
        for name in ordered {
            let Some(record) = snapshot.node(&name) else {
                continue;
            };
            Self::push_deposed_removals(&mut steps, record);
            steps.push(PlanStep {
                name: name.clone(),
                kind: record.kind,
                action: StepAction::Delete {
                    resource_id: record.provider_id.clone(),
                },
                attributes: BTreeMap::new(),
                depends_on: Vec::new(),
            });
        }

        ExecutionPlan { steps }
    }

    /// Queues removal steps for incarnations superseded by an earlier
    /// replacement that are still waiting on a successful delete.
    fn push_deposed_removals(steps: &mut Vec<PlanStep>, record: &NodeRecord) {
        for resource_id in &record.deposed {
            steps.push(PlanStep {
                name: record.name.clone(),
                kind: record.kind,
                action: StepAction::RemoveReplaced {
                    resource_id: resource_id.clone(),
                },
                attributes: BTreeMap::new(),
                depends_on: Vec::new(),
            });
        }
    }

    /// Orders removed nodes so dependents are deleted before dependencies.
    fn removed_teardown_order(
        diff: &DiffResult,
        snapshot: Option<&AppliedSnapshot>,
    ) -> Vec<String> {
        let removed: Vec<String> = diff
            .diffs
            .iter()
            .filter(|d| d.diff_type == DiffType::Delete)
            .map(|d| d.name.clone())
            .collect();

        match snapshot {
            Some(s) => Self::teardown_order_of(&removed, s),
            None => removed,
        }
    }

    /// Orders a set of recorded nodes in reverse dependency order using the
    /// `depends_on` edges captured at apply time.
    fn teardown_order_of(names: &[String], snapshot: &AppliedSnapshot) -> Vec<String> {
        // Creation order over the subset, then reversed
        let mut remaining: Vec<&String> = names.iter().collect();
        let mut ordered: Vec<String> = Vec::with_capacity(names.len());

        while !remaining.is_empty() {
            // A node is ready when none of its in-set dependencies are
            // still unplaced
            let pos = remaining.iter().position(|name| {
                snapshot.node(name).is_none_or(|record| {
                    !record
                        .depends_on
                        .iter()
                        .any(|dep| remaining.iter().any(|r| *r == dep))
                })
            });

            match pos {
                Some(i) => ordered.push(remaining.remove(i).clone()),
                // Only possible if recorded edges form a cycle; fall back to
                // recorded order rather than loop forever
                None => {
                    ordered.extend(remaining.drain(..).cloned());
                }
            }
        }

        ordered.reverse();
        ordered
    }
}

impl ExecutionPlan {
    /// Returns true if every step is a no-op.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.steps.iter().all(|s| s.action == StepAction::NoOp)
    }

    /// Returns the steps that perform provider actions.
    #[must_use]
    pub fn actionable_steps(&self) -> Vec<&PlanStep> {
        self.steps
            .iter()
            .filter(|s| s.action != StepAction::NoOp)
            .collect()
    }
}

impl std::fmt::Display for StepAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
            Self::RemoveReplaced { .. } => "remove replaced",
            Self::NoOp => "no-op",
        };
        write!(f, "{s}")
    }
}
