//! Emergent value binding.
//!
//! Snapshots and plans carry attributes in symbolic form, with
//! `${node.output}` placeholders standing in for values that only exist
//! after the provider settles a resource. The binder collects those values
//! as execution proceeds and substitutes them right before each provider
//! call.

use std::collections::BTreeMap;
use tracing::debug;

use crate::error::{PlanError, Result, StratoError};
use crate::state::AppliedSnapshot;

/// Collects settled outputs and resolves symbolic attributes against them.
#[derive(Debug, Default)]
pub struct OutputBinder {
    outputs: BTreeMap<String, BTreeMap<String, String>>,
}

impl OutputBinder {
    /// Creates an empty binder.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            outputs: BTreeMap::new(),
        }
    }

    /// Seeds the binder with outputs recorded in a previous apply, so
    /// untouched nodes can satisfy references without a provider call.
    #[must_use]
    pub fn seeded_from(snapshot: &AppliedSnapshot) -> Self {
        let mut binder = Self::new();
        for (name, record) in &snapshot.nodes {
            binder.outputs.insert(name.clone(), record.outputs.clone());
        }
        binder
    }

    /// Records the outputs of a freshly settled resource, replacing any
    /// previously known values for that node.
    pub fn record_settled(&mut self, name: &str, outputs: &BTreeMap<String, String>) {
        debug!("Recorded {} output(s) for {name}", outputs.len());
        self.outputs.insert(name.to_string(), outputs.clone());
    }

    /// Forgets a node's outputs, used when its resource is deleted.
    pub fn forget(&mut self, name: &str) {
        self.outputs.remove(name);
    }

    /// Looks up one output value.
    #[must_use]
    pub fn output(&self, node: &str, output: &str) -> Option<&str> {
        self.outputs
            .get(node)
            .and_then(|o| o.get(output))
            .map(String::as_str)
    }

    /// Returns every known output, keyed by node name.
    #[must_use]
    pub const fn all(&self) -> &BTreeMap<String, BTreeMap<String, String>> {
        &self.outputs
    }

    /// Resolves a node's symbolic attributes into concrete values.
    ///
    /// # Errors
    ///
    /// Returns an unresolved-reference error when a placeholder names a
    /// node or output the binder has not seen settle.
    pub fn resolve(
        &self,
        node: &str,
        attributes: &BTreeMap<String, String>,
    ) -> Result<BTreeMap<String, String>> {
        let mut resolved = BTreeMap::new();
        for (key, value) in attributes {
            let concrete = match parse_placeholder(value) {
                Some((target, output)) => self
                    .output(target, output)
                    .ok_or_else(|| {
                        StratoError::Plan(PlanError::UnresolvedReference {
                            node: node.to_string(),
                            target: target.to_string(),
                            output: output.to_string(),
                        })
                    })?
                    .to_string(),
                None => value.clone(),
            };
            resolved.insert(key.clone(), concrete);
        }
        Ok(resolved)
    }
}

/// Splits a `${node.output}` placeholder into its parts, or returns `None`
/// for a plain value.
fn parse_placeholder(value: &str) -> Option<(&str, &str)> {
    let inner = value.strip_prefix("${")?.strip_suffix('}')?;
    let (target, output) = inner.split_once('.')?;
    if target.is_empty() || output.is_empty() {
        return None;
    }
    Some((target, output))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResourceKind;
    use crate::state::NodeRecord;

    #[test]
    fn test_resolve_substitutes_settled_output() {
        let mut binder = OutputBinder::new();
        let mut outputs = BTreeMap::new();
        outputs.insert(String::from("endpoint"), String::from("db.internal:3306"));
        binder.record_settled("app-db", &outputs);

        let mut attrs = BTreeMap::new();
        attrs.insert(String::from("runtime"), String::from("python3.10"));
        attrs.insert(String::from("env.DB_HOST"), String::from("${app-db.endpoint}"));

        let resolved = binder.resolve("logger-fn", &attrs).expect("resolve");
        assert_eq!(resolved["env.DB_HOST"], "db.internal:3306");
        assert_eq!(resolved["runtime"], "python3.10");
    }

    #[test]
    fn test_resolve_fails_for_unsettled_target() {
        let binder = OutputBinder::new();
        let mut attrs = BTreeMap::new();
        attrs.insert(String::from("env.DB_HOST"), String::from("${app-db.endpoint}"));

        let err = binder.resolve("logger-fn", &attrs).expect_err("must fail");
        match err {
            StratoError::Plan(PlanError::UnresolvedReference { node, target, output }) => {
                assert_eq!(node, "logger-fn");
                assert_eq!(target, "app-db");
                assert_eq!(output, "endpoint");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_seeded_from_snapshot_serves_prior_outputs() {
        let mut snapshot = AppliedSnapshot::new("demo", "dev");
        let mut record = NodeRecord::new("core-network", ResourceKind::Network, "net-1");
        record
            .outputs
            .insert(String::from("id"), String::from("net-1"));
        snapshot.set_node(record);

        let binder = OutputBinder::seeded_from(&snapshot);
        assert_eq!(binder.output("core-network", "id"), Some("net-1"));
    }

    #[test]
    fn test_forget_drops_outputs() {
        let mut binder = OutputBinder::new();
        let mut outputs = BTreeMap::new();
        outputs.insert(String::from("id"), String::from("net-1"));
        binder.record_settled("core-network", &outputs);
        binder.forget("core-network");
        assert_eq!(binder.output("core-network", "id"), None);
    }

    #[test]
    fn test_plain_values_pass_through() {
        assert_eq!(parse_placeholder("10.0.0.0/16"), None);
        assert_eq!(parse_placeholder("${}"), None);
        assert_eq!(parse_placeholder("${no-dot}"), None);
        assert_eq!(
            parse_placeholder("${app-db.endpoint}"),
            Some(("app-db", "endpoint"))
        );
    }
}
