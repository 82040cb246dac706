//! Topology specification types.
//!
//! This module defines all the structs that map to the `strato.topology.yaml`
//! file. These types are designed to be declarative and fully describe the
//! desired state of a single-region cloud stack.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The root configuration structure for a Strato topology.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TopologyConfig {
    /// Project-level configuration.
    pub project: ProjectConfig,
    /// Snapshot backend configuration.
    pub state: StateConfig,
    /// List of resources to provision, in declaration order.
    pub resources: Vec<ResourceDecl>,
}

/// Project-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectConfig {
    /// Unique name for the project.
    pub name: String,
    /// Environment (e.g., "dev", "staging", "prod").
    #[serde(default = "default_environment")]
    pub environment: String,
    /// Provider region for the whole stack.
    #[serde(default)]
    pub region: Option<String>,
}

/// Snapshot backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateConfig {
    /// Backend type (local or s3).
    pub backend: StateBackend,
    /// S3 bucket name (required for s3 backend).
    #[serde(default)]
    pub bucket: Option<String>,
    /// S3 key prefix (optional).
    #[serde(default)]
    pub prefix: Option<String>,
    /// S3 region (optional, uses AWS default if not specified).
    #[serde(default)]
    pub region: Option<String>,
    /// Local snapshot file path (for local backend).
    #[serde(default)]
    pub path: Option<String>,
}

/// Snapshot backend types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StateBackend {
    /// Local file-based snapshot storage.
    #[default]
    Local,
    /// AWS S3-based snapshot storage.
    S3,
}

/// A single declared resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceDecl {
    /// Unique name for the resource within this topology.
    pub name: String,
    /// Resource kind.
    pub kind: ResourceKind,
    /// Declared attributes (insertion order irrelevant; kept sorted).
    #[serde(default)]
    pub attributes: BTreeMap<String, AttrValue>,
    /// Reference slots: slot name to target resource name.
    #[serde(default)]
    pub refs: BTreeMap<String, String>,
}

/// The closed set of resource kinds the compiler understands.
///
/// Per-kind behavior (slots, mutability, outputs, replace strategy) is
/// declared in the kind registry, not in per-resource code.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    /// An isolated virtual network.
    Network,
    /// A subnet within a network.
    Subnet,
    /// An ingress/reachability rule.
    SecurityRule,
    /// A virtual machine instance.
    ComputeInstance,
    /// A static public address bound to an instance.
    StaticAddress,
    /// A managed relational database instance.
    DatabaseInstance,
    /// A serverless function.
    Function,
    /// A public HTTP endpoint for a function.
    FunctionEndpoint,
}

/// A declared attribute value.
///
/// Attributes are opaque to the core: literals are carried as-is,
/// file-sourced values are read by the filesystem collaborator before graph
/// build, and output references are substituted with emergent values at
/// execution time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum AttrValue {
    /// A boolean literal.
    Bool(bool),
    /// An integer literal.
    Int(i64),
    /// A string literal.
    String(String),
    /// A value read from a local file, treated as an opaque string.
    File {
        /// Path to the file, relative to the topology file.
        file: String,
    },
    /// A reference to another resource's emergent output.
    Output {
        /// Name of the referenced resource.
        from: String,
        /// Output field of the referenced resource.
        output: String,
    },
}

impl AttrValue {
    /// Renders the value symbolically: literals as their string form, output
    /// references as `${node.output}` placeholders.
    ///
    /// Symbolic strings are what snapshots record and what the diff engine
    /// compares, so a dependency's changing emergent value does not by itself
    /// reclassify its dependers.
    ///
    /// # Panics
    ///
    /// Never panics; `File` values must be resolved to literals before
    /// rendering and are rendered as their path if not.
    #[must_use]
    pub fn render_symbolic(&self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::String(s) => s.clone(),
            Self::File { file } => format!("file:{file}"),
            Self::Output { from, output } => format!("${{{from}.{output}}}"),
        }
    }

    /// Returns the output reference target, if this value is one.
    #[must_use]
    pub fn as_output_ref(&self) -> Option<(&str, &str)> {
        match self {
            Self::Output { from, output } => Some((from.as_str(), output.as_str())),
            _ => None,
        }
    }

    /// Returns true if this value still needs filesystem resolution.
    #[must_use]
    pub const fn is_file(&self) -> bool {
        matches!(self, Self::File { .. })
    }
}

impl ResourceKind {
    /// All kinds, in dependency-typical order. Used for registry iteration.
    pub const ALL: &'static [Self] = &[
        Self::Network,
        Self::Subnet,
        Self::SecurityRule,
        Self::ComputeInstance,
        Self::StaticAddress,
        Self::DatabaseInstance,
        Self::Function,
        Self::FunctionEndpoint,
    ];

    /// Returns the kebab-case name of the kind, as written in topology files.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Subnet => "subnet",
            Self::SecurityRule => "security-rule",
            Self::ComputeInstance => "compute-instance",
            Self::StaticAddress => "static-address",
            Self::DatabaseInstance => "database-instance",
            Self::Function => "function",
            Self::FunctionEndpoint => "function-endpoint",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render_symbolic())
    }
}

// Default value functions

fn default_environment() -> String {
    String::from("dev")
}

impl TopologyConfig {
    /// Returns the fully qualified project name including environment.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}-{}", self.project.name, self.project.environment)
    }

    /// Returns resource names in declaration order.
    #[must_use]
    pub fn resource_names(&self) -> Vec<&str> {
        self.resources.iter().map(|r| r.name.as_str()).collect()
    }

    /// Looks up a resource declaration by name.
    #[must_use]
    pub fn resource(&self, name: &str) -> Option<&ResourceDecl> {
        self.resources.iter().find(|r| r.name == name)
    }
}

impl ResourceDecl {
    /// Returns the attribute value for a key, if declared.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&AttrValue> {
        self.attributes.get(key)
    }

    /// Returns all output references declared in this resource's attributes.
    #[must_use]
    pub fn output_refs(&self) -> Vec<(&str, &str)> {
        self.attributes
            .values()
            .filter_map(AttrValue::as_output_ref)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_roundtrip_names() {
        for kind in ResourceKind::ALL {
            let yaml = format!("{}\n", kind.as_str());
            let parsed: ResourceKind =
                serde_yaml::from_str(&yaml).expect("kind name should parse");
            assert_eq!(parsed, *kind);
        }
    }

    #[test]
    fn test_attr_value_literal_forms() {
        let v: AttrValue = serde_yaml::from_str("8080").expect("int should parse");
        assert_eq!(v, AttrValue::Int(8080));

        let v: AttrValue = serde_yaml::from_str("t2.micro").expect("string should parse");
        assert_eq!(v, AttrValue::String(String::from("t2.micro")));

        let v: AttrValue = serde_yaml::from_str("true").expect("bool should parse");
        assert_eq!(v, AttrValue::Bool(true));
    }

    #[test]
    fn test_attr_value_output_ref() {
        let v: AttrValue = serde_yaml::from_str("{ from: app-db, output: endpoint }")
            .expect("output ref should parse");
        assert_eq!(v.as_output_ref(), Some(("app-db", "endpoint")));
        assert_eq!(v.render_symbolic(), "${app-db.endpoint}");
    }

    #[test]
    fn test_attr_value_file() {
        let v: AttrValue =
            serde_yaml::from_str("{ file: keys/id_rsa.pub }").expect("file ref should parse");
        assert!(v.is_file());
    }
}
