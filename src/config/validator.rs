//! Topology validation.
//!
//! This module provides validation of topology declarations, ensuring names
//! and per-kind attributes are sane before the graph is built. Structural
//! checks (unknown references, incompatible kinds, cycles) belong to the
//! graph builder and resolver, not here.

use crate::error::{ConfigError, Result, StratoError};
use std::collections::HashSet;
use tracing::debug;

use super::spec::{AttrValue, ResourceDecl, ResourceKind, StateBackend, TopologyConfig};

/// Validator for topology declarations.
#[derive(Debug, Default)]
pub struct TopologyValidator;

/// Subnet tiers the provider understands.
const KNOWN_SUBNET_TIERS: &[&str] = &["public", "isolated"];

/// Protocols accepted by security rules.
const KNOWN_PROTOCOLS: &[&str] = &["tcp", "udp"];

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl TopologyValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a topology declaration.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn validate(&self, config: &TopologyConfig) -> Result<ValidationResult> {
        let mut result = ValidationResult::default();

        Self::validate_project(&config.project, &mut result);
        Self::validate_state(&config.state, &mut result);
        Self::validate_resources(&config.resources, &mut result);

        if result.errors.is_empty() {
            debug!("Topology validation passed");
            Ok(result)
        } else {
            let first_error = &result.errors[0];
            Err(StratoError::Config(ConfigError::ValidationError {
                message: first_error.message.clone(),
                field: Some(first_error.field.clone()),
            }))
        }
    }

    /// Validates project configuration.
    fn validate_project(project: &super::spec::ProjectConfig, result: &mut ValidationResult) {
        if project.name.is_empty() {
            result.errors.push(ValidationError {
                field: String::from("project.name"),
                message: String::from("Project name cannot be empty"),
            });
        } else if !is_valid_name(&project.name) {
            result.errors.push(ValidationError {
                field: String::from("project.name"),
                message: format!(
                    "Project name '{}' is invalid. Must be lowercase alphanumeric with hyphens.",
                    project.name
                ),
            });
        }

        if project.environment.is_empty() {
            result.errors.push(ValidationError {
                field: String::from("project.environment"),
                message: String::from("Environment cannot be empty"),
            });
        }
    }

    /// Validates state configuration.
    fn validate_state(state: &super::spec::StateConfig, result: &mut ValidationResult) {
        match state.backend {
            StateBackend::S3 => {
                if state.bucket.is_none() || state.bucket.as_ref().is_some_and(String::is_empty) {
                    result.errors.push(ValidationError {
                        field: String::from("state.bucket"),
                        message: String::from("S3 bucket name is required when using S3 backend"),
                    });
                }
            }
            StateBackend::Local => {
                // Local backend is always valid
            }
        }
    }

    /// Validates all resource declarations.
    fn validate_resources(resources: &[ResourceDecl], result: &mut ValidationResult) {
        if resources.is_empty() {
            result
                .warnings
                .push(String::from("No resources defined in topology"));
            return;
        }

        let mut seen_names = HashSet::new();

        for (i, resource) in resources.iter().enumerate() {
            let prefix = format!("resources[{i}]");

            if seen_names.contains(&resource.name) {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.name"),
                    message: format!("Duplicate resource name: {}", resource.name),
                });
            } else {
                seen_names.insert(&resource.name);
            }

            if !is_valid_name(&resource.name) {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.name"),
                    message: format!(
                        "Resource name '{}' is invalid. Must be lowercase alphanumeric with hyphens.",
                        resource.name
                    ),
                });
            }

            Self::validate_attributes(resource, &prefix, result);
        }
    }

    /// Validates per-kind attribute sanity.
    fn validate_attributes(resource: &ResourceDecl, prefix: &str, result: &mut ValidationResult) {
        match resource.kind {
            ResourceKind::Network => {
                Self::require_attr(resource, "cidr", prefix, result);
            }
            ResourceKind::Subnet => {
                if let Some(AttrValue::String(tier)) = resource.attribute("tier") {
                    if !KNOWN_SUBNET_TIERS.contains(&tier.as_str()) {
                        result.errors.push(ValidationError {
                            field: format!("{prefix}.attributes.tier"),
                            message: format!(
                                "Unknown subnet tier '{tier}'. Must be one of: {}",
                                KNOWN_SUBNET_TIERS.join(", ")
                            ),
                        });
                    }
                } else {
                    Self::require_attr(resource, "tier", prefix, result);
                }
            }
            ResourceKind::SecurityRule => {
                match resource.attribute("port") {
                    Some(AttrValue::Int(port)) => {
                        if !(1..=65535).contains(port) {
                            result.errors.push(ValidationError {
                                field: format!("{prefix}.attributes.port"),
                                message: format!("Port {port} is out of range (1-65535)"),
                            });
                        }
                    }
                    Some(_) => {
                        result.errors.push(ValidationError {
                            field: format!("{prefix}.attributes.port"),
                            message: String::from("Port must be an integer"),
                        });
                    }
                    None => Self::require_attr(resource, "port", prefix, result),
                }

                if let Some(AttrValue::String(protocol)) = resource.attribute("protocol") {
                    if !KNOWN_PROTOCOLS.contains(&protocol.as_str()) {
                        result.warnings.push(format!(
                            "{prefix}.attributes.protocol: Unknown protocol '{protocol}'"
                        ));
                    }
                }
            }
            ResourceKind::ComputeInstance => {
                Self::require_attr(resource, "instance_type", prefix, result);
            }
            ResourceKind::DatabaseInstance => {
                Self::require_attr(resource, "engine", prefix, result);
                Self::require_attr(resource, "engine_version", prefix, result);
                Self::require_attr(resource, "database_name", prefix, result);

                if matches!(
                    resource.attribute("master_password"),
                    Some(AttrValue::String(_))
                ) {
                    result.warnings.push(format!(
                        "{prefix}.attributes.master_password: Plaintext password in topology file. \
                         Consider sourcing it from a file outside version control."
                    ));
                }
            }
            ResourceKind::Function => {
                Self::require_attr(resource, "runtime", prefix, result);

                if let Some(AttrValue::Int(timeout)) = resource.attribute("timeout_seconds") {
                    if *timeout <= 0 {
                        result.errors.push(ValidationError {
                            field: format!("{prefix}.attributes.timeout_seconds"),
                            message: String::from("Function timeout must be at least 1 second"),
                        });
                    }
                }
            }
            ResourceKind::FunctionEndpoint => {
                if let Some(AttrValue::String(auth)) = resource.attribute("auth") {
                    if auth != "none" && auth != "token" {
                        result.errors.push(ValidationError {
                            field: format!("{prefix}.attributes.auth"),
                            message: format!("Unknown auth mode '{auth}'. Must be none or token"),
                        });
                    }
                }
            }
            ResourceKind::StaticAddress => {
                // No required attributes
            }
        }
    }

    /// Records an error if a required attribute is absent.
    fn require_attr(
        resource: &ResourceDecl,
        key: &str,
        prefix: &str,
        result: &mut ValidationResult,
    ) {
        if resource.attribute(key).is_none() {
            result.errors.push(ValidationError {
                field: format!("{prefix}.attributes.{key}"),
                message: format!(
                    "Resource '{}' of kind {} requires attribute '{key}'",
                    resource.name, resource.kind
                ),
            });
        }
    }
}

/// Validates that a name follows the naming convention.
/// Names must be lowercase alphanumeric with hyphens, starting with a letter.
fn is_valid_name(name: &str) -> bool {
    if name.is_empty() {
        return false;
    }

    let mut chars = name.chars();

    // First character must be a letter
    if let Some(first) = chars.next()
        && !first.is_ascii_lowercase()
    {
        return false;
    }

    // Rest must be lowercase alphanumeric or hyphen
    for c in chars {
        if !c.is_ascii_lowercase() && !c.is_ascii_digit() && c != '-' {
            return false;
        }
    }

    // Cannot end with hyphen
    if name.ends_with('-') {
        return false;
    }

    // Cannot have consecutive hyphens
    if name.contains("--") {
        return false;
    }

    true
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::spec::{ProjectConfig, StateConfig};
    use std::collections::BTreeMap;

    fn minimal_config(resources: Vec<ResourceDecl>) -> TopologyConfig {
        TopologyConfig {
            project: ProjectConfig {
                name: String::from("test-stack"),
                environment: String::from("dev"),
                region: None,
            },
            state: StateConfig {
                backend: StateBackend::Local,
                bucket: None,
                prefix: None,
                region: None,
                path: None,
            },
            resources,
        }
    }

    fn decl(name: &str, kind: ResourceKind, attrs: &[(&str, AttrValue)]) -> ResourceDecl {
        ResourceDecl {
            name: String::from(name),
            kind,
            attributes: attrs
                .iter()
                .map(|(k, v)| ((*k).to_string(), v.clone()))
                .collect(),
            refs: BTreeMap::new(),
        }
    }

    #[test]
    fn test_valid_name() {
        assert!(is_valid_name("core-network"));
        assert!(is_valid_name("app-db-2"));
        assert!(is_valid_name("a"));
    }

    #[test]
    fn test_invalid_name() {
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("Core-Network")); // uppercase
        assert!(!is_valid_name("2-tier")); // starts with number
        assert!(!is_valid_name("app_db")); // underscore
        assert!(!is_valid_name("db-")); // ends with hyphen
        assert!(!is_valid_name("app--db")); // consecutive hyphens
    }

    #[test]
    fn test_duplicate_resource_name_rejected() {
        let config = minimal_config(vec![
            decl(
                "net",
                ResourceKind::Network,
                &[("cidr", AttrValue::String(String::from("10.0.0.0/16")))],
            ),
            decl(
                "net",
                ResourceKind::Network,
                &[("cidr", AttrValue::String(String::from("10.1.0.0/16")))],
            ),
        ]);

        let validator = TopologyValidator::new();
        assert!(validator.validate(&config).is_err());
    }

    #[test]
    fn test_port_out_of_range_rejected() {
        let config = minimal_config(vec![decl(
            "bad-rule",
            ResourceKind::SecurityRule,
            &[("port", AttrValue::Int(70000))],
        )]);

        let validator = TopologyValidator::new();
        assert!(validator.validate(&config).is_err());
    }

    #[test]
    fn test_plaintext_password_warns() {
        let config = minimal_config(vec![decl(
            "app-db",
            ResourceKind::DatabaseInstance,
            &[
                ("engine", AttrValue::String(String::from("mysql"))),
                ("engine_version", AttrValue::String(String::from("8.0.34"))),
                (
                    "database_name",
                    AttrValue::String(String::from("task_logger")),
                ),
                ("master_password", AttrValue::String(String::from("password"))),
            ],
        )]);

        let validator = TopologyValidator::new();
        let result = validator.validate(&config).expect("valid topology");
        assert_eq!(result.warning_count(), 1);
    }

    #[test]
    fn test_missing_required_attribute_rejected() {
        let config = minimal_config(vec![decl("net", ResourceKind::Network, &[])]);

        let validator = TopologyValidator::new();
        assert!(validator.validate(&config).is_err());
    }
}
