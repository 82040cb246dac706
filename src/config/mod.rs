//! Configuration module for the Strato topology compiler.
//!
//! This module handles all configuration-related functionality:
//! - Parsing and deserializing `strato.topology.yaml`
//! - Resolving file-sourced attributes and environment overrides
//! - Validation of topology declarations
//! - Computing topology hashes for change detection

mod spec;
mod parser;
mod validator;
mod hash;

pub use spec::{
    AttrValue, ProjectConfig, ResourceDecl, ResourceKind, StateBackend, StateConfig,
    TopologyConfig,
};
pub use parser::{DEFAULT_CONFIG_FILES, TopologyParser, find_config_file};
pub use validator::{TopologyValidator, ValidationResult};
pub use hash::TopologyHasher;
