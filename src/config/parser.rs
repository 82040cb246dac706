//! Topology parser for loading and resolving configuration files.
//!
//! This module handles loading the topology from YAML, applying environment
//! variable overrides, and resolving file-sourced attributes (the filesystem
//! collaborator: public keys, startup scripts) into opaque literal strings.

use crate::error::{ConfigError, Result, StratoError};
use std::path::Path;
use tracing::{debug, info};

use super::spec::{AttrValue, TopologyConfig};

/// Topology parser for loading desired-state descriptions.
#[derive(Debug, Default)]
pub struct TopologyParser {
    /// Base path for resolving relative paths.
    base_path: Option<std::path::PathBuf>,
}

impl TopologyParser {
    /// Creates a new topology parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads a topology from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<TopologyConfig> {
        let path = path.as_ref();
        info!("Loading topology from: {}", path.display());

        if !path.exists() {
            return Err(StratoError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            StratoError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses a topology from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<TopologyConfig> {
        debug!("Parsing YAML topology");

        let config: TopologyConfig = serde_yaml::from_str(content).map_err(|e| {
            let location = source.map(|p| p.display().to_string());
            StratoError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location,
            })
        })?;

        debug!(
            "Successfully parsed topology for project: {}",
            config.project.name
        );
        Ok(config)
    }

    /// Loads a topology, applies environment overrides, and resolves
    /// file-sourced attributes.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or a file
    /// attribute cannot be resolved.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<TopologyConfig> {
        let mut config = self.load_file(path)?;

        Self::apply_env_overrides(&mut config);
        self.resolve_file_attributes(&mut config)?;

        Ok(config)
    }

    /// Applies environment variable overrides to the topology.
    fn apply_env_overrides(config: &mut TopologyConfig) {
        // Project overrides
        if let Ok(name) = std::env::var("STRATO_PROJECT_NAME") {
            debug!("Overriding project.name from environment");
            config.project.name = name;
        }

        if let Ok(env) = std::env::var("STRATO_PROJECT_ENVIRONMENT") {
            debug!("Overriding project.environment from environment");
            config.project.environment = env;
        }

        if let Ok(region) = std::env::var("STRATO_PROJECT_REGION") {
            debug!("Overriding project.region from environment");
            config.project.region = Some(region);
        }

        // State overrides
        if let Ok(bucket) = std::env::var("STRATO_STATE_BUCKET") {
            debug!("Overriding state.bucket from environment");
            config.state.bucket = Some(bucket);
        }

        if let Ok(prefix) = std::env::var("STRATO_STATE_PREFIX") {
            debug!("Overriding state.prefix from environment");
            config.state.prefix = Some(prefix);
        }
    }

    /// Resolves `{file: ...}` attributes into literal strings.
    ///
    /// Relative paths are resolved against the topology file's directory.
    /// The content is treated as opaque: no interpretation beyond UTF-8.
    ///
    /// # Errors
    ///
    /// Returns an error if a referenced file cannot be read.
    pub fn resolve_file_attributes(&self, config: &mut TopologyConfig) -> Result<()> {
        let base = self
            .base_path
            .clone()
            .unwrap_or_else(|| std::path::PathBuf::from("."));

        for resource in &mut config.resources {
            for value in resource.attributes.values_mut() {
                if let AttrValue::File { file } = value {
                    let path = if Path::new(file.as_str()).is_absolute() {
                        std::path::PathBuf::from(file.as_str())
                    } else {
                        base.join(file.as_str())
                    };

                    debug!(
                        "Resolving file attribute for '{}': {}",
                        resource.name,
                        path.display()
                    );

                    let content = std::fs::read_to_string(&path).map_err(|e| {
                        StratoError::Config(ConfigError::AttributeFileError {
                            node: resource.name.clone(),
                            path: path.clone(),
                            message: e.to_string(),
                        })
                    })?;

                    *value = AttrValue::String(content);
                }
            }
        }

        Ok(())
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| std::path::PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                StratoError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }

    /// Gets the provider API base URL from environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is not set.
    pub fn get_provider_url() -> Result<String> {
        std::env::var("STRATO_PROVIDER_URL").map_err(|_| {
            StratoError::Config(ConfigError::MissingEnvVar {
                name: String::from("STRATO_PROVIDER_URL"),
            })
        })
    }

    /// Gets the provider API token from environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is not set.
    pub fn get_provider_token() -> Result<String> {
        std::env::var("STRATO_PROVIDER_TOKEN").map_err(|_| {
            StratoError::Config(ConfigError::MissingEnvVar {
                name: String::from("STRATO_PROVIDER_TOKEN"),
            })
        })
    }
}

/// Default topology file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &[
    "strato.topology.yaml",
    "strato.topology.yml",
    "topology.yaml",
    "topology.yml",
];

/// Finds the topology file in the current directory or parent directories.
///
/// # Errors
///
/// Returns an error if no topology file is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<std::path::PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found topology file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(StratoError::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_topology() {
        let yaml = r"
project:
  name: test-stack
state:
  backend: local
resources: []
";
        let parser = TopologyParser::new();
        let result = parser.parse_yaml(yaml, None);
        assert!(result.is_ok());

        let config = result.unwrap();
        assert_eq!(config.project.name, "test-stack");
        assert_eq!(config.project.environment, "dev");
    }

    #[test]
    fn test_parse_full_topology() {
        let yaml = r#"
project:
  name: task-logger
  environment: prod
  region: eu-west-1

state:
  backend: s3
  bucket: strato-snapshots
  prefix: task-logger/prod

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
      cidr_mask: 28

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
      timeout_seconds: 30
      env.DB_HOST: { from: app-db, output: endpoint }
"#;
        let parser = TopologyParser::new();
        let result = parser.parse_yaml(yaml, None);
        assert!(result.is_ok());

        let config = result.unwrap();
        assert_eq!(config.project.name, "task-logger");
        assert_eq!(config.resources.len(), 4);
        assert_eq!(config.resources[2].name, "app-db");
        assert_eq!(
            config.resources[3]
                .attribute("env.DB_HOST")
                .and_then(AttrValue::as_output_ref),
            Some(("app-db", "endpoint"))
        );
    }

    #[test]
    fn test_resolve_file_attribute() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("startup.sh"), "#!/bin/sh\necho hi\n")
            .expect("write script");

        let yaml = r"
project:
  name: test-stack
state:
  backend: local
resources:
  - name: web
    kind: compute-instance
    attributes:
      user_data: { file: startup.sh }
";
        let parser = TopologyParser::new().with_base_path(dir.path());
        let mut config = parser.parse_yaml(yaml, None).expect("parse");
        parser
            .resolve_file_attributes(&mut config)
            .expect("resolve files");

        assert_eq!(
            config.resources[0].attribute("user_data"),
            Some(&AttrValue::String(String::from("#!/bin/sh\necho hi\n")))
        );
    }

    #[test]
    fn test_missing_file_attribute_errors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let yaml = r"
project:
  name: test-stack
state:
  backend: local
resources:
  - name: web
    kind: compute-instance
    attributes:
      user_data: { file: does-not-exist.sh }
";
        let parser = TopologyParser::new().with_base_path(dir.path());
        let mut config = parser.parse_yaml(yaml, None).expect("parse");
        let result = parser.resolve_file_attributes(&mut config);
        assert!(result.is_err());
    }
}
