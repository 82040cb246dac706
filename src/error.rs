//! Error types for the Strato topology compiler.
//!
//! This module provides a comprehensive error hierarchy for all operations
//! in the provisioning lifecycle: configuration, graph construction, snapshot
//! management, provider API, planning, and plan execution.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the Strato topology compiler.
#[derive(Debug, Error)]
pub enum StratoError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Graph construction and ordering errors.
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// Snapshot management errors.
    #[error("Snapshot error: {0}")]
    State(#[from] StateError),

    /// Provider API errors.
    #[error("Provider API error: {0}")]
    Provider(#[from] ProviderError),

    /// Planning and execution errors.
    #[error("Plan error: {0}")]
    Plan(#[from] PlanError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The topology file was not found.
    #[error("Topology file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The topology file could not be parsed.
    #[error("Failed to parse topology: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Topology validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// Environment variable is missing.
    #[error("Missing environment variable: {name}")]
    MissingEnvVar {
        /// Name of the missing variable.
        name: String,
    },

    /// A file-sourced attribute could not be read.
    #[error("Failed to read attribute file for '{node}': {path}: {message}")]
    AttributeFileError {
        /// Node declaring the file attribute.
        node: String,
        /// Path that could not be read.
        path: PathBuf,
        /// Underlying error description.
        message: String,
    },
}

/// Graph construction and ordering errors.
///
/// These are always raised before any provider call is issued.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Two resources declare the same name.
    #[error("Duplicate resource name: {name}")]
    DuplicateNode {
        /// The duplicated name.
        name: String,
    },

    /// A reference slot names a resource that does not exist.
    #[error("Resource '{node}' references unknown resource '{target}' in slot '{slot}'")]
    UnknownReference {
        /// Node declaring the reference.
        node: String,
        /// Slot name.
        slot: String,
        /// The missing target name.
        target: String,
    },

    /// A reference slot targets a resource of an incompatible kind.
    #[error(
        "Resource '{node}' slot '{slot}' cannot accept '{target}' of kind {target_kind} \
         (expected one of: {expected})"
    )]
    IncompatibleReference {
        /// Node declaring the reference.
        node: String,
        /// Slot name.
        slot: String,
        /// The target name.
        target: String,
        /// The target's kind.
        target_kind: String,
        /// Kinds the slot accepts.
        expected: String,
    },

    /// A slot name is not declared for the node's kind.
    #[error("Resource '{node}' of kind {kind} has no reference slot named '{slot}'")]
    UnknownSlot {
        /// Node declaring the reference.
        node: String,
        /// The node's kind.
        kind: String,
        /// The undeclared slot name.
        slot: String,
    },

    /// An output reference names an output the target kind does not emit.
    #[error("Resource '{node}' references output '{output}' of '{target}', which does not emit it")]
    UnknownOutput {
        /// Node declaring the output reference.
        node: String,
        /// Target node name.
        target: String,
        /// The unknown output field.
        output: String,
    },

    /// The graph contains a dependency cycle.
    #[error("Dependency cycle detected: {}", members.join(" -> "))]
    Cycle {
        /// Names of the resources forming the cycle, in order.
        members: Vec<String>,
    },
}

/// Snapshot management errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// Snapshot is corrupted.
    #[error("Snapshot is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// Snapshot lock acquisition failed.
    #[error("Failed to acquire snapshot lock: {message}")]
    LockFailed {
        /// Description of the lock failure.
        message: String,
    },

    /// Snapshot lock is held by another process.
    #[error("Snapshot is locked by another process (lock holder: {holder}, since: {since})")]
    LockedByOther {
        /// Identifier of the lock holder.
        holder: String,
        /// When the lock was acquired.
        since: String,
    },

    /// Backend storage error.
    #[error("Snapshot backend error: {message}")]
    BackendError {
        /// Description of the backend error.
        message: String,
    },

    /// Serialization error.
    #[error("Snapshot serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },

    /// Snapshot version mismatch.
    #[error("Snapshot version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Expected snapshot version.
        expected: String,
        /// Found snapshot version.
        found: String,
    },
}

/// Provider API errors.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Authentication failed. Permanent.
    #[error("Provider authentication failed: {message}")]
    AuthenticationFailed {
        /// Description of the auth failure.
        message: String,
    },

    /// API request failed with a non-retryable status. Permanent.
    #[error("Provider API request failed: {status} - {message}")]
    ApiRequestFailed {
        /// HTTP status code.
        status: u16,
        /// Error message from the API.
        message: String,
    },

    /// Rate limited. Transient.
    #[error("Provider API rate limited, retry after {retry_after_secs} seconds")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// Resource not found on the provider. Permanent.
    #[error("Resource not found: {resource_id}")]
    ResourceNotFound {
        /// ID of the missing resource.
        resource_id: String,
    },

    /// Network error. Transient.
    #[error("Network error communicating with provider: {message}")]
    NetworkError {
        /// Description of the network error.
        message: String,
    },

    /// Invalid response from the API. Permanent.
    #[error("Invalid response from provider API: {message}")]
    InvalidResponse {
        /// Description of the response issue.
        message: String,
    },

    /// The resource reported a terminal error state. Permanent.
    #[error("Resource {resource_id} entered error state: {message}")]
    ResourceErrored {
        /// ID of the resource.
        resource_id: String,
        /// Provider-reported error description.
        message: String,
    },

    /// Timeout waiting for a resource to settle. Permanent: the settle
    /// wait already polls for the whole window, so the step fails rather
    /// than waiting the window again.
    #[error("Timeout waiting for resource {resource_id} to settle")]
    SettleTimeout {
        /// ID of the resource.
        resource_id: String,
    },
}

/// Planning and execution errors.
#[derive(Debug, Error)]
pub enum PlanError {
    /// A step referenced an emergent value that has not settled.
    ///
    /// This indicates an ordering defect, never a user error.
    #[error("Unresolved reference in step for '{node}': output '{target}.{output}' has not settled")]
    UnresolvedReference {
        /// Node whose step hit the unresolved reference.
        node: String,
        /// Referenced node name.
        target: String,
        /// Referenced output field.
        output: String,
    },

    /// Maximum retry attempts exceeded for a step.
    #[error("Maximum retry attempts ({attempts}) exceeded for '{node}'")]
    MaxRetriesExceeded {
        /// Number of attempts made.
        attempts: u32,
        /// Resource whose step failed.
        node: String,
    },

    /// Execution was aborted between steps.
    #[error("Apply aborted: {reason}")]
    Aborted {
        /// Reason for abort.
        reason: String,
    },

    /// Some steps failed or were skipped.
    #[error("Apply incomplete: {done} done, {failed} failed, {skipped} skipped")]
    PartialFailure {
        /// Steps that settled.
        done: usize,
        /// Steps that failed.
        failed: usize,
        /// Steps never attempted.
        skipped: usize,
    },
}

/// Result type alias for Strato operations.
pub type Result<T> = std::result::Result<T, StratoError>;

impl StratoError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Provider(e) => e.is_transient(),
            Self::State(StateError::LockFailed { .. }) => true,
            _ => false,
        }
    }

    /// Returns true if this error was raised before any provider mutation.
    ///
    /// Used to map validation and cycle failures to their own exit code,
    /// distinct from partial-apply failures.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Graph(_))
    }

    /// Returns the suggested retry delay in seconds, if applicable.
    #[must_use]
    pub const fn retry_delay_secs(&self) -> Option<u64> {
        match self {
            Self::Provider(ProviderError::RateLimited { retry_after_secs }) => {
                Some(*retry_after_secs)
            }
            Self::Provider(
                ProviderError::NetworkError { .. } | ProviderError::ApiRequestFailed { .. },
            ) => Some(5),
            Self::State(StateError::LockFailed { .. }) => Some(2),
            _ => None,
        }
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a validation error without a specific field.
    #[must_use]
    pub fn validation_general(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: None,
        }
    }
}

impl StateError {
    /// Creates a backend error with the given message.
    #[must_use]
    pub fn backend(message: impl Into<String>) -> Self {
        Self::BackendError {
            message: message.into(),
        }
    }

    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }
}

impl ProviderError {
    /// Creates an API request error.
    #[must_use]
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiRequestFailed {
            status,
            message: message.into(),
        }
    }

    /// Creates a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }

    /// Returns true if this provider error is transient (retryable).
    ///
    /// Server-side failures (5xx) count as transient; everything the client
    /// caused (auth, bad request, missing resource) is permanent.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::NetworkError { .. } => true,
            Self::ApiRequestFailed { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
