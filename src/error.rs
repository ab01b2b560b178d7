//! Error types for vaultflow
//!
//! Centralized error handling using thiserror.

use std::path::PathBuf;

use thiserror::Error;

/// All error types that can occur in vaultflow
#[derive(Debug, Error)]
pub enum VaultflowError {
    /// Startup configuration is missing or unusable (fatal)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Malformed frontmatter, state or schedule content
    #[error("Parse error: {0}")]
    Parse(String),

    /// Destination filename already occupied during a move
    #[error("Destination already exists: {}", path.display())]
    Collision { path: PathBuf },

    /// Move between two stages that the workflow does not allow
    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// Produced item lacks a key its declared type requires
    #[error("Item of type '{item_type}' is missing required key '{field}'")]
    MissingField { item_type: String, field: String },

    /// Stage name that does not map to a workflow folder
    #[error("Unknown stage: {0}")]
    UnknownStage(String),

    /// Cron expression that cannot be parsed
    #[error("Invalid cron expression '{expression}': {reason}")]
    InvalidCron { expression: String, reason: String },

    /// An external collaborator (mail, mailbox, poster) failed; retried on next poll
    #[error("External action failed: {0}")]
    External(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl VaultflowError {
    /// Returns true if the error must abort startup
    pub fn is_fatal(&self) -> bool {
        matches!(self, VaultflowError::Configuration(_))
    }

    /// Returns true if the failed work should simply be retried on the next poll
    pub fn is_transient(&self) -> bool {
        matches!(self, VaultflowError::External(_))
    }
}

/// Result type alias for vaultflow operations
pub type Result<T> = std::result::Result<T, VaultflowError>;
