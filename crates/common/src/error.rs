//! Error types for Refshot

use thiserror::Error;

/// Result type alias using Refshot Error
pub type Result<T> = std::result::Result<T, Error>;

/// Refshot error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Test discovery failed: {0}")]
    Discovery(String),

    #[error("Test engine failed: {0}")]
    Engine(String),

    #[error("Identity collision: {id} is claimed by both '{first}' and '{second}'")]
    IdentityCollision {
        id: String,
        first: String,
        second: String,
    },

    #[error("Resource not found: {kind} with id {id}")]
    NotFound { kind: String, id: String },

    #[error("Unknown browser: {0}")]
    UnknownBrowser(String),

    #[error("Failed to write reference image for {test_id} state '{state_name}': {reason}")]
    ImageWrite {
        test_id: String,
        state_name: String,
        reason: String,
    },

    #[error("Reference update failed for {}", format_failures(.0))]
    ReferenceUpdate(Vec<(String, String)>),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

fn format_failures(failures: &[(String, String)]) -> String {
    failures
        .iter()
        .map(|(test_id, state)| format!("{}:{}", test_id, state))
        .collect::<Vec<_>>()
        .join(", ")
}

impl Error {
    /// Shorthand for a missing resource of the given kind
    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Error::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }
}
