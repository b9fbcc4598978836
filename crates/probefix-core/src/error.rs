//! Error types for probefix.

use thiserror::Error;

/// Errors returned by a patch client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PatchError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("conflicting update: {0}")]
    Conflict(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("patch failed: {0}")]
    Other(String),
}

impl PatchError {
    /// Whether the delivery layer should retry the pass with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PatchError::Transient(_) | PatchError::Conflict(_))
    }

    /// The object disappeared between delivery and patch.
    pub fn is_benign(&self) -> bool {
        matches!(self, PatchError::NotFound(_))
    }
}

/// Errors that abort a reconciliation pass.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("unsupported workload kind: {0}")]
    UnsupportedKind(String),

    #[error("object is missing field {0}")]
    MissingField(&'static str),

    #[error(transparent)]
    Patch(#[from] PatchError),
}

impl ReconcileError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ReconcileError::Patch(e) => e.is_retryable(),
            _ => false,
        }
    }

    pub fn is_benign(&self) -> bool {
        match self {
            ReconcileError::Patch(e) => e.is_benign(),
            _ => false,
        }
    }
}

/// Errors loading or validating controller configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid duration for {field}: {value:?}")]
    Duration { field: &'static str, value: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}
