//! Error types for the ratetree engine.

use thiserror::Error;

/// Main error type for ratetree operations.
///
/// Admission outcomes (accepted, rejected, timed out) are never errors; this
/// type only covers configuration, structural and provider failures.
#[derive(Error, Debug)]
pub enum RateTreeError {
    /// A rate or bandwidth was configured with out-of-range values
    #[error("Invalid rate: {0}")]
    InvalidRate(String),

    /// The node tree was used inconsistently
    #[error("Tree structure error: {0}")]
    Structure(String),

    /// A custom algorithm name has no registered constructor
    #[error("Unknown bandwidth algorithm: {0}")]
    UnknownAlgorithm(String),

    /// A matcher or limiter provider failed for a node
    #[error("Provider failed for node '{node}': {message}")]
    Provider { node: String, message: String },

    /// Configuration loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RateTreeError {
    /// Build a provider error for the named node.
    pub fn provider(node: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            node: node.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for ratetree operations.
pub type Result<T> = std::result::Result<T, RateTreeError>;
