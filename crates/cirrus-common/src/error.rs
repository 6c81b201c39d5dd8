//! Unified error types for the Cirrus workspace.
//!
//! Every failure in the composition core is fatal: composition is a pure
//! function of its inputs, so an error always points at a declaration bug
//! rather than a transient condition. Nothing here is retryable.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum CirrusError {
    /// A resource attribute or configuration field is missing or malformed.
    #[error("invalid {field} on resource \"{resource}\": {message}")]
    Validation {
        /// Identifier of the offending resource.
        resource: String,
        /// Attribute or configuration field at fault.
        field: String,
        /// Description of what was expected versus found.
        message: String,
    },

    /// The declared references form a dependency cycle.
    #[error("dependency cycle detected between resources: {}", nodes.join(", "))]
    Cycle {
        /// Identifiers of the resources participating in the cycle.
        nodes: Vec<String>,
    },

    /// An artifact source could not be packaged.
    #[error("cannot package artifact at {path}: {message}")]
    Packaging {
        /// Source path that failed to package.
        path: PathBuf,
        /// Description of the failure.
        message: String,
    },

    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl CirrusError {
    /// Builds a [`CirrusError::Validation`] for `resource` and `field`.
    pub fn validation(
        resource: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Validation {
            resource: resource.into(),
            field: field.into(),
            message: message.into(),
        }
    }

    /// Builds a [`CirrusError::Packaging`] for `path`.
    pub fn packaging(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Packaging {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Builds a [`CirrusError::Io`] for `path`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, CirrusError>;
