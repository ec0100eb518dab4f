//! Error types for the Vault Identity Operator

use std::fmt;

use thiserror::Error;

use crate::vault::VaultError;

/// Result type alias using the operator's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Identity group operation that issued a remote call
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Create,
    Update,
    Read,
    Delete,
    Exists,
    Lookup,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Read => "read",
            Operation::Delete => "delete",
            Operation::Exists => "exists",
            Operation::Lookup => "lookup",
        };
        f.write_str(name)
    }
}

/// Operator error types
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Write to Vault failed
    #[error("Error writing identity group '{key}' ({operation}): {source}")]
    RemoteWrite {
        operation: Operation,
        key: String,
        #[source]
        source: VaultError,
    },

    /// Read from Vault failed
    #[error("Error reading identity group '{key}' ({operation}): {source}")]
    RemoteRead {
        operation: Operation,
        key: String,
        #[source]
        source: VaultError,
    },

    /// Delete in Vault failed
    #[error("Error deleting identity group '{key}': {source}")]
    RemoteDelete {
        key: String,
        #[source]
        source: VaultError,
    },

    /// Vault answered with a payload the operator cannot use
    #[error("Malformed response from '{path}': {reason}")]
    MalformedResponse { path: String, reason: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Finalizer error
    #[error("Finalizer error: {0}")]
    Finalizer(#[source] Box<kube::runtime::finalizer::Error<Error>>),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Create a malformed response error
    pub fn malformed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::MalformedResponse {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error came from a call against Vault
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Error::RemoteWrite { .. }
                | Error::RemoteRead { .. }
                | Error::RemoteDelete { .. }
                | Error::MalformedResponse { .. }
        )
    }
}
