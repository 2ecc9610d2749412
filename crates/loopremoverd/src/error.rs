//! Error types for loopremoverd.
//!
//! Store failures are kept in their own enum so the writer can decide whether
//! a failed commit is worth retrying without looking at the rest of the
//! daemon's errors.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for loopremoverd operations.
pub type Result<T> = std::result::Result<T, LoopRemoverError>;

/// Errors raised by a [`PortStatusStore`](crate::store::PortStatusStore).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The store could not be reached.
    #[error("Store connection failed: {message}")]
    Connection {
        /// Error message.
        message: String,
    },

    /// A command was rejected or failed while executing.
    #[error("Store command failed: {operation}: {message}")]
    Command {
        /// The operation that failed (e.g., "apply_port_statuses").
        operation: String,
        /// Error message.
        message: String,
    },

    /// A concurrent writer touched the same records.
    #[error("Store write conflict on {key}")]
    Conflict {
        /// The record key involved.
        key: String,
    },

    /// The store answered with something the client cannot interpret.
    #[error("Unexpected store reply: {message}")]
    InvalidReply {
        /// Error message.
        message: String,
    },
}

impl StoreError {
    /// Creates a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a command error.
    pub fn command(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Command {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates a conflict error.
    pub fn conflict(key: impl Into<String>) -> Self {
        Self::Conflict { key: key.into() }
    }

    /// Creates an invalid reply error.
    pub fn invalid_reply(message: impl Into<String>) -> Self {
        Self::InvalidReply {
            message: message.into(),
        }
    }

    /// Returns true if the same commit may succeed when tried again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Connection { .. } | StoreError::Conflict { .. })
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_refusal() || err.is_connection_dropped() || err.is_timeout() {
            StoreError::connection(err.to_string())
        } else if err.kind() == redis::ErrorKind::TypeError {
            StoreError::invalid_reply(err.to_string())
        } else {
            StoreError::command(err.category(), err.to_string())
        }
    }
}

/// Errors that can occur in loopremoverd.
#[derive(Debug, Error)]
pub enum LoopRemoverError {
    /// Configuration validation error.
    #[error("Invalid configuration for {field}: {message}")]
    InvalidConfig {
        /// The field that failed validation.
        field: String,
        /// Error message.
        message: String,
    },

    /// Configuration file could not be parsed.
    #[error("Failed to parse configuration file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Configuration file could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Persistent store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The engine was shut down.
    #[error("Loop remover is shut down")]
    Shutdown,
}

impl LoopRemoverError {
    /// Creates an invalid configuration error.
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<redis::RedisError> for LoopRemoverError {
    fn from(err: redis::RedisError) -> Self {
        Self::Store(err.into())
    }
}
