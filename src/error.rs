//! Unified error handling for the relevo routing engine.
//!
//! Covers cluster construction failures, failover-specific conditions,
//! probe timeouts, and configuration errors. Transient probe failures are
//! recovered locally by the monitors and never reach routing callers.

use crate::config::ConfigError;
use std::fmt;
use thiserror::Error;

/// Main error type for relevo operations
#[derive(Debug, Error)]
pub enum RelevoError {
    /// A node handle could not be opened or pinged
    #[error("Connection error on node '{node}': {message}")]
    Connection { node: String, message: String },

    /// Promotion target is not a current replica of the cluster
    #[error("Invalid promotion target: '{node}' is not a current replica")]
    InvalidPromotionTarget { node: String },

    /// A failover attempt was triggered while another one is running
    #[error("Failover already in progress")]
    FailoverAlreadyInProgress,

    /// No healthy replica exists to promote
    #[error("No healthy replica available for promotion")]
    NoHealthyReplicaAvailable,

    /// A bounded-context operation exceeded its deadline
    #[error("Operation timed out: {operation}")]
    Timeout { operation: String },

    /// The underlying database handle reported a query failure
    #[error("Database error: {message}")]
    Database { message: String },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Internal errors (should not happen in normal operation)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Result type alias for relevo operations
pub type RelevoResult<T> = Result<T, RelevoError>;

/// Convenience methods for creating specific error types
impl RelevoError {
    /// Create a connection error naming the offending node
    pub fn connection<N: Into<String>, M: Into<String>>(node: N, message: M) -> Self {
        RelevoError::Connection {
            node: node.into(),
            message: message.into(),
        }
    }

    /// Create an invalid promotion target error
    pub fn invalid_promotion_target<N: Into<String>>(node: N) -> Self {
        RelevoError::InvalidPromotionTarget { node: node.into() }
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(operation: S) -> Self {
        RelevoError::Timeout {
            operation: operation.into(),
        }
    }

    /// Create a database error
    pub fn database<S: Into<String>>(message: S) -> Self {
        RelevoError::Database {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        RelevoError::Internal {
            message: message.into(),
        }
    }

    /// Check if this error is recoverable (can retry)
    pub fn is_recoverable(&self) -> bool {
        match self {
            RelevoError::Connection { .. } => true,
            RelevoError::Timeout { .. } => true,
            RelevoError::Database { .. } => true,
            RelevoError::FailoverAlreadyInProgress => true,
            _ => false,
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            RelevoError::Config(_) => ErrorSeverity::Critical,
            RelevoError::Internal { .. } => ErrorSeverity::Critical,
            RelevoError::NoHealthyReplicaAvailable => ErrorSeverity::Critical,
            RelevoError::Connection { .. } => ErrorSeverity::Warning,
            RelevoError::Timeout { .. } => ErrorSeverity::Warning,
            RelevoError::FailoverAlreadyInProgress => ErrorSeverity::Warning,
            _ => ErrorSeverity::Error,
        }
    }
}

/// Error severity levels for logging and monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Critical errors that require immediate operator attention
    Critical,
    /// Errors that affect functionality but don't crash the system
    Error,
    /// Warnings about potential issues
    Warning,
    /// Informational messages about recoverable issues
    Info,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSeverity::Critical => write!(f, "CRITICAL"),
            ErrorSeverity::Error => write!(f, "ERROR"),
            ErrorSeverity::Warning => write!(f, "WARNING"),
            ErrorSeverity::Info => write!(f, "INFO"),
        }
    }
}
