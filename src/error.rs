//! Error types for the iSCSI Target Operator
//!
//! Provides structured error types for all operator components including
//! cluster configuration access, declaration building, storage control and
//! the orchestration layer.

use thiserror::Error;

/// Exit code for successful completion
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code for failures caused by an invalid parameter
pub const EXIT_INVALID_PARAMETER: i32 = 1;
/// Exit code for failures caused by a failed action, e.g. a rejected volume
/// creation or a cluster configuration update that did not apply
pub const EXIT_ACTION_FAILED: i32 = 2;

/// Unified error type for the operator
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Validation Errors
    // =========================================================================
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid IQN format: missing ':' separator and target name in {iqn}")]
    MalformedIqn { iqn: String },

    // =========================================================================
    // Cluster Store Errors
    // =========================================================================
    #[error("Failed to read cluster configuration: {0}")]
    CibRead(String),

    #[error("Failed to update cluster configuration: {0}")]
    CibWrite(String),

    #[error("Cluster configuration changed between read and write (expected version {expected}, store reported: {reason})")]
    CibConflict { expected: String, reason: String },

    #[error("Malformed cluster configuration document: {0}")]
    CibParse(String),

    // =========================================================================
    // Target Management Errors
    // =========================================================================
    #[error("No free target ID in range 0..={max}")]
    TargetIdsExhausted { max: u8 },

    #[error("Target not found: {target}")]
    TargetNotFound { target: String },

    #[error("Logical unit {lun} not found for target {target}")]
    LogicalUnitNotFound { target: String, lun: u8 },

    // =========================================================================
    // Storage Controller Errors
    // =========================================================================
    #[error("Storage controller request failed: {0}")]
    StorageRequest(#[from] reqwest::Error),

    #[error("Storage operation failed: {operation} on {resource}: {reason}")]
    StorageOperationFailed {
        operation: String,
        resource: String,
        reason: String,
    },

    // =========================================================================
    // Orchestration Errors
    // =========================================================================
    #[error("Operation partially applied: {committed} was committed before {phase} failed: {reason}")]
    PartiallyApplied {
        phase: String,
        committed: String,
        reason: String,
    },

    // =========================================================================
    // Generic Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Map this error to the stable process exit code taxonomy.
    ///
    /// Validation failures map to `EXIT_INVALID_PARAMETER`; everything else
    /// is a failed action. Scripts depend on these values.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::InvalidParameter(_) | Error::MalformedIqn { .. } => EXIT_INVALID_PARAMETER,
            _ => EXIT_ACTION_FAILED,
        }
    }

    /// Whether the error is a cluster configuration version conflict.
    ///
    /// Conflicts are distinguished from generic write failures so a caller
    /// can decide to re-read and retry rather than treat them as fatal.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::CibConflict { .. })
    }

    /// Whether the error was raised before any external state was mutated.
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::InvalidParameter(_) | Error::MalformedIqn { .. })
    }
}

/// Result type alias for the operator
pub type Result<T> = std::result::Result<T, Error>;
