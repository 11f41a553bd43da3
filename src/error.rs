//! Custom error types for plansync.
//!
//! This module provides structured error types that enable per-item
//! isolation during batch reconciliation: decode and linkage failures
//! are scoped to a single record, while snapshot failures abort the
//! current cycle.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for plansync operations
#[derive(Error, Debug)]
pub enum PlanSyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Failed to load configuration
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        path: Option<PathBuf>,
    },

    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfig { field: String, reason: String },

    // =========================================================================
    // Decode Errors
    // =========================================================================
    /// Required field missing or malformed while building an entity from a
    /// raw record. Carries the record number for diagnostics.
    #[error("Failed to decode record {record_no}: {reason}")]
    Decode { record_no: String, reason: String },

    /// A bracketed title fragment matched no known label kind
    #[error("Unrecognized label content: [{content}]")]
    LabelParse { content: String },

    /// Value-object invariant violated
    #[error("Validation failed: {field} - {reason}")]
    Validation { field: String, reason: String },

    // =========================================================================
    // Linkage Errors
    // =========================================================================
    /// Per-item failure while matching executed/scheduled or parent/child
    /// tasks. Isolated to the offending item.
    #[error("Linkage failed for record {record_no}: {message}")]
    Linkage { record_no: String, message: String },

    // =========================================================================
    // Boundary Errors
    // =========================================================================
    /// Remote task-store call failed
    #[error("Store operation failed: {operation} - {message}")]
    Store { operation: String, message: String },

    /// No usable baseline snapshot for this cycle
    #[error("Snapshot unavailable: {detail}")]
    SnapshotUnavailable { detail: String },

    // =========================================================================
    // Wrapped Errors
    // =========================================================================
    /// IO error wrapper
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON error wrapper
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Generic error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PlanSyncError {
    // =========================================================================
    // Constructor helpers
    // =========================================================================

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            path: None,
        }
    }

    /// Create a configuration error with path
    pub fn config_with_path(message: impl Into<String>, path: PathBuf) -> Self {
        Self::Config {
            message: message.into(),
            path: Some(path),
        }
    }

    /// Create a decode error for a record
    pub fn decode(record_no: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Decode {
            record_no: record_no.into(),
            reason: reason.into(),
        }
    }

    /// Create a label parse error
    pub fn label_parse(content: impl Into<String>) -> Self {
        Self::LabelParse {
            content: content.into(),
        }
    }

    /// Create a validation error
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a linkage error for a record
    pub fn linkage(record_no: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Linkage {
            record_no: record_no.into(),
            message: message.into(),
        }
    }

    /// Create a store error
    pub fn store(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Store {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a snapshot-unavailable error
    pub fn snapshot(detail: impl Into<String>) -> Self {
        Self::SnapshotUnavailable {
            detail: detail.into(),
        }
    }

    // =========================================================================
    // Classification helpers
    // =========================================================================

    /// Check if this error is scoped to a single record.
    ///
    /// Item-scoped errors are reported via callback and skipped; they never
    /// abort the surrounding batch.
    pub fn is_item_scoped(&self) -> bool {
        matches!(
            self,
            Self::Decode { .. }
                | Self::LabelParse { .. }
                | Self::Validation { .. }
                | Self::Linkage { .. }
        )
    }

    /// Check if this error aborts the current cycle.
    pub fn is_cycle_fatal(&self) -> bool {
        matches!(
            self,
            Self::SnapshotUnavailable { .. } | Self::Config { .. } | Self::InvalidConfig { .. }
        )
    }

    /// Record number associated with this error, if item-scoped.
    pub fn record_no(&self) -> Option<&str> {
        match self {
            Self::Decode { record_no, .. } | Self::Linkage { record_no, .. } => {
                Some(record_no.as_str())
            }
            _ => None,
        }
    }

    /// Get error code for exit status
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::SnapshotUnavailable { .. } => 3,
            Self::Store { .. } => 4,
            Self::Config { .. } | Self::InvalidConfig { .. } => 7,
            _ => 1,
        }
    }
}

/// Type alias for plansync results
pub type Result<T> = std::result::Result<T, PlanSyncError>;

/// Extension trait for converting foreign errors to PlanSyncError
pub trait IntoPlanSyncError<T> {
    fn into_sync_config(self) -> Result<T>;
    fn into_sync_store(self, operation: &str) -> Result<T>;
}

impl<T, E: Into<anyhow::Error>> IntoPlanSyncError<T> for std::result::Result<T, E> {
    fn into_sync_config(self) -> Result<T> {
        self.map_err(|e| PlanSyncError::config(e.into().to_string()))
    }

    fn into_sync_store(self, operation: &str) -> Result<T> {
        self.map_err(|e| PlanSyncError::store(operation, e.into().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PlanSyncError::decode("123", "missing title");
        assert!(err.to_string().contains("123"));
        assert!(err.to_string().contains("missing title"));
    }

    #[test]
    fn test_label_parse_display_shows_content() {
        let err = PlanSyncError::label_parse("?garbage");
        assert!(err.to_string().contains("[?garbage]"));
    }

    #[test]
    fn test_is_item_scoped() {
        assert!(PlanSyncError::decode("1", "bad").is_item_scoped());
        assert!(PlanSyncError::linkage("1", "no match").is_item_scoped());
        assert!(PlanSyncError::validation("hours", "negative").is_item_scoped());
        assert!(!PlanSyncError::snapshot("missing").is_item_scoped());
    }

    #[test]
    fn test_is_cycle_fatal() {
        assert!(PlanSyncError::snapshot("missing").is_cycle_fatal());
        assert!(PlanSyncError::config("bad toml").is_cycle_fatal());
        assert!(!PlanSyncError::decode("1", "bad").is_cycle_fatal());
        assert!(!PlanSyncError::store("update", "timeout").is_cycle_fatal());
    }

    #[test]
    fn test_record_no() {
        assert_eq!(PlanSyncError::decode("42", "x").record_no(), Some("42"));
        assert_eq!(PlanSyncError::linkage("7", "x").record_no(), Some("7"));
        assert_eq!(PlanSyncError::snapshot("x").record_no(), None);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(PlanSyncError::snapshot("missing").exit_code(), 3);
        assert_eq!(PlanSyncError::store("query", "down").exit_code(), 4);
        assert_eq!(PlanSyncError::config("test").exit_code(), 7);
        assert_eq!(PlanSyncError::decode("1", "bad").exit_code(), 1);
    }

    #[test]
    fn test_into_plansync_error_trait() {
        let result: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "file not found",
        ));

        let sync_result = result.into_sync_config();
        assert!(sync_result.is_err());

        if let Err(PlanSyncError::Config { message, .. }) = sync_result {
            assert!(message.contains("file not found"));
        } else {
            panic!("Wrong error variant after conversion");
        }
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let sync_err: PlanSyncError = io_err.into();
        assert!(matches!(sync_err, PlanSyncError::Io(_)));
        assert!(sync_err.to_string().contains("access denied"));
    }
}
