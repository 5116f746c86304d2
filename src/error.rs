use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Referenced ticket, policy, target or user is absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// A supplied foreign key (e.g. assignee) does not resolve
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    /// A policy's rule document cannot be parsed
    #[error("Malformed policy rule for policy {policy_id}: {message}")]
    MalformedPolicy { policy_id: String, message: String },

    /// Optimistic-lock failure on an SLA target update
    #[error("Concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    /// Ticket key collision detected during allocation
    #[error("Allocation conflict: {0}")]
    AllocationConflict(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Get error code string
    pub fn error_code(&self) -> &str {
        match self {
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::InvalidReference(_) => "INVALID_REFERENCE",
            AppError::MalformedPolicy { .. } => "MALFORMED_POLICY",
            AppError::ConcurrencyConflict(_) => "CONCURRENCY_CONFLICT",
            AppError::AllocationConflict(_) => "ALLOCATION_CONFLICT",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Storage(_) => "STORAGE_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the caller may retry the operation with fresh data
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::ConcurrencyConflict(_) | AppError::AllocationConflict(_)
        )
    }
}

/// Conversion from serde_json::Error
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Conversion from validator::ValidationErrors
impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

/// Conversion from config::ConfigError
impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            AppError::NotFound("test".to_string()).error_code(),
            "NOT_FOUND"
        );
        assert_eq!(
            AppError::InvalidReference("user".to_string()).error_code(),
            "INVALID_REFERENCE"
        );
        assert_eq!(
            AppError::AllocationConflict("HELP-0001".to_string()).error_code(),
            "ALLOCATION_CONFLICT"
        );
    }

    #[test]
    fn test_retryable_classification() {
        assert!(AppError::ConcurrencyConflict("stale version".to_string()).is_retryable());
        assert!(AppError::AllocationConflict("key taken".to_string()).is_retryable());
        assert!(!AppError::NotFound("ticket".to_string()).is_retryable());
        assert!(!AppError::Validation("bad input".to_string()).is_retryable());
    }
}
