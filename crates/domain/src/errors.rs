//! Error types used throughout the workspace

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for Fleetbridge
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum FleetError {
    /// Invalid or expired credential that a refresh could not recover.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// A paginated collection changed while it was being read.
    #[error("Consistency error: {0}")]
    Consistency(String),

    /// The remote side broke a sequencing or payload contract.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The credential is linked to another device-management account.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse error categories used by retry decisions and log labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Credential problems, recoverable at most once through a refresh
    Authentication,
    /// Remote state moved under the caller; restart the operation
    Consistency,
    /// Contract violations (sequencing, payloads, caller input)
    Contract,
    /// Remote 5xx responses
    Server,
    /// Connection failures and timeouts
    Network,
    /// Misconfiguration or bugs
    Config,
}

impl FleetError {
    /// Get the error category for this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Auth(_) => ErrorCategory::Authentication,
            Self::Consistency(_) => ErrorCategory::Consistency,
            Self::Validation(_)
            | Self::NotFound(_)
            | Self::InvalidInput(_)
            | Self::Serialization(_) => ErrorCategory::Contract,
            Self::Server(_) => ErrorCategory::Server,
            Self::Network(_) => ErrorCategory::Network,
            Self::Conflict(_) | Self::Config(_) | Self::Internal(_) => ErrorCategory::Config,
        }
    }

    /// Whether repeating the same call later could succeed.
    ///
    /// Consistency errors are not retryable in place: the whole iteration has
    /// to be restarted from the first page.
    pub fn is_retryable(&self) -> bool {
        matches!(self.category(), ErrorCategory::Server | ErrorCategory::Network)
    }

    /// Stable label suitable for structured log fields.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Auth(_) => "auth",
            Self::Consistency(_) => "consistency",
            Self::Validation(_) => "validation",
            Self::Conflict(_) => "conflict",
            Self::Server(_) => "server",
            Self::Network(_) => "network",
            Self::NotFound(_) => "not_found",
            Self::InvalidInput(_) => "invalid_input",
            Self::Config(_) => "config",
            Self::Serialization(_) => "serialization",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<serde_json::Error> for FleetError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type alias for Fleetbridge operations
pub type Result<T> = std::result::Result<T, FleetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert_eq!(FleetError::Auth("x".into()).category(), ErrorCategory::Authentication);
        assert_eq!(FleetError::Consistency("x".into()).category(), ErrorCategory::Consistency);
        assert_eq!(FleetError::Validation("x".into()).category(), ErrorCategory::Contract);
        assert_eq!(FleetError::Conflict("x".into()).category(), ErrorCategory::Config);
        assert_eq!(FleetError::Server("x".into()).category(), ErrorCategory::Server);
    }

    #[test]
    fn test_should_retry() {
        assert!(FleetError::Server("x".into()).is_retryable());
        assert!(FleetError::Network("x".into()).is_retryable());
        assert!(!FleetError::Consistency("x".into()).is_retryable());
        assert!(!FleetError::Validation("x".into()).is_retryable());
        assert!(!FleetError::Auth("x".into()).is_retryable());
    }

    #[test]
    fn test_serde_shape() {
        let json = serde_json::to_value(FleetError::NotFound("token".into())).unwrap();
        assert_eq!(json, serde_json::json!({"type": "NotFound", "message": "token"}));
    }

    #[test]
    fn test_json_error_conversion() {
        let err: FleetError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert_eq!(err.label(), "serialization");
    }
}
