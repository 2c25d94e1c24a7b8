//! Error types for Quire
//!
//! This module defines the error taxonomy used across the session store,
//! the remote mirror boundary, and the rate limiter, using `thiserror`
//! for ergonomic error handling.

use thiserror::Error;

/// Main error type for Quire operations
///
/// Local parse failures (`Schema`) and remote outages (`Remote`) are
/// recoverable and are normally caught inside the store; storage-medium
/// failures (`Storage`, `Io`) propagate to the caller.
#[derive(Error, Debug)]
pub enum QuireError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The local storage medium is unavailable or failed a read/write
    #[error("Storage error: {0}")]
    Storage(String),

    /// A persisted blob was present but failed schema validation
    #[error("Schema validation failed: {0}")]
    Schema(String),

    /// A call to the remote mirror or an external API was rejected
    #[error("Remote unavailable: {0}")]
    Remote(String),

    /// An imported identity token did not match the expected format
    #[error("Invalid identity token: expected a token starting with 'fp_', got '{0}'")]
    InvalidIdentity(String),

    /// No session with the given id exists in the local collection
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// A bounded rate limiter queue is full
    #[error("Rate limiter queue is full: limit={limit}")]
    RateLimitQueueFull {
        /// The configured maximum queue length
        limit: usize,
    },

    /// A pending admission was dropped by `RateLimiter::clear`
    #[error("Pending admission was cancelled by a queue clear")]
    AdmissionCancelled,

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for Quire operations
///
/// Uses `anyhow::Error` so that callers can attach context while still
/// being able to `downcast_ref::<QuireError>()` at the boundary.
pub type Result<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let error = QuireError::Config("max_sessions must be greater than 0".to_string());
        assert_eq!(
            error.to_string(),
            "Configuration error: max_sessions must be greater than 0"
        );
    }

    #[test]
    fn test_invalid_identity_display_mentions_prefix() {
        let error = QuireError::InvalidIdentity("not-a-token".to_string());
        let s = error.to_string();
        assert!(s.contains("fp_"));
        assert!(s.contains("not-a-token"));
    }

    #[test]
    fn test_queue_full_display() {
        let error = QuireError::RateLimitQueueFull { limit: 8 };
        assert_eq!(error.to_string(), "Rate limiter queue is full: limit=8");
    }

    #[test]
    fn test_remote_error_display() {
        let error = QuireError::Remote("connection refused".to_string());
        assert_eq!(error.to_string(), "Remote unavailable: connection refused");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: QuireError = io_error.into();
        assert!(matches!(error, QuireError::Io(_)));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_error = serde_json::from_str::<serde_json::Value>("{invalid json}").unwrap_err();
        let error: QuireError = json_error.into();
        assert!(matches!(error, QuireError::Serialization(_)));
    }

    #[test]
    fn test_downcast_through_anyhow() {
        let result: Result<()> = Err(QuireError::SessionNotFound("abc".to_string()).into());
        let err = result.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<QuireError>(),
            Some(QuireError::SessionNotFound(id)) if id == "abc"
        ));
    }
}
