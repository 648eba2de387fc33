//! Error types for the Opine core service.
//!
//! Every fallible public operation in the workspace returns `Result<T>` from
//! this crate. Adapters classify low-level failures (PostgreSQL, Redis, HTTP)
//! into this taxonomy; the HTTP surface is the single point that serialises
//! them into responses.
//!
//! # Error Hierarchy
//!
//! ```text
//! OpineError
//! ├── Validation      - malformed body, out-of-range parameter
//! ├── AuthMissing     - no credentials presented
//! ├── AuthForbidden   - credentials lack the required role
//! ├── NotFound        - entity id unknown
//! ├── TooLarge        - payload or question over limit
//! ├── RateLimited     - token bucket exhausted
//! ├── Timeout         - operation exceeded its deadline
//! ├── Conflict        - duplicate within a strict insert batch
//! ├── Database        - PostgreSQL statement failure
//! ├── ConnectionPool  - pool exhausted or unavailable
//! ├── Unavailable     - downstream cache/queue/vector/model unreachable
//! ├── Serialization   - encode/decode failure
//! └── Internal        - unexpected internal errors
//! ```

use thiserror::Error;

/// Result type alias for Opine operations.
pub type Result<T> = std::result::Result<T, OpineError>;

/// Main error type for Opine operations.
#[derive(Error, Debug)]
pub enum OpineError {
    /// Validation error.
    ///
    /// Returned when a request body or parameter fails validation.
    #[error("Validation error: {message}")]
    Validation {
        /// Error message describing the validation failure.
        message: String,
        /// Field or parameter the failure refers to.
        field:   Option<String>,
    },

    /// Authentication missing or invalid.
    #[error("Authentication required: {message}")]
    AuthMissing {
        /// Error message.
        message: String,
    },

    /// Authenticated but not permitted.
    #[error("Forbidden: {message}")]
    AuthForbidden {
        /// Error message.
        message: String,
    },

    /// Resource not found.
    #[error("{resource_type} not found: {identifier}")]
    NotFound {
        /// Type of resource (e.g., "Topic", "Feedback").
        resource_type: String,
        /// Identifier that was looked up.
        identifier:    String,
    },

    /// Payload over the configured limit.
    #[error("Payload too large: {message}")]
    TooLarge {
        /// Error message.
        message: String,
    },

    /// Rate limit exceeded.
    #[error("Rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds the client should wait before retrying.
        retry_after_secs: u64,
    },

    /// Operation timeout.
    #[error("Timeout after {timeout_ms}ms: {operation}")]
    Timeout {
        /// Timeout duration in milliseconds.
        timeout_ms: u64,
        /// The operation that timed out.
        operation:  String,
    },

    /// Conflict with existing data.
    #[error("Conflict: {message}")]
    Conflict {
        /// Error message.
        message: String,
    },

    /// Database operation error.
    ///
    /// Wraps errors from PostgreSQL statements.
    #[error("Database error: {message}")]
    Database {
        /// Error message from the database.
        message:   String,
        /// SQL state code if available (e.g., "23505" for unique violation).
        sql_state: Option<String>,
    },

    /// Connection pool error.
    ///
    /// Returned when the database connection pool is exhausted or unavailable.
    #[error("Connection pool error: {message}")]
    ConnectionPool {
        /// Error message.
        message: String,
    },

    /// Downstream dependency unreachable.
    ///
    /// Components attempt graceful degradation first (cache miss, empty
    /// vector result); this surfaces only when degradation is impossible.
    #[error("{service} unavailable: {message}")]
    Unavailable {
        /// The downstream service (e.g., "cache", "queue", "vector-store").
        service: String,
        /// Error message.
        message: String,
    },

    /// Serialization or deserialization failure.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message.
        message: String,
    },

    /// Internal error.
    ///
    /// Returned for unexpected internal errors. Should be rare.
    #[error("Internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
        /// Optional source error for debugging.
        #[source]
        source:  Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl OpineError {
    // ========================================================================
    // Constructor helpers
    // ========================================================================

    /// Create a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field:   None,
        }
    }

    /// Create a validation error naming the offending field.
    #[must_use]
    pub fn validation_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field:   Some(field.into()),
        }
    }

    /// Create an authentication-missing error.
    #[must_use]
    pub fn auth_missing(message: impl Into<String>) -> Self {
        Self::AuthMissing {
            message: message.into(),
        }
    }

    /// Create a forbidden error.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::AuthForbidden {
            message: message.into(),
        }
    }

    /// Create a not found error.
    #[must_use]
    pub fn not_found(resource_type: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type: resource_type.into(),
            identifier:    identifier.into(),
        }
    }

    /// Create a too-large error.
    #[must_use]
    pub fn too_large(message: impl Into<String>) -> Self {
        Self::TooLarge {
            message: message.into(),
        }
    }

    /// Create a timeout error.
    #[must_use]
    pub fn timeout(timeout_ms: u64, operation: impl Into<String>) -> Self {
        Self::Timeout {
            timeout_ms,
            operation: operation.into(),
        }
    }

    /// Create a conflict error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Create a database error.
    #[must_use]
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message:   message.into(),
            sql_state: None,
        }
    }

    /// Create an unavailable error for a named downstream service.
    #[must_use]
    pub fn unavailable(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unavailable {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Create a serialization error.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source:  None,
        }
    }

    // ========================================================================
    // Error classification
    // ========================================================================

    /// Check if this is a client error (4xx equivalent).
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. }
                | Self::AuthMissing { .. }
                | Self::AuthForbidden { .. }
                | Self::NotFound { .. }
                | Self::TooLarge { .. }
                | Self::RateLimited { .. }
                | Self::Conflict { .. }
        )
    }

    /// Check if this is a server error (5xx equivalent).
    #[must_use]
    pub const fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Database { .. }
                | Self::ConnectionPool { .. }
                | Self::Unavailable { .. }
                | Self::Serialization { .. }
                | Self::Internal { .. }
        )
    }

    /// Check if this error is transient and worth retrying.
    ///
    /// Constraint violations and logical errors are never retryable; pool
    /// exhaustion, timeouts, and unreachable downstreams are.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ConnectionPool { .. } | Self::Timeout { .. } | Self::Unavailable { .. } => true,
            Self::Database { sql_state, .. } => {
                // Class 08 = connection exception, 57P = operator intervention
                // (shutdown/crash); both resolve on reconnect.
                sql_state
                    .as_deref()
                    .is_some_and(|s| s.starts_with("08") || s.starts_with("57P"))
            },
            _ => false,
        }
    }

    /// Get HTTP status code equivalent.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Validation { .. } => 422,
            Self::AuthMissing { .. } => 401,
            Self::AuthForbidden { .. } => 403,
            Self::NotFound { .. } => 404,
            Self::TooLarge { .. } => 413,
            Self::RateLimited { .. } => 429,
            Self::Timeout { .. } => 408,
            Self::Conflict { .. } => 409,
            Self::Unavailable { .. } => 503,
            Self::Database { .. }
            | Self::ConnectionPool { .. }
            | Self::Serialization { .. }
            | Self::Internal { .. } => 500,
        }
    }

    /// Get a stable machine-readable error code.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::AuthMissing { .. } => "UNAUTHENTICATED",
            Self::AuthForbidden { .. } => "FORBIDDEN",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::TooLarge { .. } => "PAYLOAD_TOO_LARGE",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Conflict { .. } => "CONFLICT",
            Self::Database { .. } => "DATABASE_ERROR",
            Self::ConnectionPool { .. } => "CONNECTION_POOL_ERROR",
            Self::Unavailable { .. } => "SERVICE_UNAVAILABLE",
            Self::Serialization { .. } => "SERIALIZATION_ERROR",
            Self::Internal { .. } => "INTERNAL_SERVER_ERROR",
        }
    }
}

// ============================================================================
// Conversions from other error types
// ============================================================================

impl From<serde_json::Error> for OpineError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization {
            message: e.to_string(),
        }
    }
}

impl From<std::io::Error> for OpineError {
    fn from(e: std::io::Error) -> Self {
        Self::Internal {
            message: format!("I/O error: {e}"),
            source:  Some(Box::new(e)),
        }
    }
}

impl From<std::env::VarError> for OpineError {
    fn from(e: std::env::VarError) -> Self {
        Self::Internal {
            message: format!("Environment variable error: {e}"),
            source:  None,
        }
    }
}

// ============================================================================
// Error context extension trait
// ============================================================================

/// Extension trait for adding context to errors.
pub trait ErrorContext<T> {
    /// Add context to an error.
    ///
    /// # Errors
    ///
    /// Returns the error with additional context message prepended.
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context lazily (only computed on error).
    ///
    /// # Errors
    ///
    /// Returns the error with additional context message prepended.
    fn with_context<F, M>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> M,
        M: Into<String>;
}

impl<T, E: Into<OpineError>> ErrorContext<T> for std::result::Result<T, E> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            OpineError::Internal {
                message: format!("{}: {inner}", message.into()),
                source:  None,
            }
        })
    }

    fn with_context<F, M>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> M,
        M: Into<String>,
    {
        self.map_err(|e| {
            let inner = e.into();
            OpineError::Internal {
                message: format!("{}: {inner}", f().into()),
                source:  None,
            }
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error() {
        let err = OpineError::validation("body must not be empty");
        assert!(err.is_client_error());
        assert!(!err.is_server_error());
        assert_eq!(err.status_code(), 422);
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_not_found_error() {
        let err = OpineError::not_found("Topic", "42");
        assert!(err.is_client_error());
        assert_eq!(err.status_code(), 404);
        assert_eq!(err.to_string(), "Topic not found: 42");
    }

    #[test]
    fn test_rate_limited_error() {
        let err = OpineError::RateLimited {
            retry_after_secs: 30,
        };
        assert_eq!(err.status_code(), 429);
        assert!(err.is_client_error());
        assert!(err.to_string().contains("30"));
    }

    #[test]
    fn test_database_error_is_server_error() {
        let err = OpineError::database("connection refused");
        assert!(!err.is_client_error());
        assert!(err.is_server_error());
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn test_retryable_errors() {
        assert!(
            OpineError::ConnectionPool {
                message: "timeout".to_string(),
            }
            .is_retryable()
        );
        assert!(OpineError::timeout(5000, "analytics query").is_retryable());
        assert!(OpineError::unavailable("cache", "refused").is_retryable());
        assert!(!OpineError::validation("bad input").is_retryable());
    }

    #[test]
    fn test_constraint_violation_not_retryable() {
        let err = OpineError::Database {
            message:   "duplicate key value".to_string(),
            sql_state: Some("23505".to_string()),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_connection_sql_state_retryable() {
        let err = OpineError::Database {
            message:   "connection reset".to_string(),
            sql_state: Some("08006".to_string()),
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn test_unavailable_maps_to_503() {
        let err = OpineError::unavailable("vector-store", "connect timeout");
        assert_eq!(err.status_code(), 503);
        assert_eq!(err.error_code(), "SERVICE_UNAVAILABLE");
    }

    #[test]
    fn test_from_serde_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: OpineError = json_err.into();
        assert!(matches!(err, OpineError::Serialization { .. }));
    }

    #[test]
    fn test_error_context() {
        fn may_fail() -> std::result::Result<(), std::io::Error> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"))
        }

        let result = may_fail().context("failed to load lexicon");
        assert!(result.is_err());

        let err = result.unwrap_err();
        assert!(err.to_string().contains("failed to load lexicon"));
    }
}
