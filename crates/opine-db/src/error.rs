//! Classification of low-level database errors into the Opine taxonomy.

use opine_error::OpineError;

/// Classify a `tokio_postgres` error.
///
/// Unique violations become conflicts, foreign-key and check violations
/// become validation errors, connection-class SQLSTATEs stay retryable
/// database errors, and everything else is a plain database error.
pub fn classify_pg_error(e: &tokio_postgres::Error) -> OpineError {
    let sql_state = e.code().map(|c| c.code().to_string());
    match sql_state.as_deref() {
        Some("23505") => OpineError::conflict(format!("duplicate row: {e}")),
        Some(code) if code.starts_with("23") => {
            OpineError::validation(format!("constraint violation: {e}"))
        },
        _ => OpineError::Database {
            message: e.to_string(),
            sql_state,
        },
    }
}

/// Classify a deadpool pool error.
pub fn classify_pool_error(e: &deadpool_postgres::PoolError) -> OpineError {
    OpineError::ConnectionPool {
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_error_is_retryable() {
        let err = OpineError::ConnectionPool {
            message: "pool timed out".to_string(),
        };
        assert!(err.is_retryable());
        assert_eq!(err.status_code(), 500);
    }
}
