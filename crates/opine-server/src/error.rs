//! Error serialisation: the taxonomy becomes `{"detail": ...}` bodies.
//!
//! Every response carries `X-Request-Id` (added by the request-id
//! middleware); 5xx responses echo it as the correlation id of the
//! structured log entry.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use opine_error::OpineError;
use serde::Serialize;
use tracing::{error, warn};

/// HTTP-facing error wrapper.
#[derive(Debug)]
pub struct ApiError(pub OpineError);

/// Serialised error body.
#[derive(Debug, Serialize)]
struct ErrorBody {
    detail: String,
    code: &'static str,
}

impl From<OpineError> for ApiError {
    fn from(e: OpineError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self.0, "request failed");
        } else {
            warn!(status = status.as_u16(), error = %self.0, "request rejected");
        }

        let body = ErrorBody {
            detail: self.0.to_string(),
            code:   self.0.error_code(),
        };
        let mut response = (status, Json(body)).into_response();

        if let OpineError::RateLimited { retry_after_secs } = &self.0 {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

/// Convenience alias for handler results.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_maps_to_404() {
        let response = ApiError(OpineError::not_found("Topic", "9")).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_rate_limited_carries_retry_after() {
        let response = ApiError(OpineError::RateLimited {
            retry_after_secs: 17,
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(header::RETRY_AFTER).map(|v| v.to_str().unwrap_or("")),
            Some("17")
        );
    }

    #[test]
    fn test_validation_maps_to_422() {
        let response = ApiError(OpineError::validation("bad")).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
