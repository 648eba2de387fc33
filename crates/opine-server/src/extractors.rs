//! Authentication extractors.
//!
//! Tokens are validated on every gated request; role gating happens at the
//! route by choosing the extractor.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use opine_auth::{Claims, Role};
use opine_error::OpineError;

use crate::error::ApiError;
use crate::state::AppState;

fn bearer_token(parts: &Parts) -> Result<&str, ApiError> {
    let header = parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError(OpineError::auth_missing("missing Authorization header")))?;
    header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError(OpineError::auth_missing("expected Bearer token")))
}

fn verify(parts: &Parts, state: &AppState, required: Role) -> Result<Claims, ApiError> {
    let token = bearer_token(parts)?;
    let claims = state.tokens.verify(token)?;
    if !claims.role.allows(required) {
        return Err(ApiError(OpineError::forbidden(format!(
            "{} role required",
            required.as_str()
        ))));
    }
    Ok(claims)
}

/// Client IP taken from the connection info, when the server was started
/// with connect-info (absent under in-process router tests).
#[derive(Debug, Clone)]
pub struct ClientIp(pub Option<String>);

impl FromRequestParts<AppState> for ClientIp {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let ip = parts
            .extensions
            .get::<axum::extract::ConnectInfo<std::net::SocketAddr>>()
            .map(|info| info.0.ip().to_string());
        Ok(Self(ip))
    }
}

/// Validated session of any role.
#[derive(Debug, Clone)]
pub struct AuthSession(pub Claims);

impl FromRequestParts<AppState> for AuthSession {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        verify(parts, state, Role::Viewer).map(Self)
    }
}

/// Validated session with the admin role.
#[derive(Debug, Clone)]
pub struct RequireAdmin(pub Claims);

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        verify(parts, state, Role::Admin).map(Self)
    }
}

/// Validated session with at least the viewer role.
#[derive(Debug, Clone)]
pub struct RequireViewer(pub Claims);

impl FromRequestParts<AppState> for RequireViewer {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        verify(parts, state, Role::Viewer).map(Self)
    }
}
