//! Bearer token issuance and validation.
//!
//! Tokens are stateless HS256 JWTs carrying `{sub, role, iat, exp}`.
//! Validation checks signature integrity and expiry on every gated request;
//! logout is client-side token discard. Credentials are compared in
//! constant time so the comparison leaks nothing about where a mismatch
//! occurred.

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use opine_core::config::Credentials;
use opine_error::{OpineError, Result};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

/// Role carried by a session token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Read-only access to analytics and dashboards.
    Viewer,
    /// Full access including mutations and maintenance.
    Admin,
}

impl Role {
    /// Whether this role satisfies a required role.
    ///
    /// Admin satisfies every gate; viewer satisfies only viewer gates.
    #[must_use]
    pub const fn allows(self, required: Self) -> bool {
        match required {
            Self::Viewer => true,
            Self::Admin => matches!(self, Self::Admin),
        }
    }

    /// Wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Viewer => "viewer",
            Self::Admin => "admin",
        }
    }
}

/// Token claims: subject, role, issued-at, expiry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    /// Subject username.
    pub sub: String,
    /// Session role.
    pub role: Role,
    /// Issued at (Unix timestamp).
    pub iat: u64,
    /// Expiration time (Unix timestamp).
    pub exp: u64,
}

/// Token signer/verifier around a shared HS256 secret.
pub struct TokenService {
    encoding:      EncodingKey,
    decoding:      DecodingKey,
    validation:    Validation,
    lifetime_secs: u64,
}

impl TokenService {
    /// Create a service from the configured secret and lifetime.
    #[must_use]
    pub fn new(secret: &str, lifetime_secs: u64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 5;
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            lifetime_secs,
        }
    }

    /// Token lifetime in seconds (for `expires_in` responses).
    #[must_use]
    pub const fn lifetime_secs(&self) -> u64 {
        self.lifetime_secs
    }

    /// Issue a signed token for a subject and role.
    ///
    /// # Errors
    ///
    /// Returns `OpineError::Internal` if encoding fails.
    pub fn issue(&self, subject: &str, role: Role) -> Result<String> {
        #[allow(clippy::cast_sign_loss)]
        let now = Utc::now().timestamp().max(0) as u64;
        let claims = Claims {
            sub: subject.to_string(),
            role,
            iat: now,
            exp: now + self.lifetime_secs,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| OpineError::internal(format!("token encoding failed: {e}")))
    }

    /// Validate a token and extract its claims.
    ///
    /// # Errors
    ///
    /// Returns `OpineError::AuthMissing` for bad signatures, expired tokens,
    /// and malformed input alike; the caller maps all of them to 401.
    pub fn verify(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                use jsonwebtoken::errors::ErrorKind;
                let reason = match e.kind() {
                    ErrorKind::ExpiredSignature => "token expired",
                    ErrorKind::InvalidSignature => "invalid signature",
                    _ => "invalid token",
                };
                OpineError::auth_missing(reason)
            })
    }
}

/// Check a login attempt against configured credentials in constant time.
///
/// Both fields are always compared so a username mismatch costs the same as
/// a password mismatch.
#[must_use]
pub fn verify_credentials(configured: &Credentials, username: &str, password: &str) -> bool {
    let user_ok = constant_time_eq(configured.username.as_bytes(), username.as_bytes());
    let pass_ok = constant_time_eq(configured.password.as_bytes(), password.as_bytes());
    user_ok & pass_ok
}

/// Constant-time byte comparison that does not early-exit on length
/// mismatch: unequal lengths fold in a comparison against the input itself
/// so timing stays proportional to the input length.
fn constant_time_eq(expected: &[u8], actual: &[u8]) -> bool {
    if expected.len() == actual.len() {
        expected.ct_eq(actual).into()
    } else {
        let _ = actual.ct_eq(actual);
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new("a-test-secret-with-enough-length", 3600)
    }

    #[test]
    fn test_issue_and_verify_roundtrip() {
        let service = service();
        let token = service.issue("admin", Role::Admin).expect("issue");
        let claims = service.verify(&token).expect("verify");

        assert_eq!(claims.sub, "admin");
        assert_eq!(claims.role, Role::Admin);
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn test_tampered_token_rejected() {
        let service = service();
        let token = service.issue("admin", Role::Admin).expect("issue");
        let mut tampered = token.clone();
        tampered.pop();
        tampered.push('x');

        assert!(service.verify(&tampered).is_err());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = service().issue("viewer", Role::Viewer).expect("issue");
        let other = TokenService::new("a-different-secret-entirely!", 3600);
        let err = other.verify(&token).unwrap_err();
        assert_eq!(err.status_code(), 401);
    }

    #[test]
    fn test_role_gating() {
        assert!(Role::Admin.allows(Role::Admin));
        assert!(Role::Admin.allows(Role::Viewer));
        assert!(Role::Viewer.allows(Role::Viewer));
        assert!(!Role::Viewer.allows(Role::Admin));
    }

    #[test]
    fn test_credentials_match() {
        let configured = Credentials {
            username: "admin".to_string(),
            password: "hunter2hunter2".to_string(),
        };
        assert!(verify_credentials(&configured, "admin", "hunter2hunter2"));
        assert!(!verify_credentials(&configured, "admin", "wrong"));
        assert!(!verify_credentials(&configured, "someone", "hunter2hunter2"));
    }

    #[test]
    fn test_length_mismatch_not_equal() {
        assert!(!constant_time_eq(b"abc", b"abcd"));
        assert!(!constant_time_eq(b"abcd", b"abc"));
        assert!(constant_time_eq(b"abcd", b"abcd"));
    }

    #[test]
    fn test_claims_serialization_shape() {
        let claims = Claims {
            sub:  "viewer".to_string(),
            role: Role::Viewer,
            iat:  1_700_000_000,
            exp:  1_700_086_400,
        };
        let json = serde_json::to_string(&claims).expect("serialize");
        assert!(json.contains("\"role\":\"viewer\""));
        assert!(json.contains("\"sub\":\"viewer\""));
    }
}
