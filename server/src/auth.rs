//! Handshake authorization gate.
//!
//! Authentication is optional: a handshake that presents no token is admitted
//! as anonymous. A handshake that presents a token is admitted only if the
//! token is a JSON Web Token signed with the configured shared secret. No
//! claims are extracted or kept; possession of a validly signed token is the
//! whole authorization model.
//!
//! # Token Channels
//!
//! The token is looked up in three places, first non-empty value wins:
//!
//! 1. The handshake auth payload (`token` query parameter of the upgrade request)
//! 2. The `x-access-token` header
//! 3. The `authorization` header, with a leading `Bearer ` prefix removed
//!
//! # Example
//!
//! ```rust
//! use axum::http::HeaderMap;
//! use socket_broker::auth::{authorize, extract_token, Admission};
//!
//! let headers = HeaderMap::new();
//! let token = extract_token(None, &headers);
//! assert_eq!(authorize(token, Some("secret")), Ok(Admission::Anonymous));
//! ```

use axum::http::HeaderMap;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, get_current_timestamp, Algorithm, DecodingKey, Validation};
use thiserror::Error;

/// Custom header carrying the token.
pub const ACCESS_TOKEN_HEADER: &str = "x-access-token";

/// Standard authorization header.
pub const AUTHORIZATION_HEADER: &str = "authorization";

const BEARER: &str = "bearer";

/// Outcome of a successful gate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// No token was presented.
    Anonymous,

    /// A validly signed token was presented.
    Authenticated,
}

impl Admission {
    /// Returns `true` if the connection presented a valid token.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated)
    }
}

/// Reasons a presented token is refused.
///
/// Every variant is surfaced to the client as the same "Unauthorized"
/// rejection; the distinction only reaches the server logs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// A token was presented but no signing secret is configured.
    #[error("no signing secret configured")]
    MissingSecret,

    /// The token signature does not match the secret.
    #[error("invalid signature")]
    InvalidSignature,

    /// The token is past its `exp` claim.
    #[error("token expired")]
    Expired,

    /// The token is not yet valid according to its `nbf` claim.
    #[error("token not yet valid")]
    NotYetValid,

    /// The token could not be parsed or uses an unsupported algorithm.
    #[error("malformed token: {0}")]
    Malformed(String),
}

/// Finds the handshake token, honoring channel priority.
///
/// Empty values are treated as absent so that a lower-priority channel can
/// still supply the token.
pub fn extract_token<'a>(auth_payload: Option<&'a str>, headers: &'a HeaderMap) -> Option<&'a str> {
    let non_empty = |value: &'a str| Some(value).filter(|v| !v.is_empty());

    auth_payload
        .and_then(non_empty)
        .or_else(|| {
            headers
                .get(ACCESS_TOKEN_HEADER)
                .and_then(|v| v.to_str().ok())
                .and_then(non_empty)
        })
        .or_else(|| {
            headers
                .get(AUTHORIZATION_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(strip_bearer)
                .and_then(non_empty)
        })
}

/// Removes a case-insensitive `Bearer` prefix followed by whitespace.
///
/// Values without the prefix are returned unchanged.
fn strip_bearer(value: &str) -> &str {
    let Some(prefix) = value.get(..BEARER.len()) else {
        return value;
    };
    if !prefix.eq_ignore_ascii_case(BEARER) {
        return value;
    }

    let rest = &value[BEARER.len()..];
    let trimmed = rest.trim_start();
    if trimmed.len() == rest.len() {
        value
    } else {
        trimmed
    }
}

/// Verifies a token's signature and time claims against `secret`.
///
/// `exp` and `nbf` are only checked when the token carries them, with no
/// clock leeway. A token expires at its `exp` second, not after it. Any HMAC
/// algorithm is accepted.
pub fn verify_token(token: &str, secret: &str) -> Result<(), AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
    validation.required_spec_claims.clear();
    validation.leeway = 0;
    validation.validate_nbf = true;
    validation.validate_aud = false;

    let data = decode::<serde_json::Value>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|err| match err.kind() {
        ErrorKind::InvalidSignature => AuthError::InvalidSignature,
        ErrorKind::ExpiredSignature => AuthError::Expired,
        ErrorKind::ImmatureSignature => AuthError::NotYetValid,
        other => AuthError::Malformed(format!("{other:?}")),
    })?;

    // jsonwebtoken only rejects once `exp` is in the past
    let exp = data.claims.get("exp").and_then(serde_json::Value::as_f64);
    if exp.is_some_and(|exp| exp <= get_current_timestamp() as f64) {
        return Err(AuthError::Expired);
    }
    Ok(())
}

/// Runs the gate for a handshake.
///
/// Returns the admission kind, or the reason a presented token was refused.
pub fn authorize(token: Option<&str>, secret: Option<&str>) -> Result<Admission, AuthError> {
    let Some(token) = token else {
        return Ok(Admission::Anonymous);
    };
    let secret = secret.ok_or(AuthError::MissingSecret)?;

    verify_token(token, secret)?;
    Ok(Admission::Authenticated)
}
