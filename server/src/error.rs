//! Error types for the socket broker.
//!
//! # Error Types
//!
//! - [`ConfigError`] - Configuration-related errors (missing values, parse failures)
//! - [`ServerError`] - Handshake rejections, turned into HTTP responses before
//!   a WebSocket upgrade completes, and hub failures
//!
//! # Example
//!
//! ```rust
//! use axum::http::StatusCode;
//! use socket_broker::error::ServerError;
//!
//! let err = ServerError::OriginNotAllowed("http://evil.test".into());
//! assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
//! assert_eq!(err.code(), "origin_not_allowed");
//! ```

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Errors that occur while resolving the effective configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A configuration value failed to parse or is invalid.
    #[error("invalid configuration value for '{key}': {reason}")]
    Invalid {
        /// The configuration key that has an invalid value.
        key: String,
        /// Description of why the value is invalid.
        reason: String,
    },
}

impl ConfigError {
    /// Creates a new invalid configuration error.
    ///
    /// # Example
    ///
    /// ```rust
    /// use socket_broker::error::ConfigError;
    ///
    /// let err = ConfigError::invalid("PORT", "must be a number between 1 and 65535");
    /// assert!(matches!(err, ConfigError::Invalid { .. }));
    /// ```
    pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Top-level error type for the socket broker.
///
/// Handshake failures are local to the connection being negotiated; they are
/// rendered as HTTP responses and never affect other connections.
#[derive(Error, Debug)]
pub enum ServerError {
    /// A presented token failed verification.
    #[error("Unauthorized")]
    Unauthorized,

    /// The handshake declared an origin outside the allow-list.
    #[error("origin not allowed: {0}")]
    OriginNotAllowed(String),

    /// Unexpected internal server error.
    #[error("internal server error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Creates a new internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// HTTP status used when this error rejects a request.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::OriginNotAllowed(_) => StatusCode::FORBIDDEN,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for the error body.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::OriginNotAllowed(_) => "origin_not_allowed",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Message shown to clients. Server-side details stay in the logs.
    fn public_message(&self) -> String {
        match self {
            Self::Unauthorized => "Unauthorized".to_string(),
            Self::OriginNotAllowed(_) => "origin not allowed".to_string(),
            Self::Internal(_) => "internal server error".to_string(),
        }
    }
}

/// JSON error response body.
#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    error: String,
    code: &'static str,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.public_message(),
            code: self.code(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

/// A specialized Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;
