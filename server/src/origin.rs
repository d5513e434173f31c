//! Origin policy for the HTTP and WebSocket surfaces.
//!
//! Browsers send `Origin` on cross-site requests and on every WebSocket
//! handshake. The same [`AllowedOrigins`] list drives both the CORS response
//! headers and the handshake check in [`check_origin`]. Requests without an
//! `Origin` header (non-browser clients) are not subject to the list.

use axum::http::header::{AUTHORIZATION, CONTENT_TYPE, ORIGIN};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::warn;

use crate::auth::ACCESS_TOKEN_HEADER;
use crate::config::AllowedOrigins;
use crate::error::ServerError;

/// Rejects handshakes whose `Origin` is not on the allow-list.
///
/// # Errors
///
/// Returns [`ServerError::OriginNotAllowed`] for a disallowed or unreadable
/// origin.
pub fn check_origin(headers: &HeaderMap, allowed: &AllowedOrigins) -> Result<(), ServerError> {
    let Some(value) = headers.get(ORIGIN) else {
        return Ok(());
    };

    let origin = value
        .to_str()
        .map_err(|_| ServerError::OriginNotAllowed("<non-ascii>".to_string()))?;

    if allowed.permits(origin) {
        Ok(())
    } else {
        Err(ServerError::OriginNotAllowed(origin.to_string()))
    }
}

/// Builds the CORS layer for `allowed`.
///
/// Credentials are allowed, so the wildcard is served by echoing the request
/// origin rather than `*`.
pub fn cors_layer(allowed: &AllowedOrigins) -> CorsLayer {
    let allow_origin = match allowed {
        AllowedOrigins::Any => AllowOrigin::mirror_request(),
        AllowedOrigins::List(origins) => AllowOrigin::list(origins.iter().filter_map(|origin| {
            match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin = %origin, "Skipping origin that is not a valid header value");
                    None
                }
            }
        })),
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            CONTENT_TYPE,
            AUTHORIZATION,
            HeaderName::from_static(ACCESS_TOKEN_HEADER),
        ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_origin(origin: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ORIGIN, HeaderValue::from_static(origin));
        headers
    }

    fn list(origins: &[&str]) -> AllowedOrigins {
        AllowedOrigins::List(origins.iter().map(|o| o.to_string()).collect())
    }

    #[test]
    fn missing_origin_is_admitted() {
        assert!(check_origin(&HeaderMap::new(), &list(&[])).is_ok());
    }

    #[test]
    fn listed_origin_is_admitted() {
        let allowed = list(&["http://localhost:3000", "http://localhost:8080"]);
        assert!(check_origin(&with_origin("http://localhost:8080"), &allowed).is_ok());
    }

    #[test]
    fn unlisted_origin_is_rejected() {
        let allowed = list(&["http://localhost:3000"]);
        let err = check_origin(&with_origin("http://evil.test"), &allowed).unwrap_err();

        assert!(matches!(err, ServerError::OriginNotAllowed(ref o) if o == "http://evil.test"));
        assert_eq!(err.status_code(), axum::http::StatusCode::FORBIDDEN);
    }

    #[test]
    fn origin_match_is_exact() {
        let allowed = list(&["http://localhost:3000"]);
        assert!(check_origin(&with_origin("http://localhost:3000/"), &allowed).is_err());
        assert!(check_origin(&with_origin("https://localhost:3000"), &allowed).is_err());
    }

    #[test]
    fn empty_list_rejects_every_browser_origin() {
        assert!(check_origin(&with_origin("http://localhost:3000"), &list(&[])).is_err());
    }

    #[test]
    fn wildcard_admits_any_origin() {
        assert!(check_origin(&with_origin("http://anything.test"), &AllowedOrigins::Any).is_ok());
    }
}
