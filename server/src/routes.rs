//! HTTP routes for the socket broker.
//!
//! - `/` - Plain-text liveness banner
//! - `/health` - Health check reporting the deployment environment
//! - `GET /ws` - WebSocket handshake; admitted clients join the hub
//!
//! The liveness endpoints answer any method. Any other path answers `404`
//! with an empty body.
//!
//! # Handshake
//!
//! The `/ws` handshake runs two gates before upgrading:
//!
//! 1. Origin policy ([`check_origin`]): `403` on failure.
//! 2. Token gate ([`authorize`]): `401` on failure.
//!
//! The query string is only parsed once the origin has been accepted.
//!
//! A rejected handshake never touches the hub.
//!
//! # Example
//!
//! ```rust,no_run
//! use socket_broker::config::Config;
//! use socket_broker::routes::{create_router, AppState};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_env().expect("failed to load config");
//!     let state = AppState::new(config);
//!     let app = create_router(state);
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:4000").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```

use std::sync::Arc;

use axum::{
    extract::{
        rejection::QueryRejection, ws::rejection::WebSocketUpgradeRejection, Query, State,
        WebSocketUpgrade,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::auth::{authorize, extract_token};
use crate::config::Config;
use crate::connection::run_connection;
use crate::error::ServerError;
use crate::events::EventHandlers;
use crate::hub::HubHandle;
use crate::origin::{check_origin, cors_layer};

/// Body of `/`.
pub const ROOT_BANNER: &str = "Socket broker is running.\n";

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for all route handlers.
#[derive(Clone)]
pub struct AppState {
    /// Effective configuration, resolved once at startup.
    pub config: Arc<Config>,

    /// Handle to the hub task owning connections and rooms.
    pub hub: HubHandle,

    /// Event-name lookup table used by every connection.
    pub handlers: Arc<EventHandlers>,
}

impl AppState {
    /// Creates the state and spawns the hub task.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self::with_handlers(config, EventHandlers::standard())
    }

    /// Creates the state with a custom handler table.
    #[must_use]
    pub fn with_handlers(config: Config, handlers: EventHandlers) -> Self {
        Self {
            config: Arc::new(config),
            hub: HubHandle::spawn(),
            handlers: Arc::new(handlers),
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("hub", &self.hub)
            .field("handlers", &self.handlers)
            .finish()
    }
}

// ============================================================================
// Router
// ============================================================================

/// Creates the application router.
///
/// CORS headers follow the configured allow-list; every request is traced.
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.allowed_origins);

    Router::new()
        .route("/", any(get_root))
        .route("/health", any(get_health))
        .route("/ws", get(get_ws))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn get_root() -> &'static str {
    ROOT_BANNER
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

// ============================================================================
// GET /health - Health Check
// ============================================================================

/// Response body for the health check endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `true` while the process is serving.
    pub ok: bool,

    /// Deployment environment name.
    pub env: String,
}

/// Reports liveness and the environment. No authentication required.
async fn get_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        env: state.config.environment.clone(),
    })
}

// ============================================================================
// GET /ws - WebSocket Handshake
// ============================================================================

/// Query parameters accepted on the handshake.
#[derive(Debug, Default, Deserialize)]
pub struct WsQueryParams {
    /// Token presented with the handshake. Takes priority over headers.
    pub token: Option<String>,
}

/// Validates the handshake and hands the upgraded socket to the hub.
///
/// # Responses
///
/// - `101 Switching Protocols` - Connection admitted
/// - `400 Bad Request` - Unparseable query string from an allowed origin
/// - `401 Unauthorized` - A presented token failed verification
/// - `403 Forbidden` - Origin outside the allow-list
async fn get_ws(
    State(state): State<AppState>,
    query: Result<Query<WsQueryParams>, QueryRejection>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if let Err(err) = check_origin(&headers, &state.config.allowed_origins) {
        warn!(error = %err, "Rejected handshake from disallowed origin");
        return err.into_response();
    }

    let Query(params) = match query {
        Ok(query) => query,
        Err(rejection) => {
            debug!(error = %rejection, "Rejected handshake with malformed query");
            return rejection.into_response();
        }
    };

    let token = extract_token(params.token.as_deref(), &headers);
    let admission = match authorize(token, state.config.jwt_secret.as_deref()) {
        Ok(admission) => admission,
        Err(err) => {
            warn!(error = %err, "Rejected handshake with invalid token");
            return ServerError::Unauthorized.into_response();
        }
    };

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => {
            debug!(error = %rejection, "Request to /ws is not a WebSocket upgrade");
            return rejection.into_response();
        }
    };

    let AppState { hub, handlers, .. } = state;
    ws.on_upgrade(move |socket| run_connection(socket, hub, handlers, admission))
}

// ============================================================================
// Tests
// ============================================================================
