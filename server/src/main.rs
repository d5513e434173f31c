//! Socket broker - Main entry point.
//!
//! This binary starts the broker with:
//! - Structured JSON logging
//! - Optional `.env` file loading
//! - Graceful shutdown handling (SIGTERM/SIGINT)
//!
//! # Configuration
//!
//! See [`socket_broker::config`] for environment variable configuration.
//!
//! # Example
//!
//! ```bash
//! # Development defaults (port 4000, localhost origins, dev secret)
//! cargo run --bin socket-broker
//!
//! # Production
//! BROKER_ENV=production \
//! JWT_SECRET="change-me" \
//! CORS_ORIGINS="https://app.example.com" \
//! PORT=8080 \
//! cargo run --release --bin socket-broker
//! ```

use std::process::ExitCode;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use socket_broker::config::Config;
use socket_broker::routes::{create_router, AppState};

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is not an error
    let dotenv = dotenvy::dotenv();

    init_logging();

    if let Ok(path) = dotenv {
        info!(path = %path.display(), "Loaded environment file");
    }

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "Failed to load configuration");
            eprintln!("Error: {err}");
            eprintln!();
            eprintln!("Environment variables:");
            eprintln!("  BROKER_ENV    - development (default) or production; NODE_ENV is used when unset");
            eprintln!("  PORT          - Listening port (default: 4000)");
            eprintln!("  CORS_ORIGINS  - Comma-separated allowed origins, or *");
            eprintln!("  JWT_SECRET    - Shared secret for handshake tokens");
            eprintln!("  RUST_LOG      - Log level filter (default: info)");
            return ExitCode::from(1);
        }
    };

    match run(config).await {
        Ok(()) => {
            info!("Server shutdown complete");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %format!("{err:#}"), "Server error");
            ExitCode::from(1)
        }
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    info!(
        env = %config.environment,
        port = config.port,
        cors_origins = %config.allowed_origins,
        auth = config.jwt_secret.is_some(),
        "Socket broker starting"
    );

    let bind_addr = format!("0.0.0.0:{}", config.port);
    let state = AppState::new(config);
    let app = create_router(state);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind to {bind_addr}"))?;
    info!(address = %bind_addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server terminated unexpectedly")?;

    info!("Server shutting down gracefully");
    Ok(())
}

/// Initialize structured logging with tracing.
///
/// JSON output filtered by `RUST_LOG`, defaulting to `info` with request
/// traces from `tower_http`.
fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug,axum::rejection=trace"));

    let json_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_level(true)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .init();
}

/// Resolves on SIGINT (Ctrl+C) or SIGTERM.
///
/// Once it resolves the listener stops accepting; open connections are
/// closed as the runtime shuts down.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
