//! Server configuration module.
//!
//! Resolves the effective configuration once at startup by merging the
//! defaults of the selected deployment environment with process environment
//! overrides. The resulting [`Config`] is never re-read or mutated.
//!
//! # Environment Variables
//!
//! | Variable | Development default | Production default | Description |
//! |----------|--------------------|--------------------|-------------|
//! | `BROKER_ENV` | `development` | - | Deployment environment name (falls back to `NODE_ENV`) |
//! | `PORT` | 4000 | 4000 | HTTP/WebSocket listening port |
//! | `CORS_ORIGINS` | `http://localhost:3000,http://localhost:8080` | (none) | Comma-separated origins, or `*` |
//! | `JWT_SECRET` | `dev-secret` | (none) | Shared secret for token verification |
//!
//! An unrecognized environment name falls back to the development defaults
//! but keeps its own name for reporting.

use std::env;
use std::fmt;

use tracing::warn;

use crate::error::ConfigError;

/// Name of the development environment.
pub const DEVELOPMENT: &str = "development";

/// Name of the production environment.
pub const PRODUCTION: &str = "production";

/// Variables naming the deployment environment, first set one wins.
const ENVIRONMENT_VARS: [&str; 2] = ["BROKER_ENV", "NODE_ENV"];

/// Port used when neither the environment defaults nor `PORT` provide one.
pub const DEFAULT_PORT: u16 = 4000;

/// Wildcard marker accepted by `CORS_ORIGINS`.
const WILDCARD: &str = "*";

/// Origins allowed to open connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedOrigins {
    /// Any origin is accepted.
    Any,

    /// Only these exact origins are accepted. An empty list accepts none.
    List(Vec<String>),
}

impl AllowedOrigins {
    /// Parses a `CORS_ORIGINS` value.
    ///
    /// `*` is the wildcard; anything else is a comma-separated list whose
    /// entries are trimmed and whose empty entries are dropped.
    ///
    /// # Example
    ///
    /// ```rust
    /// use socket_broker::config::AllowedOrigins;
    ///
    /// assert_eq!(AllowedOrigins::parse("*"), AllowedOrigins::Any);
    /// assert_eq!(
    ///     AllowedOrigins::parse(" http://a.test , ,http://b.test"),
    ///     AllowedOrigins::List(vec!["http://a.test".into(), "http://b.test".into()])
    /// );
    /// ```
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw == WILDCARD {
            return Self::Any;
        }

        Self::List(
            raw.split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(String::from)
                .collect(),
        )
    }

    /// Returns `true` if `origin` may open a connection.
    pub fn permits(&self, origin: &str) -> bool {
        match self {
            Self::Any => true,
            Self::List(origins) => origins.iter().any(|allowed| allowed == origin),
        }
    }

    /// Returns `true` for the wildcard configuration.
    pub fn is_wildcard(&self) -> bool {
        matches!(self, Self::Any)
    }
}

impl fmt::Display for AllowedOrigins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str(WILDCARD),
            Self::List(origins) => f.write_str(&origins.join(", ")),
        }
    }
}

/// Effective configuration consumed by the broker.
#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    /// Deployment environment name, reported by the health endpoint.
    pub environment: String,

    /// Listening port.
    pub port: u16,

    /// Origins accepted at the transport layer.
    pub allowed_origins: AllowedOrigins,

    /// Shared secret for token verification. When unset, every presented
    /// token is rejected while token-less connections are still admitted.
    pub jwt_secret: Option<String>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("environment", &self.environment)
            .field("port", &self.port)
            .field("allowed_origins", &self.allowed_origins)
            .field("jwt_secret", &self.jwt_secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Per-environment defaults applied before overrides.
struct EnvironmentDefaults {
    port: u16,
    cors_origins: Option<&'static str>,
    jwt_secret: Option<&'static str>,
}

impl EnvironmentDefaults {
    fn for_environment(name: &str) -> Self {
        match name {
            PRODUCTION => Self {
                port: DEFAULT_PORT,
                cors_origins: None,
                jwt_secret: None,
            },
            _ => Self {
                port: DEFAULT_PORT,
                cors_origins: Some("http://localhost:3000,http://localhost:8080"),
                jwt_secret: Some("dev-secret"),
            },
        }
    }
}

impl Config {
    /// Resolves configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `PORT` is set but is not a valid port number
    /// or if a variable contains invalid unicode.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use socket_broker::config::Config;
    ///
    /// let config = Config::from_env().expect("Failed to load config");
    /// println!("Broker will listen on port {}", config.port);
    /// ```
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = read_environment_name()?;
        let defaults = EnvironmentDefaults::for_environment(&environment);

        let port = match read_env("PORT")? {
            Some(raw) => parse_port(&raw)?,
            None => defaults.port,
        };

        let allowed_origins = match read_env("CORS_ORIGINS")? {
            Some(raw) => AllowedOrigins::parse(&raw),
            None => defaults
                .cors_origins
                .map(AllowedOrigins::parse)
                .unwrap_or(AllowedOrigins::List(Vec::new())),
        };

        let jwt_secret = read_env("JWT_SECRET")?.or(defaults.jwt_secret.map(String::from));

        let config = Self {
            environment,
            port,
            allowed_origins,
            jwt_secret,
        };

        if config.jwt_secret.is_none() {
            warn!("JWT_SECRET is not set - every connection presenting a token will be rejected");
        }
        if matches!(&config.allowed_origins, AllowedOrigins::List(list) if list.is_empty()) {
            warn!("CORS_ORIGINS is empty - browser connections declaring an origin will be rejected");
        }

        Ok(config)
    }
}

fn read_environment_name() -> Result<String, ConfigError> {
    for name in ENVIRONMENT_VARS {
        if let Some(value) = read_env(name)? {
            return Ok(value);
        }
    }
    Ok(DEVELOPMENT.to_string())
}

/// Reads an environment variable, treating empty values as unset.
fn read_env(name: &str) -> Result<Option<String>, ConfigError> {
    match env::var(name) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => Ok(Some(value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(env::VarError::NotUnicode(_)) => {
            Err(ConfigError::invalid(name, "contains invalid unicode"))
        }
    }
}

fn parse_port(raw: &str) -> Result<u16, ConfigError> {
    raw.trim()
        .parse::<u16>()
        .map_err(|err| ConfigError::invalid("PORT", err.to_string()))
}
