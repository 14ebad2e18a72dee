//! Daemon configuration.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;
use std::time::Duration;

use merx_auth::AuthConfig;
use merx_resolver::ResolverConfig;

use crate::error::ApiError;

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// API server configuration.
    pub api: ApiConfig,
    /// Session/token configuration.
    pub auth: AuthConfig,
    /// Tenant-resolution configuration.
    pub resolver: ResolverConfig,
    /// Database URL (used only with the `postgres` feature).
    pub database_url: Option<String>,
}

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to bind to.
    pub port: u16,
}

impl Config {
    /// Load configuration from `MERX_*` environment variables.
    pub fn from_env() -> Result<Self, ApiError> {
        // Load .env file if present (ignore errors)
        let _ = dotenvy::dotenv();

        let host = env::var("MERX_API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = match env::var("MERX_API_PORT") {
            Ok(v) => v
                .parse()
                .map_err(|_| ApiError::BadRequest(format!("MERX_API_PORT invalid: '{v}'")))?,
            Err(_) => 8080,
        };

        Ok(Self {
            api: ApiConfig { host, port },
            auth: AuthConfig::from_env()?,
            resolver: ResolverConfig::from_env(),
            database_url: env::var("DATABASE_URL").ok(),
        })
    }

    /// Create test configuration.
    pub fn test() -> Self {
        Self {
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
            },
            auth: AuthConfig::test(),
            resolver: ResolverConfig::new("merx.test", Duration::from_secs(30)),
            database_url: None,
        }
    }
}
