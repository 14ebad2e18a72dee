//! Session configuration, loaded from the environment.

use crate::error::AuthError;

/// Token issuance parameters.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// HMAC secret for access-token signing.
    pub jwt_secret: String,
    /// `iss` claim stamped into and required of every access token.
    pub issuer: String,
    /// Access-token lifetime in seconds.
    pub access_ttl_secs: u64,
    /// Refresh-token lifetime in seconds.
    pub refresh_ttl_secs: u64,
    /// Optional server-side pepper mixed into password hashing.
    pub pepper: Option<String>,
}

impl AuthConfig {
    /// Load from `MERX_*` environment variables.
    ///
    /// # Errors
    ///
    /// `AuthError::Config` when the secret is absent or a TTL fails to
    /// parse.
    pub fn from_env() -> Result<Self, AuthError> {
        let jwt_secret = std::env::var("MERX_JWT_SECRET")
            .map_err(|_| AuthError::Config("MERX_JWT_SECRET is required".into()))?;
        if jwt_secret.len() < 32 {
            return Err(AuthError::Config(
                "MERX_JWT_SECRET must be at least 32 bytes".into(),
            ));
        }
        Ok(Self {
            jwt_secret,
            issuer: std::env::var("MERX_TOKEN_ISSUER").unwrap_or_else(|_| "merx".to_string()),
            access_ttl_secs: parse_var("MERX_ACCESS_TTL_SECS", 900)?,
            refresh_ttl_secs: parse_var("MERX_REFRESH_TTL_SECS", 30 * 24 * 3600)?,
            pepper: std::env::var("MERX_PASSWORD_PEPPER").ok(),
        })
    }

    /// Fixed configuration for tests.
    pub fn test() -> Self {
        Self {
            jwt_secret: "test-secret-test-secret-test-secret!".to_string(),
            issuer: "merx-test".to_string(),
            access_ttl_secs: 900,
            refresh_ttl_secs: 3600,
            pepper: Some("test-pepper".to_string()),
        }
    }
}

fn parse_var(name: &str, default: u64) -> Result<u64, AuthError> {
    match std::env::var(name) {
        Ok(v) => v
            .parse()
            .map_err(|_| AuthError::Config(format!("{name} must be an integer, got '{v}'"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_is_usable() {
        let cfg = AuthConfig::test();
        assert!(cfg.jwt_secret.len() >= 32);
        assert_eq!(cfg.access_ttl_secs, 900);
    }
}
