//! Session layer errors.

use merx_store::StoreError;
use thiserror::Error;

/// Errors from authentication and session management.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown email or wrong password. Deliberately indistinguishable.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Principal exists but may no longer authenticate.
    #[error("principal is inactive")]
    PrincipalInactive,

    /// Access token past its expiry.
    #[error("access token expired")]
    TokenExpired,

    /// Access token failed signature or claim validation.
    #[error("access token invalid")]
    TokenInvalid,

    /// Refresh token unknown, expired, or revoked.
    #[error("refresh token invalid")]
    RefreshTokenInvalid,

    /// Refresh token presented after it was already consumed. The whole
    /// session family has been revoked.
    #[error("refresh token reuse detected")]
    RefreshTokenReused,

    /// Hashing or signing failure.
    #[error("cryptographic operation failed: {0}")]
    Crypto(String),

    /// Misconfiguration (missing secret, bad TTL).
    #[error("auth configuration error: {0}")]
    Config(String),

    /// Storage failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AuthError {
    /// Stable classification string for API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::PrincipalInactive => "principal_inactive",
            AuthError::TokenExpired => "token_expired",
            AuthError::TokenInvalid => "token_invalid",
            AuthError::RefreshTokenInvalid => "refresh_token_invalid",
            AuthError::RefreshTokenReused => "refresh_token_reused",
            AuthError::Crypto(_) => "crypto_error",
            AuthError::Config(_) => "config_error",
            AuthError::Store(_) => "store_error",
        }
    }
}
