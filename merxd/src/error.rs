//! Daemon errors and their HTTP mapping.
//!
//! Response bodies classify failures by kind only; internal detail stays
//! in the logs. Isolation violations are logged at high severity and are
//! never downgraded to a softer kind.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use merx_auth::AuthError;
use merx_domain::IsolationError;
use merx_resolver::ResolverError;
use merx_store::StoreError;
use serde_json::json;
use thiserror::Error;

/// Result type for daemon operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors surfaced by the HTTP layer.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Isolation-contract violation.
    #[error(transparent)]
    Isolation(#[from] IsolationError),

    /// Authentication or session failure.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Resolution or tenant-administration failure.
    #[error(transparent)]
    Resolver(#[from] ResolverError),

    /// Storage failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// No credentials on a route that requires them.
    #[error("authentication required")]
    Unauthenticated,

    /// Authenticated but lacking the role the route requires.
    #[error("insufficient role")]
    Forbidden,

    /// Malformed request.
    #[error("bad request: {0}")]
    BadRequest(String),
}

impl ApiError {
    fn classify(&self) -> (StatusCode, &'static str) {
        match self {
            // Unknown and soft-deleted tenants are indistinguishable from
            // absent resources.
            ApiError::Isolation(IsolationError::TenantNotFound) => {
                (StatusCode::NOT_FOUND, "not_found")
            }
            ApiError::Isolation(_) => (StatusCode::FORBIDDEN, "not_authorized"),

            ApiError::Auth(AuthError::TokenExpired) => (StatusCode::UNAUTHORIZED, "token_expired"),
            ApiError::Auth(AuthError::Store(e)) => classify_store(e),
            ApiError::Auth(_) => (StatusCode::UNAUTHORIZED, "not_authenticated"),

            ApiError::Resolver(ResolverError::Isolation(IsolationError::TenantNotFound)) => {
                (StatusCode::NOT_FOUND, "not_found")
            }
            ApiError::Resolver(ResolverError::Isolation(_)) => {
                (StatusCode::FORBIDDEN, "not_authorized")
            }
            ApiError::Resolver(ResolverError::AddressTaken(_)) => {
                (StatusCode::CONFLICT, "conflict")
            }
            ApiError::Resolver(ResolverError::InvalidAddress(_)) => {
                (StatusCode::BAD_REQUEST, "bad_request")
            }
            ApiError::Resolver(ResolverError::Store(e)) => classify_store(e),

            ApiError::Store(e) => classify_store(e),

            ApiError::Unauthenticated => (StatusCode::UNAUTHORIZED, "not_authenticated"),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "not_authorized"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
        }
    }

    fn is_isolation_violation(&self) -> bool {
        matches!(
            self,
            ApiError::Isolation(e) | ApiError::Resolver(ResolverError::Isolation(e))
                if e.is_contract_violation()
        ) || matches!(self, ApiError::Store(StoreError::Isolation(_)))
    }
}

fn classify_store(err: &StoreError) -> (StatusCode, &'static str) {
    match err {
        StoreError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
        StoreError::Duplicate { .. } => (StatusCode::CONFLICT, "conflict"),
        StoreError::Isolation(IsolationError::TenantNotFound) => {
            (StatusCode::NOT_FOUND, "not_found")
        }
        StoreError::Isolation(_) => (StatusCode::FORBIDDEN, "not_authorized"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = self.classify();
        if self.is_isolation_violation() {
            tracing::error!(kind, error = %self, "isolation violation rejected");
        } else if status.is_server_error() {
            tracing::error!(kind, error = %self, "request failed");
        } else {
            tracing::debug!(kind, error = %self, "request rejected");
        }
        (status, Json(json!({ "error": { "kind": kind } }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isolation_violations_are_403_and_never_downgraded() {
        for e in [
            IsolationError::NoTenantContext,
            IsolationError::TenantMismatch,
            IsolationError::CrossTenantTokenUse,
            IsolationError::TenantSuspended,
        ] {
            let (status, kind) = ApiError::Isolation(e).classify();
            assert_eq!(status, StatusCode::FORBIDDEN);
            assert_eq!(kind, "not_authorized");
        }
    }

    #[test]
    fn unknown_tenant_is_a_plain_404() {
        let (status, kind) = ApiError::Isolation(IsolationError::TenantNotFound).classify();
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(kind, "not_found");
    }

    #[test]
    fn token_expiry_is_distinguishable_from_other_auth_failures() {
        let (status, kind) = ApiError::Auth(AuthError::TokenExpired).classify();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(kind, "token_expired");

        let (status, kind) = ApiError::Auth(AuthError::TokenInvalid).classify();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(kind, "not_authenticated");
    }
}
