//! Resolver errors.

use merx_domain::{IsolationError, TenantError};
use merx_store::StoreError;
use thiserror::Error;

/// Errors from tenant resolution and administration.
#[derive(Debug, Error)]
pub enum ResolverError {
    /// Resolution failed against the isolation contract (unknown tenant,
    /// suspended tenant, and so on).
    #[error(transparent)]
    Isolation(#[from] IsolationError),

    /// A subdomain or custom domain is already held by another tenant.
    #[error("address '{0}' is already taken")]
    AddressTaken(String),

    /// Malformed subdomain or domain.
    #[error(transparent)]
    InvalidAddress(#[from] TenantError),

    /// Storage failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}
