//! Isolation error taxonomy.
//!
//! These are the contract-violation errors of the isolation layer. They are
//! always fatal to the request that raised them, never retried, and never
//! downgraded into a softer response on the way out.

use thiserror::Error;

/// Violations of the tenant-isolation contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IsolationError {
    /// No tenant matches the inbound host or identifier.
    #[error("tenant not found")]
    TenantNotFound,

    /// The tenant exists but is suspended.
    #[error("tenant is suspended")]
    TenantSuspended,

    /// A tenant-scoped operation was attempted without a resolved tenant
    /// context.
    #[error("no tenant context")]
    NoTenantContext,

    /// A caller-supplied tenant_id conflicts with the active context.
    #[error("tenant mismatch")]
    TenantMismatch,

    /// An access token bound to one tenant was presented against a request
    /// resolved to a different tenant.
    #[error("cross-tenant token use")]
    CrossTenantTokenUse,
}

impl IsolationError {
    /// Stable machine-readable kind, the only thing callers ever see.
    ///
    /// Responses classify by kind, never by message text, so schema and
    /// policy details cannot leak.
    pub fn kind(&self) -> &'static str {
        match self {
            IsolationError::TenantNotFound => "tenant_not_found",
            IsolationError::TenantSuspended => "tenant_suspended",
            IsolationError::NoTenantContext => "no_tenant_context",
            IsolationError::TenantMismatch => "tenant_mismatch",
            IsolationError::CrossTenantTokenUse => "cross_tenant_token_use",
        }
    }

    /// True for the violations that indicate a broken caller or an attack,
    /// as opposed to a plain resolution failure.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            IsolationError::NoTenantContext
                | IsolationError::TenantMismatch
                | IsolationError::CrossTenantTokenUse
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(IsolationError::TenantNotFound.kind(), "tenant_not_found");
        assert_eq!(
            IsolationError::CrossTenantTokenUse.kind(),
            "cross_tenant_token_use"
        );
    }

    #[test]
    fn contract_violations_classified() {
        assert!(IsolationError::NoTenantContext.is_contract_violation());
        assert!(IsolationError::TenantMismatch.is_contract_violation());
        assert!(IsolationError::CrossTenantTokenUse.is_contract_violation());
        assert!(!IsolationError::TenantNotFound.is_contract_violation());
        assert!(!IsolationError::TenantSuspended.is_contract_violation());
    }
}
