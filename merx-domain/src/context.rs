//! Per-request tenant context.
//!
//! The context is an explicit value threaded through every call, never a
//! mutable global and never task-local state, so two concurrent requests
//! cannot observe each other's tenant. It is constructed once per request
//! by the daemon middleware and dropped when the request ends.
//!
//! The cross-tenant bypass is a distinct proof type, not a flag: the only
//! way to obtain a [`CrossTenantContext`] is [`RequestContext::elevate`],
//! which requires the platform-superadmin role. Every place isolation is
//! intentionally bypassed is therefore enumerable by searching for the
//! type.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::IsolationError;
use crate::principal::{PrincipalId, Role};
use crate::tenant::TenantId;

/// Authenticated principal attached to a request context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalContext {
    /// Authenticated principal.
    pub principal_id: PrincipalId,
    /// Role carried by the verified access token.
    pub role: Role,
}

/// Resolved tenant (and, once authentication succeeds, principal) for one
/// inbound request.
///
/// # Invariants
///
/// - Never shared, cached, or reused across two inbound requests. The
///   value is created by the middleware for one request and moves with it.
/// - `tenant_id` is set at construction and cannot be re-pointed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    tenant_id: TenantId,
    principal: Option<PrincipalContext>,
}

impl RequestContext {
    /// Context for a resolved but unauthenticated request (e.g. login).
    pub fn for_tenant(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            principal: None,
        }
    }

    /// Context for an authenticated request.
    pub fn authenticated(tenant_id: TenantId, principal_id: PrincipalId, role: Role) -> Self {
        Self {
            tenant_id,
            principal: Some(PrincipalContext { principal_id, role }),
        }
    }

    /// The resolved tenant.
    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// The authenticated principal, if any.
    pub fn principal(&self) -> Option<&PrincipalContext> {
        self.principal.as_ref()
    }

    /// The authenticated role, if any.
    pub fn role(&self) -> Option<Role> {
        self.principal.map(|p| p.role)
    }

    /// Attach the authenticated principal after credential verification.
    pub fn with_principal(mut self, principal_id: PrincipalId, role: Role) -> Self {
        self.principal = Some(PrincipalContext { principal_id, role });
        self
    }

    /// Obtain cross-tenant proof for an administrative operation.
    ///
    /// # Errors
    ///
    /// Fails closed with `CrossTenantTokenUse` unless the authenticated
    /// role is platform-superadmin.
    pub fn elevate(&self) -> Result<CrossTenantContext, IsolationError> {
        match self.principal {
            Some(p) if p.role.is_superadmin() => Ok(CrossTenantContext {
                principal_id: p.principal_id,
            }),
            _ => Err(IsolationError::CrossTenantTokenUse),
        }
    }
}

/// Proof that the caller is a platform superadmin performing an operation
/// explicitly designed to span tenants.
///
/// The field is private; the only constructor is
/// [`RequestContext::elevate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrossTenantContext {
    principal_id: PrincipalId,
}

impl CrossTenantContext {
    /// The superadmin performing the operation (for audit entries).
    pub fn principal_id(&self) -> PrincipalId {
        self.principal_id
    }
}

/// Execute `f` with the given context visible only within the call's
/// dynamic extent.
///
/// Because the context is an owned parameter rather than ambient state,
/// nothing remains after the future completes; there is no pool-wide slot
/// to reset. The function exists to make the scoping explicit at call
/// sites that fan out work for one request.
pub async fn with_tenant_context<T, Fut, F>(ctx: RequestContext, f: F) -> T
where
    F: FnOnce(RequestContext) -> Fut,
    Fut: Future<Output = T>,
{
    f(ctx).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn elevate_requires_superadmin() {
        let tid = Uuid::now_v7();
        let pid = Uuid::now_v7();

        let anon = RequestContext::for_tenant(tid);
        assert_eq!(
            anon.elevate().unwrap_err(),
            IsolationError::CrossTenantTokenUse
        );

        let customer = RequestContext::authenticated(tid, pid, Role::Customer);
        assert!(customer.elevate().is_err());

        let admin = RequestContext::authenticated(tid, pid, Role::TenantAdmin);
        assert!(admin.elevate().is_err());

        let root = RequestContext::authenticated(tid, pid, Role::PlatformSuperadmin);
        let proof = root.elevate().unwrap();
        assert_eq!(proof.principal_id(), pid);
    }

    #[test]
    fn with_principal_attaches_identity() {
        let tid = Uuid::now_v7();
        let pid = Uuid::now_v7();
        let ctx = RequestContext::for_tenant(tid).with_principal(pid, Role::Customer);
        assert_eq!(ctx.tenant_id(), tid);
        assert_eq!(ctx.role(), Some(Role::Customer));
        assert_eq!(ctx.principal().unwrap().principal_id, pid);
    }

    #[tokio::test]
    async fn contexts_stay_isolated_across_concurrent_tasks() {
        // The highest-severity defect class: one request's tenant leaking
        // into a concurrent request. Spawn many tasks, each scoped to its
        // own tenant, with yields in the middle to force interleaving.
        let mut handles = Vec::new();
        for _ in 0..32 {
            let tid = Uuid::now_v7();
            handles.push(tokio::spawn(async move {
                let observed = with_tenant_context(RequestContext::for_tenant(tid), |ctx| async move {
                    tokio::task::yield_now().await;
                    let first = ctx.tenant_id();
                    tokio::task::yield_now().await;
                    (first, ctx.tenant_id())
                })
                .await;
                (tid, observed)
            }));
        }
        for h in handles {
            let (tid, (a, b)) = h.await.unwrap();
            assert_eq!(a, tid);
            assert_eq!(b, tid);
        }
    }
}
