//! In-memory gateway implementation.
//!
//! Used for testing and development without a database, with the same
//! isolation discipline as the PostgreSQL gateway: every tenant-scoped
//! operation acquires a pooled connection, sets a transaction-local tenant
//! parameter on it, filters rows through that parameter (not through the
//! caller's value directly), and clears the parameter before the
//! connection returns to the pool. A connection found dirty at acquisition
//! is reported as a connection error; that is the isolation breach the
//! pool discipline exists to prevent.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use merx_domain::{
    AuditEntry, CrossTenantContext, IsolationError, NewProduct, Principal, PrincipalId, Product,
    ProductId, RefreshSession, RequestContext, Tenant, TenantId, TenantStatus,
};
use merx_policy::PolicyRegistry;
use uuid::Uuid;

use crate::audit::Audited;
use crate::error::StoreError;
use crate::repository::{
    AuditSink, PrincipalRepository, ProductRepository, RedeemOutcome, RefreshSessionRepository,
    Store, TenantRepository,
};

// =============================================================================
// Simulated connection pool
// =============================================================================

/// Per-connection policy state, the analogue of PostgreSQL's
/// transaction-local settings.
#[derive(Debug, Default)]
struct ConnState {
    tenant_param: Option<TenantId>,
    bypass: bool,
}

/// Fixed-size pool of reusable connections shared by all operations.
struct ConnPool {
    conns: Vec<Mutex<ConnState>>,
    next: AtomicUsize,
}

impl ConnPool {
    fn new(size: usize) -> Self {
        Self {
            conns: (0..size.max(1)).map(|_| Mutex::new(ConnState::default())).collect(),
            next: AtomicUsize::new(0),
        }
    }

    /// Round-robin acquisition; blocks while another operation holds the
    /// connection, modelling pool contention.
    fn acquire(&self) -> MutexGuard<'_, ConnState> {
        let i = self.next.fetch_add(1, Ordering::Relaxed) % self.conns.len();
        self.conns[i].lock().unwrap()
    }
}

// =============================================================================
// Shared state
// =============================================================================

struct MemoryInner {
    registry: PolicyRegistry,
    pool: ConnPool,
    tenants: RwLock<HashMap<TenantId, Tenant>>,
    principals: RwLock<HashMap<PrincipalId, Principal>>,
    sessions: RwLock<HashMap<Uuid, RefreshSession>>,
    products: RwLock<HashMap<ProductId, Product>>,
    audit: RwLock<Vec<AuditEntry>>,
    queries: AtomicU64,
}

impl MemoryInner {
    /// Run one tenant-scoped operation: policy check, clean connection,
    /// tenant parameter set for exactly the operation's extent.
    ///
    /// Rows must be filtered through the `TenantId` handed to the
    /// closure. It is read back off the connection, so a parameter leak
    /// would be observable rather than masked.
    fn scoped<T>(
        &self,
        ctx: &RequestContext,
        table: &'static str,
        f: impl FnOnce(&Self, TenantId) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        self.registry.require(table)?;
        let mut conn = self.pool.acquire();
        if conn.tenant_param.is_some() || conn.bypass {
            return Err(StoreError::Connection(
                "pooled connection carried a leftover policy parameter".into(),
            ));
        }
        conn.tenant_param = Some(ctx.tenant_id());
        self.queries.fetch_add(1, Ordering::SeqCst);
        let effective = match conn.tenant_param {
            Some(t) => t,
            None => {
                return Err(StoreError::Connection("tenant parameter unset".into()));
            }
        };
        let out = f(self, effective);
        conn.tenant_param = None;
        conn.bypass = false;
        out
    }

    /// Run one administrative cross-tenant operation under the bypass
    /// marker. Callable only from methods that hold a
    /// [`CrossTenantContext`].
    fn with_bypass<T>(
        &self,
        table: &'static str,
        f: impl FnOnce(&Self) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        self.registry.require(table)?;
        let mut conn = self.pool.acquire();
        if conn.tenant_param.is_some() || conn.bypass {
            return Err(StoreError::Connection(
                "pooled connection carried a leftover policy parameter".into(),
            ));
        }
        conn.bypass = true;
        self.queries.fetch_add(1, Ordering::SeqCst);
        let out = f(self);
        conn.bypass = false;
        conn.tenant_param = None;
        out
    }

    /// Platform-level (non-tenant-scoped) statement accounting.
    fn count_query(&self) {
        self.queries.fetch_add(1, Ordering::SeqCst);
    }
}

// =============================================================================
// Store facade
// =============================================================================

/// In-memory gateway for testing and development.
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
    tenants: MemoryTenants,
    principals: MemoryPrincipals,
    sessions: MemorySessions,
    products: Audited<MemoryProducts, MemoryAudit>,
    audit: MemoryAudit,
}

impl MemoryStore {
    /// Create an empty store covering all built-in tenant-scoped tables.
    pub fn new() -> Self {
        Self::with_registry(PolicyRegistry::builtin())
    }

    /// Create a store with a custom policy registry (test hook for the
    /// deny-all posture).
    pub fn with_registry(registry: PolicyRegistry) -> Self {
        let inner = Arc::new(MemoryInner {
            registry,
            pool: ConnPool::new(4),
            tenants: RwLock::new(HashMap::new()),
            principals: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
            products: RwLock::new(HashMap::new()),
            audit: RwLock::new(Vec::new()),
            queries: AtomicU64::new(0),
        });
        Self {
            tenants: MemoryTenants(inner.clone()),
            principals: MemoryPrincipals(inner.clone()),
            sessions: MemorySessions(inner.clone()),
            products: Audited::new(MemoryProducts(inner.clone()), MemoryAudit(inner.clone())),
            audit: MemoryAudit(inner.clone()),
            inner,
        }
    }

    /// Number of statements executed. Test support for "zero queries
    /// issued" assertions.
    pub fn query_count(&self) -> u64 {
        self.inner.queries.load(Ordering::SeqCst)
    }

    /// Snapshot of all audit entries, oldest first. Test support; the
    /// scoped read is [`AuditSink::list`].
    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.inner.audit.read().unwrap().clone()
    }

    /// Clear all data (test setup).
    pub fn clear(&self) {
        self.inner.tenants.write().unwrap().clear();
        self.inner.principals.write().unwrap().clear();
        self.inner.sessions.write().unwrap().clear();
        self.inner.products.write().unwrap().clear();
        self.inner.audit.write().unwrap().clear();
        self.inner.queries.store(0, Ordering::SeqCst);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for MemoryStore {
    fn tenants(&self) -> &dyn TenantRepository {
        &self.tenants
    }

    fn principals(&self) -> &dyn PrincipalRepository {
        &self.principals
    }

    fn refresh_sessions(&self) -> &dyn RefreshSessionRepository {
        &self.sessions
    }

    fn products(&self) -> &dyn ProductRepository {
        &self.products
    }

    fn audit(&self) -> &dyn AuditSink {
        &self.audit
    }
}

// =============================================================================
// Tenants (platform-level table)
// =============================================================================

struct MemoryTenants(Arc<MemoryInner>);

impl MemoryTenants {
    /// Case-insensitive address conflict against every other tenant.
    fn address_conflict(
        tenants: &HashMap<TenantId, Tenant>,
        id: TenantId,
        subdomain: &str,
        custom_domain: Option<&str>,
    ) -> Option<String> {
        for t in tenants.values() {
            if t.id == id {
                continue;
            }
            if t.subdomain.eq_ignore_ascii_case(subdomain) {
                return Some(subdomain.to_string());
            }
            if let (Some(a), Some(b)) = (t.custom_domain.as_deref(), custom_domain) {
                if a.eq_ignore_ascii_case(b) {
                    return Some(b.to_string());
                }
            }
        }
        None
    }
}

#[async_trait]
impl TenantRepository for MemoryTenants {
    async fn create(&self, _admin: &CrossTenantContext, tenant: &Tenant) -> Result<(), StoreError> {
        self.0.count_query();
        let mut tenants = self.0.tenants.write().unwrap();
        if let Some(addr) = Self::address_conflict(
            &tenants,
            tenant.id,
            &tenant.subdomain,
            tenant.custom_domain.as_deref(),
        ) {
            return Err(StoreError::duplicate("tenant", addr));
        }
        tenants.insert(tenant.id, tenant.clone());
        Ok(())
    }

    async fn get(&self, id: TenantId) -> Result<Option<Tenant>, StoreError> {
        self.0.count_query();
        Ok(self.0.tenants.read().unwrap().get(&id).cloned())
    }

    async fn find_by_subdomain(&self, subdomain: &str) -> Result<Option<Tenant>, StoreError> {
        self.0.count_query();
        Ok(self
            .0
            .tenants
            .read()
            .unwrap()
            .values()
            .find(|t| t.subdomain.eq_ignore_ascii_case(subdomain))
            .cloned())
    }

    async fn find_by_custom_domain(&self, domain: &str) -> Result<Option<Tenant>, StoreError> {
        self.0.count_query();
        Ok(self
            .0
            .tenants
            .read()
            .unwrap()
            .values()
            .find(|t| {
                t.custom_domain
                    .as_deref()
                    .map(|d| d.eq_ignore_ascii_case(domain))
                    .unwrap_or(false)
            })
            .cloned())
    }

    async fn list(&self, _admin: &CrossTenantContext) -> Result<Vec<Tenant>, StoreError> {
        self.0.count_query();
        let mut out: Vec<Tenant> = self.0.tenants.read().unwrap().values().cloned().collect();
        out.sort_by_key(|t| t.created_at);
        Ok(out)
    }

    async fn update_status(
        &self,
        _admin: &CrossTenantContext,
        id: TenantId,
        status: TenantStatus,
    ) -> Result<Tenant, StoreError> {
        self.0.count_query();
        let mut tenants = self.0.tenants.write().unwrap();
        let tenant = tenants
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("tenant", id.to_string()))?;
        tenant.status = status;
        tenant.updated_at = Utc::now();
        if status == TenantStatus::SoftDeleted {
            tenant.deleted_at = Some(tenant.updated_at);
        }
        Ok(tenant.clone())
    }

    async fn update_domains(
        &self,
        _admin: &CrossTenantContext,
        id: TenantId,
        subdomain: &str,
        custom_domain: Option<&str>,
    ) -> Result<Tenant, StoreError> {
        self.0.count_query();
        let mut tenants = self.0.tenants.write().unwrap();
        if let Some(addr) = Self::address_conflict(&tenants, id, subdomain, custom_domain) {
            return Err(StoreError::duplicate("tenant", addr));
        }
        let tenant = tenants
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("tenant", id.to_string()))?;
        tenant
            .set_domains(subdomain, custom_domain)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(tenant.clone())
    }
}

// =============================================================================
// Principals
// =============================================================================

struct MemoryPrincipals(Arc<MemoryInner>);

#[async_trait]
impl PrincipalRepository for MemoryPrincipals {
    async fn create(
        &self,
        ctx: &RequestContext,
        principal: &Principal,
    ) -> Result<(), StoreError> {
        if principal.tenant_id != ctx.tenant_id() {
            return Err(IsolationError::TenantMismatch.into());
        }
        self.0.scoped(ctx, "principals", |inner, tenant| {
            let mut principals = inner.principals.write().unwrap();
            let email_taken = principals.values().any(|p| {
                p.tenant_id == tenant
                    && p.deleted_at.is_none()
                    && p.email.eq_ignore_ascii_case(&principal.email)
            });
            if email_taken {
                return Err(StoreError::duplicate("principal", principal.email.clone()));
            }
            let mut row = principal.clone();
            row.tenant_id = tenant;
            principals.insert(row.id, row);
            Ok(())
        })
    }

    async fn get(
        &self,
        ctx: &RequestContext,
        id: PrincipalId,
    ) -> Result<Option<Principal>, StoreError> {
        self.0.scoped(ctx, "principals", |inner, tenant| {
            Ok(inner
                .principals
                .read()
                .unwrap()
                .get(&id)
                .filter(|p| p.tenant_id == tenant)
                .cloned())
        })
    }

    async fn find_by_email(
        &self,
        ctx: &RequestContext,
        email: &str,
    ) -> Result<Option<Principal>, StoreError> {
        self.0.scoped(ctx, "principals", |inner, tenant| {
            Ok(inner
                .principals
                .read()
                .unwrap()
                .values()
                .find(|p| {
                    p.tenant_id == tenant
                        && p.deleted_at.is_none()
                        && p.email.eq_ignore_ascii_case(email)
                })
                .cloned())
        })
    }
}

// =============================================================================
// Refresh sessions
// =============================================================================

struct MemorySessions(Arc<MemoryInner>);

#[async_trait]
impl RefreshSessionRepository for MemorySessions {
    async fn create(
        &self,
        ctx: &RequestContext,
        session: &RefreshSession,
    ) -> Result<(), StoreError> {
        if session.tenant_id != ctx.tenant_id() {
            return Err(IsolationError::TenantMismatch.into());
        }
        self.0.scoped(ctx, "refresh_sessions", |inner, tenant| {
            let mut row = session.clone();
            row.tenant_id = tenant;
            inner.sessions.write().unwrap().insert(row.id, row);
            Ok(())
        })
    }

    async fn redeem(
        &self,
        ctx: &RequestContext,
        token_hash: &str,
    ) -> Result<RedeemOutcome, StoreError> {
        self.0.scoped(ctx, "refresh_sessions", |inner, tenant| {
            let mut sessions = inner.sessions.write().unwrap();
            let found = sessions
                .values_mut()
                .find(|s| s.tenant_id == tenant && s.token_hash == token_hash);
            match found {
                None => Ok(RedeemOutcome::Unknown),
                Some(s) if s.consumed_at.is_some() => {
                    Ok(RedeemOutcome::AlreadyConsumed(s.clone()))
                }
                // Revoked tokens are simply dead; only consumed ones are
                // the reuse signal.
                Some(s) if s.revoked_at.is_some() => Ok(RedeemOutcome::Unknown),
                Some(s) => {
                    s.consumed_at = Some(Utc::now());
                    Ok(RedeemOutcome::Redeemed(s.clone()))
                }
            }
        })
    }

    async fn revoke(&self, ctx: &RequestContext, token_hash: &str) -> Result<(), StoreError> {
        self.0.scoped(ctx, "refresh_sessions", |inner, tenant| {
            let mut sessions = inner.sessions.write().unwrap();
            if let Some(s) = sessions
                .values_mut()
                .find(|s| s.tenant_id == tenant && s.token_hash == token_hash)
            {
                if s.revoked_at.is_none() {
                    s.revoked_at = Some(Utc::now());
                }
            }
            Ok(())
        })
    }

    async fn revoke_all_for_principal(
        &self,
        ctx: &RequestContext,
        principal_id: PrincipalId,
    ) -> Result<u64, StoreError> {
        self.0.scoped(ctx, "refresh_sessions", |inner, tenant| {
            let mut sessions = inner.sessions.write().unwrap();
            let now = Utc::now();
            let mut revoked = 0u64;
            for s in sessions.values_mut() {
                if s.tenant_id == tenant
                    && s.principal_id == principal_id
                    && s.revoked_at.is_none()
                    && s.consumed_at.is_none()
                {
                    s.revoked_at = Some(now);
                    revoked += 1;
                }
            }
            Ok(revoked)
        })
    }

    async fn live_count_for_principal(
        &self,
        ctx: &RequestContext,
        principal_id: PrincipalId,
    ) -> Result<u64, StoreError> {
        self.0.scoped(ctx, "refresh_sessions", |inner, tenant| {
            Ok(inner
                .sessions
                .read()
                .unwrap()
                .values()
                .filter(|s| s.tenant_id == tenant && s.principal_id == principal_id && s.is_live())
                .count() as u64)
        })
    }
}

// =============================================================================
// Products
// =============================================================================

struct MemoryProducts(Arc<MemoryInner>);

#[async_trait]
impl ProductRepository for MemoryProducts {
    async fn insert(
        &self,
        ctx: &RequestContext,
        new: &NewProduct,
    ) -> Result<Product, StoreError> {
        // Conflicting caller-supplied tenant is rejected before any
        // statement executes.
        if let Some(claimed) = new.tenant_id {
            if claimed != ctx.tenant_id() {
                return Err(IsolationError::TenantMismatch.into());
            }
        }
        self.0.scoped(ctx, "products", |inner, tenant| {
            let product = Product::create(tenant, new);
            inner
                .products
                .write()
                .unwrap()
                .insert(product.id, product.clone());
            Ok(product)
        })
    }

    async fn list(&self, ctx: &RequestContext) -> Result<Vec<Product>, StoreError> {
        self.0.scoped(ctx, "products", |inner, tenant| {
            let mut out: Vec<Product> = inner
                .products
                .read()
                .unwrap()
                .values()
                .filter(|p| p.tenant_id == tenant && p.is_live())
                .cloned()
                .collect();
            out.sort_by_key(|p| p.created_at);
            Ok(out)
        })
    }

    async fn get(
        &self,
        ctx: &RequestContext,
        id: ProductId,
    ) -> Result<Option<Product>, StoreError> {
        self.0.scoped(ctx, "products", |inner, tenant| {
            Ok(inner
                .products
                .read()
                .unwrap()
                .get(&id)
                .filter(|p| p.tenant_id == tenant && p.is_live())
                .cloned())
        })
    }

    async fn soft_delete(
        &self,
        ctx: &RequestContext,
        id: ProductId,
    ) -> Result<Product, StoreError> {
        self.0.scoped(ctx, "products", |inner, tenant| {
            let mut products = inner.products.write().unwrap();
            let product = products
                .get_mut(&id)
                .filter(|p| p.tenant_id == tenant && p.is_live())
                .ok_or_else(|| StoreError::not_found("product", id.to_string()))?;
            let now = Utc::now();
            product.deleted_at = Some(now);
            product.updated_at = now;
            Ok(product.clone())
        })
    }

    async fn list_all(&self, _admin: &CrossTenantContext) -> Result<Vec<Product>, StoreError> {
        self.0.with_bypass("products", |inner| {
            let mut out: Vec<Product> = inner
                .products
                .read()
                .unwrap()
                .values()
                .filter(|p| p.is_live())
                .cloned()
                .collect();
            out.sort_by_key(|p| p.created_at);
            Ok(out)
        })
    }
}

// =============================================================================
// Audit
// =============================================================================

struct MemoryAudit(Arc<MemoryInner>);

#[async_trait]
impl AuditSink for MemoryAudit {
    async fn append(&self, ctx: &RequestContext, entry: &AuditEntry) -> Result<(), StoreError> {
        // The table is append-only by construction (no update/delete
        // method exists).
        if entry.tenant_id != ctx.tenant_id() {
            return Err(IsolationError::TenantMismatch.into());
        }
        self.0.scoped(ctx, "audit_log", |inner, _tenant| {
            inner.audit.write().unwrap().push(entry.clone());
            Ok(())
        })
    }

    async fn append_as_admin(
        &self,
        _admin: &CrossTenantContext,
        entry: &AuditEntry,
    ) -> Result<(), StoreError> {
        self.0.with_bypass("audit_log", |inner| {
            inner.audit.write().unwrap().push(entry.clone());
            Ok(())
        })
    }

    async fn list(&self, ctx: &RequestContext) -> Result<Vec<AuditEntry>, StoreError> {
        self.0.scoped(ctx, "audit_log", |inner, tenant| {
            Ok(inner
                .audit
                .read()
                .unwrap()
                .iter()
                .filter(|e| e.tenant_id == tenant)
                .cloned()
                .collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use merx_domain::Role;
    use rust_decimal_macros::dec;

    fn superadmin_proof() -> CrossTenantContext {
        RequestContext::authenticated(Uuid::now_v7(), Uuid::now_v7(), Role::PlatformSuperadmin)
            .elevate()
            .unwrap()
    }

    fn widget(name: &str) -> NewProduct {
        NewProduct {
            name: name.into(),
            price: dec!(9.99),
            tenant_id: None,
        }
    }

    #[tokio::test]
    async fn insert_stamps_tenant_from_context() {
        let store = MemoryStore::new();
        let ctx = RequestContext::for_tenant(Uuid::now_v7());

        let product = store.products().insert(&ctx, &widget("Widget")).await.unwrap();
        assert_eq!(product.tenant_id, ctx.tenant_id());
    }

    #[tokio::test]
    async fn conflicting_payload_tenant_is_rejected_before_any_statement() {
        let store = MemoryStore::new();
        let ctx = RequestContext::for_tenant(Uuid::now_v7());
        let before = store.query_count();

        let mut new = widget("Widget");
        new.tenant_id = Some(Uuid::now_v7());
        let err = store.products().insert(&ctx, &new).await.unwrap_err();

        assert!(matches!(
            err,
            StoreError::Isolation(IsolationError::TenantMismatch)
        ));
        assert_eq!(store.query_count(), before, "no statement may have executed");
    }

    #[tokio::test]
    async fn matching_payload_tenant_is_accepted() {
        let store = MemoryStore::new();
        let ctx = RequestContext::for_tenant(Uuid::now_v7());
        let mut new = widget("Widget");
        new.tenant_id = Some(ctx.tenant_id());
        assert!(store.products().insert(&ctx, &new).await.is_ok());
    }

    #[tokio::test]
    async fn reads_are_confined_to_the_context_tenant() {
        let store = MemoryStore::new();
        let ctx_a = RequestContext::for_tenant(Uuid::now_v7());
        let ctx_b = RequestContext::for_tenant(Uuid::now_v7());

        store.products().insert(&ctx_a, &widget("A widget")).await.unwrap();

        assert_eq!(store.products().list(&ctx_a).await.unwrap().len(), 1);
        assert!(store.products().list(&ctx_b).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn get_does_not_cross_tenants_even_with_the_right_id() {
        let store = MemoryStore::new();
        let ctx_a = RequestContext::for_tenant(Uuid::now_v7());
        let ctx_b = RequestContext::for_tenant(Uuid::now_v7());

        let p = store.products().insert(&ctx_a, &widget("W")).await.unwrap();
        assert!(store.products().get(&ctx_b, p.id).await.unwrap().is_none());
        assert!(store.products().get(&ctx_a, p.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn soft_deleted_products_disappear_from_reads() {
        let store = MemoryStore::new();
        let ctx = RequestContext::for_tenant(Uuid::now_v7());

        let p = store.products().insert(&ctx, &widget("W")).await.unwrap();
        store.products().soft_delete(&ctx, p.id).await.unwrap();

        assert!(store.products().list(&ctx).await.unwrap().is_empty());
        assert!(store.products().get(&ctx, p.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cross_tenant_list_requires_proof() {
        let store = MemoryStore::new();
        let ctx_a = RequestContext::for_tenant(Uuid::now_v7());
        let ctx_b = RequestContext::for_tenant(Uuid::now_v7());
        store.products().insert(&ctx_a, &widget("A")).await.unwrap();
        store.products().insert(&ctx_b, &widget("B")).await.unwrap();

        let all = store.products().list_all(&superadmin_proof()).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn unregistered_table_is_deny_all() {
        let store = MemoryStore::with_registry(PolicyRegistry::empty());
        let ctx = RequestContext::for_tenant(Uuid::now_v7());

        let err = store.products().insert(&ctx, &widget("W")).await.unwrap_err();
        assert!(matches!(err, StoreError::PolicyMissing { table } if table == "products"));
        assert!(store.audit_entries().is_empty());
    }

    #[tokio::test]
    async fn tenant_addresses_are_unique_case_insensitively() {
        let store = MemoryStore::new();
        let admin = superadmin_proof();

        let acme = Tenant::new("Acme", "acme").unwrap();
        store.tenants().create(&admin, &acme).await.unwrap();

        let clash = Tenant::new("Other", "ACME").unwrap();
        let err = store.tenants().create(&admin, &clash).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { .. }));
    }

    #[tokio::test]
    async fn redeem_is_single_use() {
        let store = MemoryStore::new();
        let tid = Uuid::now_v7();
        let ctx = RequestContext::for_tenant(tid);
        let session = RefreshSession::new(tid, Uuid::now_v7(), "hash1", 3600);
        store.refresh_sessions().create(&ctx, &session).await.unwrap();

        let first = store.refresh_sessions().redeem(&ctx, "hash1").await.unwrap();
        assert!(matches!(first, RedeemOutcome::Redeemed(_)));

        let second = store.refresh_sessions().redeem(&ctx, "hash1").await.unwrap();
        assert!(matches!(second, RedeemOutcome::AlreadyConsumed(_)));

        let unknown = store.refresh_sessions().redeem(&ctx, "nope").await.unwrap();
        assert!(matches!(unknown, RedeemOutcome::Unknown));
    }

    #[tokio::test]
    async fn redeem_is_tenant_scoped() {
        let store = MemoryStore::new();
        let tid = Uuid::now_v7();
        let ctx = RequestContext::for_tenant(tid);
        let other = RequestContext::for_tenant(Uuid::now_v7());
        let session = RefreshSession::new(tid, Uuid::now_v7(), "hash1", 3600);
        store.refresh_sessions().create(&ctx, &session).await.unwrap();

        // Another tenant presenting the same hash sees nothing.
        let outcome = store.refresh_sessions().redeem(&other, "hash1").await.unwrap();
        assert!(matches!(outcome, RedeemOutcome::Unknown));
    }

    #[tokio::test]
    async fn revoke_all_spares_other_principals() {
        let store = MemoryStore::new();
        let tid = Uuid::now_v7();
        let ctx = RequestContext::for_tenant(tid);
        let alice = Uuid::now_v7();
        let bob = Uuid::now_v7();

        for (pid, hash) in [(alice, "a1"), (alice, "a2"), (bob, "b1")] {
            let s = RefreshSession::new(tid, pid, hash, 3600);
            store.refresh_sessions().create(&ctx, &s).await.unwrap();
        }

        let revoked = store
            .refresh_sessions()
            .revoke_all_for_principal(&ctx, alice)
            .await
            .unwrap();
        assert_eq!(revoked, 2);
        assert_eq!(
            store
                .refresh_sessions()
                .live_count_for_principal(&ctx, bob)
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn audit_reads_are_tenant_scoped() {
        let store = MemoryStore::new();
        let ctx_a = RequestContext::for_tenant(Uuid::now_v7());
        let ctx_b = RequestContext::for_tenant(Uuid::now_v7());

        store.products().insert(&ctx_a, &widget("A")).await.unwrap();
        store.products().insert(&ctx_b, &widget("B")).await.unwrap();

        let a_entries = store.audit().list(&ctx_a).await.unwrap();
        assert_eq!(a_entries.len(), 1);
        assert_eq!(a_entries[0].tenant_id, ctx_a.tenant_id());
    }
}
