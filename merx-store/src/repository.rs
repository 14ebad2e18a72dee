//! Repository trait definitions (ports).
//!
//! These traits are the Scoped Data Gateway's surface. Exactly two call
//! shapes exist:
//!
//! - **Scoped**: methods taking `&RequestContext`. Reads and writes are
//!   confined to the context's tenant. Inserts stamp `tenant_id` from the
//!   context; a conflicting caller-supplied value fails `TenantMismatch`
//!   before any statement.
//! - **Administrative cross-tenant**: methods taking
//!   `&CrossTenantContext`. These span tenants and are obtainable only
//!   with platform-superadmin proof.
//!
//! No third shape is permitted, and no other code path may touch
//! tenant-scoped tables.

use async_trait::async_trait;
use merx_domain::{
    AuditEntry, CrossTenantContext, NewProduct, Principal, PrincipalId, Product, ProductId,
    RefreshSession, RequestContext, Tenant, TenantId, TenantStatus,
};

use crate::error::StoreError;

/// Outcome of an atomic refresh-token redemption.
#[derive(Debug, Clone)]
pub enum RedeemOutcome {
    /// The session was live and is now consumed; rotation may proceed.
    Redeemed(RefreshSession),
    /// The hash matched a session that was already consumed, which is
    /// the reuse-detection signal. Revoked-but-unconsumed sessions
    /// report `Unknown` instead.
    AlreadyConsumed(RefreshSession),
    /// No session matches the hash.
    Unknown,
}

/// Platform-level repository for tenants.
///
/// The `tenants` table is not itself tenant-scoped; reads serve the
/// resolver's lookup path, while every mutation requires cross-tenant
/// proof.
#[async_trait]
pub trait TenantRepository: Send + Sync {
    /// Create a tenant. Fails `Duplicate` when an address is taken
    /// (case-insensitive).
    async fn create(&self, admin: &CrossTenantContext, tenant: &Tenant) -> Result<(), StoreError>;

    /// Fetch by ID.
    async fn get(&self, id: TenantId) -> Result<Option<Tenant>, StoreError>;

    /// Exact subdomain match (input lowercased by the caller).
    async fn find_by_subdomain(&self, subdomain: &str) -> Result<Option<Tenant>, StoreError>;

    /// Exact custom-domain match (input lowercased by the caller).
    async fn find_by_custom_domain(&self, domain: &str) -> Result<Option<Tenant>, StoreError>;

    /// List all tenants.
    async fn list(&self, admin: &CrossTenantContext) -> Result<Vec<Tenant>, StoreError>;

    /// Persist a status transition.
    async fn update_status(
        &self,
        admin: &CrossTenantContext,
        id: TenantId,
        status: TenantStatus,
    ) -> Result<Tenant, StoreError>;

    /// Persist an address change. Fails `Duplicate` when an address is
    /// taken by another tenant.
    async fn update_domains(
        &self,
        admin: &CrossTenantContext,
        id: TenantId,
        subdomain: &str,
        custom_domain: Option<&str>,
    ) -> Result<Tenant, StoreError>;
}

/// Tenant-scoped repository for principals.
#[async_trait]
pub trait PrincipalRepository: Send + Sync {
    /// Create a principal within the context's tenant.
    ///
    /// Fails `TenantMismatch` if `principal.tenant_id` differs from the
    /// context, before any statement executes.
    async fn create(&self, ctx: &RequestContext, principal: &Principal)
        -> Result<(), StoreError>;

    /// Fetch by ID within the context's tenant.
    async fn get(&self, ctx: &RequestContext, id: PrincipalId)
        -> Result<Option<Principal>, StoreError>;

    /// Look up a live principal by email within the context's tenant.
    async fn find_by_email(
        &self,
        ctx: &RequestContext,
        email: &str,
    ) -> Result<Option<Principal>, StoreError>;
}

/// Tenant-scoped repository for refresh sessions.
#[async_trait]
pub trait RefreshSessionRepository: Send + Sync {
    /// Persist a new session.
    ///
    /// Fails `TenantMismatch` if `session.tenant_id` differs from the
    /// context.
    async fn create(&self, ctx: &RequestContext, session: &RefreshSession)
        -> Result<(), StoreError>;

    /// Atomically redeem the session matching `token_hash`.
    ///
    /// The consume is a single compare-and-set: of two concurrent calls
    /// presenting the same token, exactly one observes
    /// [`RedeemOutcome::Redeemed`].
    async fn redeem(&self, ctx: &RequestContext, token_hash: &str)
        -> Result<RedeemOutcome, StoreError>;

    /// Mark the session matching `token_hash` revoked (logout).
    /// Idempotent; unknown hashes are ignored.
    async fn revoke(&self, ctx: &RequestContext, token_hash: &str) -> Result<(), StoreError>;

    /// Revoke every live session for a principal. Returns the count.
    async fn revoke_all_for_principal(
        &self,
        ctx: &RequestContext,
        principal_id: PrincipalId,
    ) -> Result<u64, StoreError>;

    /// Count live sessions for a principal.
    async fn live_count_for_principal(
        &self,
        ctx: &RequestContext,
        principal_id: PrincipalId,
    ) -> Result<u64, StoreError>;
}

/// Tenant-scoped repository for products.
#[async_trait]
pub trait ProductRepository: Send + Sync {
    /// Insert a product, stamping `tenant_id` from the context.
    ///
    /// Fails `TenantMismatch` if the payload carries a conflicting
    /// tenant, before any statement executes.
    async fn insert(&self, ctx: &RequestContext, new: &NewProduct)
        -> Result<Product, StoreError>;

    /// List live products of the context's tenant.
    async fn list(&self, ctx: &RequestContext) -> Result<Vec<Product>, StoreError>;

    /// Fetch a live product by ID within the context's tenant.
    async fn get(&self, ctx: &RequestContext, id: ProductId)
        -> Result<Option<Product>, StoreError>;

    /// Soft-delete a product within the context's tenant.
    async fn soft_delete(&self, ctx: &RequestContext, id: ProductId)
        -> Result<Product, StoreError>;

    /// Administrative: list live products across all tenants.
    async fn list_all(&self, admin: &CrossTenantContext) -> Result<Vec<Product>, StoreError>;
}

/// Append-only sink for audit entries.
///
/// Appends follow the same two call shapes as the data repositories:
/// tenant-scoped writes carry the caller's context, administrative writes
/// carry cross-tenant proof. There is no update or delete.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Persist one entry for the context's tenant.
    ///
    /// Fails `TenantMismatch` if the entry names another tenant, before
    /// any statement executes.
    async fn append(&self, ctx: &RequestContext, entry: &AuditEntry) -> Result<(), StoreError>;

    /// Administrative: persist one entry for any tenant.
    async fn append_as_admin(
        &self,
        admin: &CrossTenantContext,
        entry: &AuditEntry,
    ) -> Result<(), StoreError>;

    /// List entries for the context's tenant, oldest first.
    async fn list(&self, ctx: &RequestContext) -> Result<Vec<AuditEntry>, StoreError>;
}

/// Combined gateway interface handed to the daemon and services.
pub trait Store: Send + Sync + 'static {
    /// Tenant repository.
    fn tenants(&self) -> &dyn TenantRepository;
    /// Principal repository.
    fn principals(&self) -> &dyn PrincipalRepository;
    /// Refresh-session repository.
    fn refresh_sessions(&self) -> &dyn RefreshSessionRepository;
    /// Product repository (write path audit-decorated).
    fn products(&self) -> &dyn ProductRepository;
    /// Audit sink.
    fn audit(&self) -> &dyn AuditSink;
}
