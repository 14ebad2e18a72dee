//! PostgreSQL gateway implementation.
//!
//! Uses dynamic queries (sqlx::query) instead of compile-time checked
//! macros (sqlx::query!) to allow compilation without DATABASE_URL.
//!
//! Every tenant-scoped operation runs inside its own transaction. The
//! first statement sets the transaction-local tenant parameter with
//! `set_config(..., true)`, which PostgreSQL discards automatically at
//! commit or rollback, so nothing can remain on the pooled connection.
//! Row-level security policies (see `merx-policy` and `migrations/`)
//! enforce the same predicate server-side as a second fence under the
//! application-level filtering.
//!
//! Reads are retried per [`RetryPolicy`] on the transient error class.
//! Writes are never retried.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use merx_domain::{
    AuditEntry, CrossTenantContext, IsolationError, NewProduct, Principal, PrincipalId, Product,
    ProductId, RefreshSession, RequestContext, Role, Tenant, TenantId, TenantStatus,
};
use merx_policy::{PolicyRegistry, BYPASS_ON, BYPASS_PARAM, TENANT_PARAM};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::audit::Audited;
use crate::error::StoreError;
use crate::repository::{
    AuditSink, PrincipalRepository, ProductRepository, RedeemOutcome, RefreshSessionRepository,
    Store, TenantRepository,
};
use crate::retry::{is_transient, RetryPolicy};

// =============================================================================
// Core: transaction scoping and retry
// =============================================================================

struct PgCore {
    pool: Arc<PgPool>,
    registry: PolicyRegistry,
    retry: RetryPolicy,
}

impl PgCore {
    /// Open a transaction scoped to the context's tenant.
    ///
    /// `set_config` with `is_local = true` binds the parameter to this
    /// transaction only; it is released when the transaction ends, whether
    /// by commit or rollback.
    async fn begin_scoped(
        &self,
        ctx: &RequestContext,
        table: &'static str,
    ) -> Result<Transaction<'static, Postgres>, StoreError> {
        self.registry.require(table)?;
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT set_config($1, $2, true)")
            .bind(TENANT_PARAM)
            .bind(ctx.tenant_id().to_string())
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }

    /// Open a transaction carrying the superadmin bypass marker.
    async fn begin_bypass(
        &self,
        table: &'static str,
    ) -> Result<Transaction<'static, Postgres>, StoreError> {
        self.registry.require(table)?;
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT set_config($1, $2, true)")
            .bind(BYPASS_PARAM)
            .bind(BYPASS_ON)
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }

    /// Retry a read on the transient error class. Each attempt runs in its
    /// own transaction via the closure.
    async fn retrying<T, F, Fut>(&self, op: F) -> Result<T, StoreError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt = 1u32;
        loop {
            match op().await {
                Err(e) if is_transient(&e) && attempt < self.retry.max_attempts => {
                    tracing::warn!(attempt, error = %e, "transient read failure, retrying");
                    tokio::time::sleep(self.retry.backoff).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

// =============================================================================
// Store facade
// =============================================================================

/// PostgreSQL gateway.
pub struct PgStore {
    tenants: PgTenants,
    principals: PgPrincipals,
    sessions: PgSessions,
    products: Audited<PgProducts, PgAudit>,
    audit: PgAudit,
}

impl PgStore {
    /// Build a gateway over an existing pool with the built-in policy
    /// registry and default retry policy.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self::with_config(pool, PolicyRegistry::builtin(), RetryPolicy::default())
    }

    /// Build a gateway with explicit registry and retry configuration.
    pub fn with_config(pool: Arc<PgPool>, registry: PolicyRegistry, retry: RetryPolicy) -> Self {
        let core = Arc::new(PgCore {
            pool,
            registry,
            retry,
        });
        Self {
            tenants: PgTenants(core.clone()),
            principals: PgPrincipals(core.clone()),
            sessions: PgSessions(core.clone()),
            products: Audited::new(PgProducts(core.clone()), PgAudit(core.clone())),
            audit: PgAudit(core),
        }
    }
}

impl Store for PgStore {
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
// Row parsing
// =============================================================================

fn parse_tenant(row: &PgRow) -> Result<Tenant, StoreError> {
    let status_str: String = row.try_get("status").map_err(StoreError::from)?;
    let status = TenantStatus::parse(&status_str)
        .ok_or_else(|| StoreError::Serialization(format!("unknown tenant status '{status_str}'")))?;
    Ok(Tenant {
        id: row.try_get("id").map_err(StoreError::from)?,
        name: row.try_get("name").map_err(StoreError::from)?,
        subdomain: row.try_get("subdomain").map_err(StoreError::from)?,
        custom_domain: row.try_get("custom_domain").map_err(StoreError::from)?,
        status,
        settings: row.try_get("settings").map_err(StoreError::from)?,
        created_at: row.try_get("created_at").map_err(StoreError::from)?,
        updated_at: row.try_get("updated_at").map_err(StoreError::from)?,
        deleted_at: row.try_get("deleted_at").map_err(StoreError::from)?,
    })
}

fn parse_principal(row: &PgRow) -> Result<Principal, StoreError> {
    let role_str: String = row.try_get("role").map_err(StoreError::from)?;
    let role = Role::parse(&role_str)
        .ok_or_else(|| StoreError::Serialization(format!("unknown role '{role_str}'")))?;
    Ok(Principal {
        id: row.try_get("id").map_err(StoreError::from)?,
        tenant_id: row.try_get("tenant_id").map_err(StoreError::from)?,
        email: row.try_get("email").map_err(StoreError::from)?,
        role,
        password_hash: row.try_get("password_hash").map_err(StoreError::from)?,
        created_at: row.try_get("created_at").map_err(StoreError::from)?,
        updated_at: row.try_get("updated_at").map_err(StoreError::from)?,
        deleted_at: row.try_get("deleted_at").map_err(StoreError::from)?,
    })
}

fn parse_session(row: &PgRow) -> Result<RefreshSession, StoreError> {
    Ok(RefreshSession {
        id: row.try_get("id").map_err(StoreError::from)?,
        tenant_id: row.try_get("tenant_id").map_err(StoreError::from)?,
        principal_id: row.try_get("principal_id").map_err(StoreError::from)?,
        family_id: row.try_get("family_id").map_err(StoreError::from)?,
        token_hash: row.try_get("token_hash").map_err(StoreError::from)?,
        expires_at: row.try_get("expires_at").map_err(StoreError::from)?,
        created_at: row.try_get("created_at").map_err(StoreError::from)?,
        consumed_at: row.try_get("consumed_at").map_err(StoreError::from)?,
        revoked_at: row.try_get("revoked_at").map_err(StoreError::from)?,
    })
}

fn parse_product(row: &PgRow) -> Result<Product, StoreError> {
    Ok(Product {
        id: row.try_get("id").map_err(StoreError::from)?,
        tenant_id: row.try_get("tenant_id").map_err(StoreError::from)?,
        name: row.try_get("name").map_err(StoreError::from)?,
        price: row.try_get::<Decimal, _>("price").map_err(StoreError::from)?,
        created_at: row.try_get("created_at").map_err(StoreError::from)?,
        updated_at: row.try_get("updated_at").map_err(StoreError::from)?,
        deleted_at: row.try_get("deleted_at").map_err(StoreError::from)?,
    })
}

fn parse_audit_entry(row: &PgRow) -> Result<AuditEntry, StoreError> {
    let action_str: String = row.try_get("action").map_err(StoreError::from)?;
    let action = serde_json::from_value(serde_json::Value::String(action_str))
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(AuditEntry {
        id: row.try_get("id").map_err(StoreError::from)?,
        tenant_id: row.try_get("tenant_id").map_err(StoreError::from)?,
        principal_id: row.try_get("principal_id").map_err(StoreError::from)?,
        action,
        entity_type: row.try_get("entity_type").map_err(StoreError::from)?,
        entity_id: row.try_get("entity_id").map_err(StoreError::from)?,
        before: row.try_get("before").map_err(StoreError::from)?,
        after: row.try_get("after").map_err(StoreError::from)?,
        occurred_at: row.try_get("occurred_at").map_err(StoreError::from)?,
    })
}

// =============================================================================
// Tenants (platform-level table, no RLS)
// =============================================================================

struct PgTenants(Arc<PgCore>);

const TENANT_COLUMNS: &str =
    "id, name, subdomain, custom_domain, status, settings, created_at, updated_at, deleted_at";

impl PgTenants {
    async fn fetch_optional(&self, sql: String, bind: String) -> Result<Option<Tenant>, StoreError> {
        let row = sqlx::query(&sql)
            .bind(bind)
            .fetch_optional(&*self.0.pool)
            .await?;
        row.as_ref().map(parse_tenant).transpose()
    }
}

#[async_trait]
impl TenantRepository for PgTenants {
    async fn create(&self, _admin: &CrossTenantContext, tenant: &Tenant) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO tenants
                (id, name, subdomain, custom_domain, status, settings,
                 created_at, updated_at, deleted_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(tenant.id)
        .bind(&tenant.name)
        .bind(&tenant.subdomain)
        .bind(&tenant.custom_domain)
        .bind(tenant.status.as_str())
        .bind(&tenant.settings)
        .bind(tenant.created_at)
        .bind(tenant.updated_at)
        .bind(tenant.deleted_at)
        .execute(&*self.0.pool)
        .await
        .map_err(|e| match StoreError::from(e) {
            StoreError::Duplicate { .. } => StoreError::duplicate("tenant", &tenant.subdomain),
            other => other,
        })?;
        Ok(())
    }

    async fn get(&self, id: TenantId) -> Result<Option<Tenant>, StoreError> {
        self.0
            .retrying(|| async {
                let row = sqlx::query(&format!(
                    "SELECT {TENANT_COLUMNS} FROM tenants WHERE id = $1"
                ))
                .bind(id)
                .fetch_optional(&*self.0.pool)
                .await?;
                row.as_ref().map(parse_tenant).transpose()
            })
            .await
    }

    async fn find_by_subdomain(&self, subdomain: &str) -> Result<Option<Tenant>, StoreError> {
        self.0
            .retrying(|| {
                self.fetch_optional(
                    format!(
                        "SELECT {TENANT_COLUMNS} FROM tenants WHERE lower(subdomain) = lower($1)"
                    ),
                    subdomain.to_string(),
                )
            })
            .await
    }

    async fn find_by_custom_domain(&self, domain: &str) -> Result<Option<Tenant>, StoreError> {
        self.0
            .retrying(|| {
                self.fetch_optional(
                    format!(
                        "SELECT {TENANT_COLUMNS} FROM tenants WHERE lower(custom_domain) = lower($1)"
                    ),
                    domain.to_string(),
                )
            })
            .await
    }

    async fn list(&self, _admin: &CrossTenantContext) -> Result<Vec<Tenant>, StoreError> {
        self.0
            .retrying(|| async {
                let rows = sqlx::query(&format!(
                    "SELECT {TENANT_COLUMNS} FROM tenants ORDER BY created_at"
                ))
                .fetch_all(&*self.0.pool)
                .await?;
                rows.iter().map(parse_tenant).collect()
            })
            .await
    }

    async fn update_status(
        &self,
        _admin: &CrossTenantContext,
        id: TenantId,
        status: TenantStatus,
    ) -> Result<Tenant, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE tenants
            SET status = $2,
                updated_at = now(),
                deleted_at = CASE WHEN $2 = 'soft_deleted' THEN now() ELSE deleted_at END
            WHERE id = $1
            RETURNING {TENANT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(status.as_str())
        .fetch_optional(&*self.0.pool)
        .await?
        .ok_or_else(|| StoreError::not_found("tenant", id.to_string()))?;
        parse_tenant(&row)
    }

    async fn update_domains(
        &self,
        _admin: &CrossTenantContext,
        id: TenantId,
        subdomain: &str,
        custom_domain: Option<&str>,
    ) -> Result<Tenant, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE tenants
            SET subdomain = lower($2), custom_domain = lower($3), updated_at = now()
            WHERE id = $1
            RETURNING {TENANT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(subdomain)
        .bind(custom_domain)
        .fetch_optional(&*self.0.pool)
        .await
        .map_err(|e| match StoreError::from(e) {
            StoreError::Duplicate { .. } => StoreError::duplicate("tenant", subdomain),
            other => other,
        })?
        .ok_or_else(|| StoreError::not_found("tenant", id.to_string()))?;
        parse_tenant(&row)
    }
}

// =============================================================================
// Principals
// =============================================================================

struct PgPrincipals(Arc<PgCore>);

const PRINCIPAL_COLUMNS: &str =
    "id, tenant_id, email, role, password_hash, created_at, updated_at, deleted_at";

#[async_trait]
impl PrincipalRepository for PgPrincipals {
    async fn create(
        &self,
        ctx: &RequestContext,
        principal: &Principal,
    ) -> Result<(), StoreError> {
        if principal.tenant_id != ctx.tenant_id() {
            return Err(IsolationError::TenantMismatch.into());
        }
        let mut tx = self.0.begin_scoped(ctx, "principals").await?;
        sqlx::query(
            r#"
            INSERT INTO principals
                (id, tenant_id, email, role, password_hash,
                 created_at, updated_at, deleted_at)
            VALUES ($1, current_setting('merx.tenant_id')::uuid, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(principal.id)
        .bind(&principal.email)
        .bind(principal.role.as_str())
        .bind(&principal.password_hash)
        .bind(principal.created_at)
        .bind(principal.updated_at)
        .bind(principal.deleted_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| match StoreError::from(e) {
            StoreError::Duplicate { .. } => StoreError::duplicate("principal", &principal.email),
            other => other,
        })?;
        tx.commit().await?;
        Ok(())
    }

    async fn get(
        &self,
        ctx: &RequestContext,
        id: PrincipalId,
    ) -> Result<Option<Principal>, StoreError> {
        self.0
            .retrying(|| async {
                let mut tx = self.0.begin_scoped(ctx, "principals").await?;
                let row = sqlx::query(&format!(
                    "SELECT {PRINCIPAL_COLUMNS} FROM principals WHERE id = $1"
                ))
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
                tx.commit().await?;
                row.as_ref().map(parse_principal).transpose()
            })
            .await
    }

    async fn find_by_email(
        &self,
        ctx: &RequestContext,
        email: &str,
    ) -> Result<Option<Principal>, StoreError> {
        self.0
            .retrying(|| async {
                let mut tx = self.0.begin_scoped(ctx, "principals").await?;
                let row = sqlx::query(&format!(
                    r#"
                    SELECT {PRINCIPAL_COLUMNS} FROM principals
                    WHERE lower(email) = lower($1) AND deleted_at IS NULL
                    "#
                ))
                .bind(email)
                .fetch_optional(&mut *tx)
                .await?;
                tx.commit().await?;
                row.as_ref().map(parse_principal).transpose()
            })
            .await
    }
}

// =============================================================================
// Refresh sessions
// =============================================================================

struct PgSessions(Arc<PgCore>);

const SESSION_COLUMNS: &str =
    "id, tenant_id, principal_id, family_id, token_hash, expires_at, created_at, consumed_at, revoked_at";

#[async_trait]
impl RefreshSessionRepository for PgSessions {
    async fn create(
        &self,
        ctx: &RequestContext,
        session: &RefreshSession,
    ) -> Result<(), StoreError> {
        if session.tenant_id != ctx.tenant_id() {
            return Err(IsolationError::TenantMismatch.into());
        }
        let mut tx = self.0.begin_scoped(ctx, "refresh_sessions").await?;
        sqlx::query(
            r#"
            INSERT INTO refresh_sessions
                (id, tenant_id, principal_id, family_id, token_hash,
                 expires_at, created_at, consumed_at, revoked_at)
            VALUES ($1, current_setting('merx.tenant_id')::uuid, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(session.id)
        .bind(session.principal_id)
        .bind(session.family_id)
        .bind(&session.token_hash)
        .bind(session.expires_at)
        .bind(session.created_at)
        .bind(session.consumed_at)
        .bind(session.revoked_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn redeem(
        &self,
        ctx: &RequestContext,
        token_hash: &str,
    ) -> Result<RedeemOutcome, StoreError> {
        let mut tx = self.0.begin_scoped(ctx, "refresh_sessions").await?;
        // Single-statement compare-and-set: of two concurrent redemptions
        // only one matches the `consumed_at IS NULL` predicate.
        let consumed = sqlx::query(&format!(
            r#"
            UPDATE refresh_sessions
            SET consumed_at = now()
            WHERE token_hash = $1 AND consumed_at IS NULL AND revoked_at IS NULL
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(token_hash)
        .fetch_optional(&mut *tx)
        .await?;

        let outcome = match consumed {
            Some(row) => RedeemOutcome::Redeemed(parse_session(&row)?),
            None => {
                let existing = sqlx::query(&format!(
                    "SELECT {SESSION_COLUMNS} FROM refresh_sessions WHERE token_hash = $1"
                ))
                .bind(token_hash)
                .fetch_optional(&mut *tx)
                .await?;
                match existing {
                    // Revoked tokens are simply dead; only consumed ones
                    // are the reuse signal.
                    Some(row) => {
                        let session = parse_session(&row)?;
                        if session.consumed_at.is_some() {
                            RedeemOutcome::AlreadyConsumed(session)
                        } else {
                            RedeemOutcome::Unknown
                        }
                    }
                    None => RedeemOutcome::Unknown,
                }
            }
        };
        tx.commit().await?;
        Ok(outcome)
    }

    async fn revoke(&self, ctx: &RequestContext, token_hash: &str) -> Result<(), StoreError> {
        let mut tx = self.0.begin_scoped(ctx, "refresh_sessions").await?;
        sqlx::query(
            "UPDATE refresh_sessions SET revoked_at = now() \
             WHERE token_hash = $1 AND revoked_at IS NULL",
        )
        .bind(token_hash)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn revoke_all_for_principal(
        &self,
        ctx: &RequestContext,
        principal_id: PrincipalId,
    ) -> Result<u64, StoreError> {
        let mut tx = self.0.begin_scoped(ctx, "refresh_sessions").await?;
        let result = sqlx::query(
            r#"
            UPDATE refresh_sessions
            SET revoked_at = now()
            WHERE principal_id = $1 AND revoked_at IS NULL AND consumed_at IS NULL
            "#,
        )
        .bind(principal_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(result.rows_affected())
    }

    async fn live_count_for_principal(
        &self,
        ctx: &RequestContext,
        principal_id: PrincipalId,
    ) -> Result<u64, StoreError> {
        self.0
            .retrying(|| async {
                let mut tx = self.0.begin_scoped(ctx, "refresh_sessions").await?;
                let row = sqlx::query(
                    r#"
                    SELECT count(*) AS n FROM refresh_sessions
                    WHERE principal_id = $1
                      AND consumed_at IS NULL AND revoked_at IS NULL
                      AND expires_at > now()
                    "#,
                )
                .bind(principal_id)
                .fetch_one(&mut *tx)
                .await?;
                tx.commit().await?;
                Ok(row.try_get::<i64, _>("n").map_err(StoreError::from)? as u64)
            })
            .await
    }
}

// =============================================================================
// Products
// =============================================================================

struct PgProducts(Arc<PgCore>);

const PRODUCT_COLUMNS: &str =
    "id, tenant_id, name, price, created_at, updated_at, deleted_at";

#[async_trait]
impl ProductRepository for PgProducts {
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
        let mut tx = self.0.begin_scoped(ctx, "products").await?;
        // tenant_id is stamped from the transaction-local setting, never
        // from the payload.
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO products (id, tenant_id, name, price, created_at, updated_at)
            VALUES ($1, current_setting('merx.tenant_id')::uuid, $2, $3, now(), now())
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(Uuid::now_v7())
        .bind(&new.name)
        .bind(new.price)
        .fetch_one(&mut *tx)
        .await?;
        let product = parse_product(&row)?;
        tx.commit().await?;
        Ok(product)
    }

    async fn list(&self, ctx: &RequestContext) -> Result<Vec<Product>, StoreError> {
        self.0
            .retrying(|| async {
                let mut tx = self.0.begin_scoped(ctx, "products").await?;
                let rows = sqlx::query(&format!(
                    r#"
                    SELECT {PRODUCT_COLUMNS} FROM products
                    WHERE deleted_at IS NULL
                    ORDER BY created_at
                    "#
                ))
                .fetch_all(&mut *tx)
                .await?;
                tx.commit().await?;
                rows.iter().map(parse_product).collect()
            })
            .await
    }

    async fn get(
        &self,
        ctx: &RequestContext,
        id: ProductId,
    ) -> Result<Option<Product>, StoreError> {
        self.0
            .retrying(|| async {
                let mut tx = self.0.begin_scoped(ctx, "products").await?;
                let row = sqlx::query(&format!(
                    "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 AND deleted_at IS NULL"
                ))
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
                tx.commit().await?;
                row.as_ref().map(parse_product).transpose()
            })
            .await
    }

    async fn soft_delete(
        &self,
        ctx: &RequestContext,
        id: ProductId,
    ) -> Result<Product, StoreError> {
        let mut tx = self.0.begin_scoped(ctx, "products").await?;
        let row = sqlx::query(&format!(
            r#"
            UPDATE products
            SET deleted_at = now(), updated_at = now()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::not_found("product", id.to_string()))?;
        let product = parse_product(&row)?;
        tx.commit().await?;
        Ok(product)
    }

    async fn list_all(&self, _admin: &CrossTenantContext) -> Result<Vec<Product>, StoreError> {
        self.0
            .retrying(|| async {
                let mut tx = self.0.begin_bypass("products").await?;
                let rows = sqlx::query(&format!(
                    r#"
                    SELECT {PRODUCT_COLUMNS} FROM products
                    WHERE deleted_at IS NULL
                    ORDER BY created_at
                    "#
                ))
                .fetch_all(&mut *tx)
                .await?;
                tx.commit().await?;
                rows.iter().map(parse_product).collect()
            })
            .await
    }
}

// =============================================================================
// Audit
// =============================================================================

struct PgAudit(Arc<PgCore>);

const AUDIT_COLUMNS: &str =
    "id, tenant_id, principal_id, action, entity_type, entity_id, before, after, occurred_at";

#[async_trait]
impl AuditSink for PgAudit {
    async fn append(&self, ctx: &RequestContext, entry: &AuditEntry) -> Result<(), StoreError> {
        if entry.tenant_id != ctx.tenant_id() {
            return Err(IsolationError::TenantMismatch.into());
        }
        let mut tx = self.0.begin_scoped(ctx, "audit_log").await?;
        sqlx::query(
            r#"
            INSERT INTO audit_log
                (id, tenant_id, principal_id, action, entity_type, entity_id,
                 before, after, occurred_at)
            VALUES ($1, current_setting('merx.tenant_id')::uuid, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(entry.id)
        .bind(entry.principal_id)
        .bind(entry.action.as_str())
        .bind(&entry.entity_type)
        .bind(&entry.entity_id)
        .bind(&entry.before)
        .bind(&entry.after)
        .bind(entry.occurred_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn append_as_admin(
        &self,
        _admin: &CrossTenantContext,
        entry: &AuditEntry,
    ) -> Result<(), StoreError> {
        // No tenant setting under the bypass marker; the entry's own
        // tenant is bound directly.
        let mut tx = self.0.begin_bypass("audit_log").await?;
        sqlx::query(
            r#"
            INSERT INTO audit_log
                (id, tenant_id, principal_id, action, entity_type, entity_id,
                 before, after, occurred_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(entry.id)
        .bind(entry.tenant_id)
        .bind(entry.principal_id)
        .bind(entry.action.as_str())
        .bind(&entry.entity_type)
        .bind(&entry.entity_id)
        .bind(&entry.before)
        .bind(&entry.after)
        .bind(entry.occurred_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn list(&self, ctx: &RequestContext) -> Result<Vec<AuditEntry>, StoreError> {
        self.0
            .retrying(|| async {
                let mut tx = self.0.begin_scoped(ctx, "audit_log").await?;
                let rows = sqlx::query(&format!(
                    "SELECT {AUDIT_COLUMNS} FROM audit_log ORDER BY occurred_at"
                ))
                .fetch_all(&mut *tx)
                .await?;
                tx.commit().await?;
                rows.iter().map(parse_audit_entry).collect()
            })
            .await
    }
}
