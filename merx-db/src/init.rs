//! Platform data seeding.
//!
//! Creates the platform tenant and the first superadmin so the admin API
//! is reachable on a fresh database. Superadmins are ordinary principals
//! belonging to the platform tenant; only their role grants the
//! cross-tenant bypass.

use merx_auth::password::hash_password;
use merx_domain::{Password, Role};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use super::Result;

/// Subdomain reserved for the platform tenant.
pub const PLATFORM_SUBDOMAIN: &str = "platform";

/// Initialize the platform tenant and superadmin.
///
/// Idempotent: uses INSERT ... ON CONFLICT DO NOTHING and looks up
/// existing rows first. Returns the platform tenant's ID.
pub async fn init_platform_data(
    pool: &PgPool,
    superadmin_email: &str,
    superadmin_password: &Password,
    pepper: Option<&str>,
) -> Result<Uuid> {
    let mut tx = pool.begin().await?;

    let existing: Option<Uuid> = sqlx::query_scalar(
        "SELECT id FROM tenants WHERE lower(subdomain) = $1",
    )
    .bind(PLATFORM_SUBDOMAIN)
    .fetch_optional(&mut *tx)
    .await?;

    let tenant_id = match existing {
        Some(id) => id,
        None => {
            let id = Uuid::now_v7();
            info!("Creating platform tenant: id={}", id);
            sqlx::query(
                r#"
                INSERT INTO tenants
                    (id, name, subdomain, custom_domain, status, settings,
                     created_at, updated_at)
                VALUES ($1, 'Platform', $2, NULL, 'active', '{}'::jsonb, NOW(), NOW())
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(id)
            .bind(PLATFORM_SUBDOMAIN)
            .execute(&mut *tx)
            .await?;
            id
        }
    };

    // Seeding runs under the bypass marker: principals is a tenant-scoped
    // table and no request context exists yet.
    sqlx::query("SELECT set_config($1, $2, true)")
        .bind(merx_policy::BYPASS_PARAM)
        .bind(merx_policy::BYPASS_ON)
        .execute(&mut *tx)
        .await?;

    let has_admin: Option<Uuid> = sqlx::query_scalar(
        "SELECT id FROM principals WHERE tenant_id = $1 AND lower(email) = lower($2)",
    )
    .bind(tenant_id)
    .bind(superadmin_email)
    .fetch_optional(&mut *tx)
    .await?;

    if has_admin.is_none() {
        let phc = hash_password(superadmin_password, pepper)
            .map_err(|e| anyhow::anyhow!("password hashing failed: {e}"))?;
        let admin_id = Uuid::now_v7();
        info!("Creating platform superadmin: id={}", admin_id);
        sqlx::query(
            r#"
            INSERT INTO principals
                (id, tenant_id, email, role, password_hash, created_at, updated_at)
            VALUES ($1, $2, lower($3), $4, $5, NOW(), NOW())
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(admin_id)
        .bind(tenant_id)
        .bind(superadmin_email)
        .bind(Role::PlatformSuperadmin.as_str())
        .bind(phc)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(tenant_id)
}
