//! Merx Daemon
//!
//! Multi-tenant isolation and session-trust layer.
//!
//! # Usage
//!
//! ```bash
//! # Start against the in-memory store (development)
//! MERX_JWT_SECRET=$(openssl rand -hex 32) cargo run -p merxd
//!
//! # Start against PostgreSQL
//! DATABASE_URL=postgres://... cargo run -p merxd --features postgres
//! ```
//!
//! # Environment Variables
//!
//! - `MERX_API_HOST` / `MERX_API_PORT`: bind address (default 0.0.0.0:8080)
//! - `MERX_BASE_DOMAIN`: platform base domain (default merx.test)
//! - `MERX_TENANT_CACHE_TTL_SECS`: resolver cache TTL (default 30, max 60)
//! - `MERX_JWT_SECRET`: access-token signing secret (required)
//! - `MERX_TOKEN_ISSUER`: `iss` claim (default merx)
//! - `MERX_ACCESS_TTL_SECS` / `MERX_REFRESH_TTL_SECS`: token lifetimes
//! - `MERX_PASSWORD_PEPPER`: optional server-side pepper
//! - `MERX_SUPERADMIN_EMAIL` / `MERX_SUPERADMIN_PASSWORD`: seed the
//!   platform superadmin
//! - `DATABASE_URL`: PostgreSQL URL (postgres feature)

use std::sync::Arc;

use merx_domain::{Password, RequestContext, Role};
use merx_store::{MemoryStore, Store};
use merxd::{api, AppState, Config};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("merxd=info".parse()?))
        .init();

    let config = Config::from_env()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        base_domain = %config.resolver.base_domain,
        api_host = %config.api.host,
        api_port = config.api.port,
        "Merx daemon"
    );

    #[cfg(feature = "postgres")]
    if let Some(url) = config.database_url.clone() {
        return run_postgres(config, url).await;
    }

    run_memory(config).await
}

async fn run_memory(config: Config) -> anyhow::Result<()> {
    info!("No DATABASE_URL; using the in-memory store");
    let store = Arc::new(MemoryStore::new());
    let state = AppState::new(store, &config);
    seed_superadmin(&state).await?;
    serve(config, state).await
}

#[cfg(feature = "postgres")]
async fn run_postgres(config: Config, url: String) -> anyhow::Result<()> {
    use sqlx::postgres::PgPoolOptions;

    let pool = Arc::new(
        PgPoolOptions::new()
            .max_connections(10)
            .connect(&url)
            .await?,
    );

    merx_db::migrate(&pool).await?;
    // Refuse to serve unless every tenant-scoped table has its policies.
    merx_db::verify_policies(&pool).await?;

    if let (Ok(email), Ok(password)) = (
        std::env::var("MERX_SUPERADMIN_EMAIL"),
        std::env::var("MERX_SUPERADMIN_PASSWORD"),
    ) {
        merx_db::init_platform_data(
            &pool,
            &email,
            &Password::new(password),
            config.auth.pepper.as_deref(),
        )
        .await?;
    }

    let store = Arc::new(merx_store::PgStore::new(pool));
    let state = AppState::new(store, &config);
    serve(config, state).await
}

/// Seed the platform tenant and superadmin into a fresh in-memory store.
async fn seed_superadmin<S: Store>(state: &AppState<S>) -> anyhow::Result<()> {
    let (Ok(email), Ok(password)) = (
        std::env::var("MERX_SUPERADMIN_EMAIL"),
        std::env::var("MERX_SUPERADMIN_PASSWORD"),
    ) else {
        return Ok(());
    };

    let boot = RequestContext::authenticated(Uuid::now_v7(), Uuid::now_v7(), Role::PlatformSuperadmin);
    let proof = boot
        .elevate()
        .map_err(|e| anyhow::anyhow!("bootstrap elevation failed: {e}"))?;
    let platform = state.resolver.create_tenant(&proof, "Platform", "platform").await?;
    let ctx = RequestContext::for_tenant(platform.id);
    state
        .sessions
        .create_principal(&ctx, &email, Role::PlatformSuperadmin, &Password::new(password))
        .await?;
    info!(tenant_id = %platform.id, "platform superadmin seeded");
    Ok(())
}

async fn serve<S: Store>(config: Config, state: AppState<S>) -> anyhow::Result<()> {
    let app = api::router(state);
    let listener =
        tokio::net::TcpListener::bind(format!("{}:{}", config.api.host, config.api.port)).await?;
    info!(addr = %listener.local_addr()?, "API server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
