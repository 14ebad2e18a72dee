//! HTTP API for the Merx daemon.
//!
//! Tenant-scoped routes (auth, products, audit) run behind the context
//! middleware; `/admin` routes run behind the superadmin guard and use the
//! cross-tenant call shape throughout.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::middleware;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use merx_auth::TokenPair;
use merx_domain::{AuditEntry, Password, Product, Role, Tenant};
use merx_store::Store;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::middleware::{superadmin_guard, tenant_context, Scoped};
use crate::state::AppState;

// =============================================================================
// Request/Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always "ok" when the daemon answers.
    pub status: String,
    /// Daemon version.
    pub version: String,
}

/// Login request.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Login email.
    pub email: String,
    /// Cleartext password.
    pub password: String,
}

/// Refresh / logout request.
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    /// Opaque refresh token.
    pub refresh_token: String,
}

/// Request to create a product.
#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    /// Product name.
    pub name: String,
    /// Unit price.
    pub price: Decimal,
}

/// Request to provision a tenant.
#[derive(Debug, Deserialize)]
pub struct CreateTenantRequest {
    /// Display name.
    pub name: String,
    /// Subdomain under the platform base domain.
    pub subdomain: String,
}

/// Request to change a tenant's addresses.
#[derive(Debug, Deserialize)]
pub struct ChangeDomainsRequest {
    /// New subdomain.
    pub subdomain: String,
    /// New custom domain, if any.
    pub custom_domain: Option<String>,
}

// =============================================================================
// Router
// =============================================================================

/// Build the daemon router over shared state.
pub fn router<S: Store>(state: AppState<S>) -> Router {
    let tenant_routes = Router::new()
        .route("/auth/login", post(login::<S>))
        .route("/auth/refresh", post(refresh::<S>))
        .route("/auth/logout", post(logout::<S>))
        .route("/products", get(list_products::<S>).post(create_product::<S>))
        .route("/products/:id", delete(delete_product::<S>))
        .route("/audit", get(list_audit::<S>))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            tenant_context::<S>,
        ));

    let admin_routes = Router::new()
        .route(
            "/admin/tenants",
            get(list_tenants::<S>).post(create_tenant::<S>),
        )
        .route("/admin/tenants/:id", delete(soft_delete_tenant::<S>))
        .route("/admin/tenants/:id/suspend", post(suspend_tenant::<S>))
        .route("/admin/tenants/:id/activate", post(activate_tenant::<S>))
        .route("/admin/tenants/:id/domains", put(change_domains::<S>))
        .route("/admin/products", get(list_all_products::<S>))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            superadmin_guard::<S>,
        ));

    Router::new()
        .route("/health", get(health))
        .merge(tenant_routes)
        .merge(admin_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// Handlers: health and auth
// =============================================================================

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn login<S: Store>(
    State(state): State<AppState<S>>,
    Scoped(ctx): Scoped,
    Json(body): Json<LoginRequest>,
) -> ApiResult<Json<TokenPair>> {
    let pair = state
        .sessions
        .login(&ctx, &body.email, &Password::new(body.password))
        .await?;
    Ok(Json(pair))
}

async fn refresh<S: Store>(
    State(state): State<AppState<S>>,
    Scoped(ctx): Scoped,
    Json(body): Json<RefreshRequest>,
) -> ApiResult<Json<TokenPair>> {
    let pair = state.sessions.refresh(&ctx, &body.refresh_token).await?;
    Ok(Json(pair))
}

async fn logout<S: Store>(
    State(state): State<AppState<S>>,
    Scoped(ctx): Scoped,
    Json(body): Json<RefreshRequest>,
) -> ApiResult<StatusCode> {
    state.sessions.revoke(&ctx, &body.refresh_token).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Handlers: products and audit (tenant-scoped)
// =============================================================================

async fn list_products<S: Store>(
    State(state): State<AppState<S>>,
    Scoped(ctx): Scoped,
) -> ApiResult<Json<Vec<Product>>> {
    if ctx.principal().is_none() {
        return Err(ApiError::Unauthenticated);
    }
    Ok(Json(state.store.products().list(&ctx).await?))
}

async fn create_product<S: Store>(
    State(state): State<AppState<S>>,
    Scoped(ctx): Scoped,
    Json(body): Json<CreateProductRequest>,
) -> ApiResult<(StatusCode, Json<Product>)> {
    if ctx.principal().is_none() {
        return Err(ApiError::Unauthenticated);
    }
    let new = merx_domain::NewProduct {
        name: body.name,
        price: body.price,
        tenant_id: None,
    };
    let product = state.store.products().insert(&ctx, &new).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

async fn delete_product<S: Store>(
    State(state): State<AppState<S>>,
    Scoped(ctx): Scoped,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Product>> {
    if ctx.principal().is_none() {
        return Err(ApiError::Unauthenticated);
    }
    Ok(Json(state.store.products().soft_delete(&ctx, id).await?))
}

async fn list_audit<S: Store>(
    State(state): State<AppState<S>>,
    Scoped(ctx): Scoped,
) -> ApiResult<Json<Vec<AuditEntry>>> {
    // The trail is visible to tenant admins (and platform superadmins
    // scoped to this tenant), not to customers.
    match ctx.role() {
        Some(Role::TenantAdmin) | Some(Role::PlatformSuperadmin) => {}
        Some(Role::Customer) => return Err(ApiError::Forbidden),
        None => return Err(ApiError::Unauthenticated),
    }
    Ok(Json(state.store.audit().list(&ctx).await?))
}

// =============================================================================
// Handlers: tenant administration (superadmin only)
// =============================================================================

async fn list_tenants<S: Store>(
    State(state): State<AppState<S>>,
    Scoped(ctx): Scoped,
) -> ApiResult<Json<Vec<Tenant>>> {
    let proof = ctx.elevate()?;
    Ok(Json(state.store.tenants().list(&proof).await?))
}

async fn create_tenant<S: Store>(
    State(state): State<AppState<S>>,
    Scoped(ctx): Scoped,
    Json(body): Json<CreateTenantRequest>,
) -> ApiResult<(StatusCode, Json<Tenant>)> {
    let proof = ctx.elevate()?;
    let tenant = state
        .resolver
        .create_tenant(&proof, &body.name, &body.subdomain)
        .await?;
    Ok((StatusCode::CREATED, Json(tenant)))
}

async fn suspend_tenant<S: Store>(
    State(state): State<AppState<S>>,
    Scoped(ctx): Scoped,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Tenant>> {
    let proof = ctx.elevate()?;
    Ok(Json(state.resolver.suspend_tenant(&proof, id).await?))
}

async fn activate_tenant<S: Store>(
    State(state): State<AppState<S>>,
    Scoped(ctx): Scoped,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Tenant>> {
    let proof = ctx.elevate()?;
    Ok(Json(state.resolver.activate_tenant(&proof, id).await?))
}

async fn soft_delete_tenant<S: Store>(
    State(state): State<AppState<S>>,
    Scoped(ctx): Scoped,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Tenant>> {
    let proof = ctx.elevate()?;
    Ok(Json(state.resolver.soft_delete_tenant(&proof, id).await?))
}

async fn change_domains<S: Store>(
    State(state): State<AppState<S>>,
    Scoped(ctx): Scoped,
    Path(id): Path<Uuid>,
    Json(body): Json<ChangeDomainsRequest>,
) -> ApiResult<Json<Tenant>> {
    let proof = ctx.elevate()?;
    let tenant = state
        .resolver
        .change_domains(&proof, id, &body.subdomain, body.custom_domain.as_deref())
        .await?;
    Ok(Json(tenant))
}

async fn list_all_products<S: Store>(
    State(state): State<AppState<S>>,
    Scoped(ctx): Scoped,
) -> ApiResult<Json<Vec<Product>>> {
    let proof = ctx.elevate()?;
    Ok(Json(state.store.products().list_all(&proof).await?))
}
