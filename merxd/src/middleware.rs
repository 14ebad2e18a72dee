//! Context middleware.
//!
//! Runs once per request, before any handler: verify the bearer token if
//! one is presented, resolve the tenant from the Host header (or the
//! explicit superadmin selection header), enforce the cross-tenant guard,
//! and insert a fresh [`RequestContext`] into the request extensions. The
//! context is built here and nowhere else; handlers receive it through the
//! [`Scoped`] extractor and cannot fabricate one.

use axum::async_trait;
use axum::extract::{FromRequestParts, Request, State};
use axum::http::header;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use merx_domain::{IsolationError, RequestContext};
use merx_resolver::ResolutionRequest;
use merx_store::Store;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// Header through which a platform superadmin addresses a specific tenant
/// regardless of host. Ignored for every other caller.
pub const TENANT_SELECTION_HEADER: &str = "x-merx-tenant";

/// Request context extractor.
///
/// Fails `NoTenantContext` when the middleware did not run for the route,
/// before any storage access.
pub struct Scoped(pub RequestContext);

#[async_trait]
impl<St: Send + Sync> FromRequestParts<St> for Scoped {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &St) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .map(Scoped)
            .ok_or(ApiError::Isolation(IsolationError::NoTenantContext))
    }
}

fn bearer_token(parts: &axum::http::HeaderMap) -> Option<&str> {
    parts
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Tenant-scoped middleware: token verification, tenant resolution,
/// cross-tenant guard, context injection.
pub async fn tenant_context<S: Store>(
    State(state): State<AppState<S>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let claims = match bearer_token(req.headers()) {
        Some(token) => Some(state.sessions.verify(token)?),
        None => None,
    };

    let explicit_tenant = match req.headers().get(TENANT_SELECTION_HEADER) {
        Some(v) => {
            let raw = v
                .to_str()
                .map_err(|_| ApiError::BadRequest("invalid tenant selection header".into()))?;
            Some(Uuid::parse_str(raw).map_err(|_| {
                ApiError::BadRequest("tenant selection header must be a UUID".into())
            })?)
        }
        None => None,
    };

    let host = req
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let caller_role = claims.as_ref().map(|c| c.role()).transpose()?;
    let tenant = state
        .resolver
        .resolve(&ResolutionRequest {
            host,
            explicit_tenant,
            caller_role,
        })
        .await?;

    let ctx = match &claims {
        Some(claims) => {
            let token_tenant = claims.tenant_id()?;
            // A token is only valid against the tenant it was issued for.
            // The one exception is a superadmin deliberately addressing a
            // tenant through the selection header.
            if token_tenant != tenant.id {
                let superadmin_override = explicit_tenant == Some(tenant.id)
                    && caller_role.map(|r| r.is_superadmin()).unwrap_or(false);
                if !superadmin_override {
                    return Err(IsolationError::CrossTenantTokenUse.into());
                }
            }
            RequestContext::authenticated(
                tenant.id,
                claims.principal_id()?,
                claims.role()?,
            )
        }
        None => RequestContext::for_tenant(tenant.id),
    };

    req.extensions_mut().insert(ctx);
    Ok(next.run(req).await)
}

/// Admin guard: superadmin bearer required, no tenant resolution.
///
/// The injected context is bound to the superadmin's own (platform)
/// tenant; handlers obtain cross-tenant proof via
/// [`RequestContext::elevate`].
pub async fn superadmin_guard<S: Store>(
    State(state): State<AppState<S>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(req.headers()).ok_or(ApiError::Unauthenticated)?;
    let claims = state.sessions.verify(token)?;
    let role = claims.role()?;
    if !role.is_superadmin() {
        return Err(ApiError::Forbidden);
    }
    let ctx = RequestContext::authenticated(claims.tenant_id()?, claims.principal_id()?, role);
    req.extensions_mut().insert(ctx);
    Ok(next.run(req).await)
}
