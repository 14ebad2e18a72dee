//! Host-to-tenant resolution with a short-lived cache.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use merx_domain::{IsolationError, Role, Tenant, TenantId, TenantStatus};
use merx_store::Store;

use crate::error::ResolverError;

/// Longest permitted cache TTL. Suspension must propagate to every node
/// within this bound.
pub const MAX_CACHE_TTL: Duration = Duration::from_secs(60);

/// Resolver configuration.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Platform base domain; `acme.<base_domain>` resolves tenant `acme`.
    pub base_domain: String,
    /// Positive-lookup cache TTL, clamped to [`MAX_CACHE_TTL`].
    pub cache_ttl: Duration,
}

impl ResolverConfig {
    /// Load from `MERX_BASE_DOMAIN` and `MERX_TENANT_CACHE_TTL_SECS`.
    pub fn from_env() -> Self {
        let base_domain =
            std::env::var("MERX_BASE_DOMAIN").unwrap_or_else(|_| "merx.test".to_string());
        let ttl_secs = std::env::var("MERX_TENANT_CACHE_TTL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);
        Self::new(base_domain, Duration::from_secs(ttl_secs))
    }

    /// Build a configuration, clamping the TTL.
    pub fn new(base_domain: impl Into<String>, cache_ttl: Duration) -> Self {
        Self {
            base_domain: base_domain.into().to_ascii_lowercase(),
            cache_ttl: cache_ttl.min(MAX_CACHE_TTL),
        }
    }
}

/// What the middleware knows about an inbound request before resolution.
#[derive(Debug, Clone)]
pub struct ResolutionRequest<'a> {
    /// `Host` header value (port permitted, stripped before matching).
    pub host: &'a str,
    /// Explicit tenant selection (superadmin header). Ignored unless the
    /// caller is a platform superadmin.
    pub explicit_tenant: Option<TenantId>,
    /// Role of the already-verified caller, when a token was presented.
    pub caller_role: Option<Role>,
}

struct CacheEntry {
    tenant: Tenant,
    cached_at: Instant,
}

/// Maps inbound hosts (or explicit superadmin selection) to active
/// tenants.
///
/// Lookups are cached per key for the configured TTL. Status checks run on
/// every resolution including cache hits, and administrative mutations
/// invalidate the cache immediately, so the TTL only bounds staleness
/// across processes.
pub struct TenantResolver<S: Store> {
    store: Arc<S>,
    config: ResolverConfig,
    cache: RwLock<HashMap<String, CacheEntry>>,
}

impl<S: Store> TenantResolver<S> {
    /// Build a resolver over a gateway.
    pub fn new(store: Arc<S>, config: ResolverConfig) -> Self {
        Self {
            store,
            config,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// The gateway behind this resolver.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Resolve a request to its tenant.
    ///
    /// Order: explicit superadmin selection, then custom domain, then
    /// subdomain under the base domain. Suspended tenants fail
    /// `TenantSuspended`; unknown and soft-deleted ones fail
    /// `TenantNotFound` indistinguishably.
    pub async fn resolve(&self, req: &ResolutionRequest<'_>) -> Result<Tenant, ResolverError> {
        if let Some(id) = req.explicit_tenant {
            if req.caller_role.map(|r| r.is_superadmin()).unwrap_or(false) {
                return self.resolve_by_id(id).await;
            }
            // Non-superadmin explicit selection is ignored, not an error;
            // the host decides.
            tracing::debug!(tenant_id = %id, "ignoring explicit tenant selection from non-superadmin");
        }

        let host = normalize_host(req.host);
        if host.is_empty() {
            return Err(IsolationError::TenantNotFound.into());
        }

        if let Some(tenant) = self.cached(&host) {
            return checked(tenant);
        }

        let suffix = format!(".{}", self.config.base_domain);
        let found = match host.strip_suffix(&suffix) {
            // One label under the base domain is a subdomain lookup;
            // anything deeper is not a tenant address.
            Some(label) if !label.is_empty() && !label.contains('.') => {
                self.store.tenants().find_by_subdomain(label).await?
            }
            Some(_) => None,
            None => self.store.tenants().find_by_custom_domain(&host).await?,
        };

        let tenant = found.ok_or(IsolationError::TenantNotFound)?;
        self.remember(host, &tenant);
        checked(tenant)
    }

    /// Resolve by explicit ID (superadmin path).
    async fn resolve_by_id(&self, id: TenantId) -> Result<Tenant, ResolverError> {
        let key = format!("id:{id}");
        if let Some(tenant) = self.cached(&key) {
            return checked(tenant);
        }
        let tenant = self
            .store
            .tenants()
            .get(id)
            .await?
            .ok_or(IsolationError::TenantNotFound)?;
        self.remember(key, &tenant);
        checked(tenant)
    }

    /// Drop every cached lookup. Called after any tenant mutation.
    pub fn invalidate(&self) {
        self.cache.write().unwrap().clear();
    }

    fn cached(&self, key: &str) -> Option<Tenant> {
        let cache = self.cache.read().unwrap();
        let entry = cache.get(key)?;
        if entry.cached_at.elapsed() <= self.config.cache_ttl {
            Some(entry.tenant.clone())
        } else {
            None
        }
    }

    fn remember(&self, key: String, tenant: &Tenant) {
        self.cache.write().unwrap().insert(
            key,
            CacheEntry {
                tenant: tenant.clone(),
                cached_at: Instant::now(),
            },
        );
    }
}

/// Status gate applied to every resolution, cached or not.
fn checked(tenant: Tenant) -> Result<Tenant, ResolverError> {
    match tenant.status {
        TenantStatus::Active => Ok(tenant),
        TenantStatus::Suspended => Err(IsolationError::TenantSuspended.into()),
        // Soft-deleted tenants are indistinguishable from absent ones.
        TenantStatus::SoftDeleted => Err(IsolationError::TenantNotFound.into()),
    }
}

fn normalize_host(host: &str) -> String {
    let host = host.trim().to_ascii_lowercase();
    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name.to_string(),
        _ => host,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_normalization_strips_port_and_case() {
        assert_eq!(normalize_host("Acme.Merx.Test:8080"), "acme.merx.test");
        assert_eq!(normalize_host("shop.acme.com"), "shop.acme.com");
    }

    #[test]
    fn ttl_is_clamped() {
        let cfg = ResolverConfig::new("merx.test", Duration::from_secs(600));
        assert_eq!(cfg.cache_ttl, MAX_CACHE_TTL);
    }
}
