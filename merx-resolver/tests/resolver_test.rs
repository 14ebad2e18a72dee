//! Resolver integration tests over the in-memory gateway.

use std::sync::Arc;
use std::time::Duration;

use merx_domain::{CrossTenantContext, IsolationError, RequestContext, Role, Tenant};
use merx_resolver::{ResolutionRequest, ResolverConfig, ResolverError, TenantResolver};
use merx_store::{MemoryStore, Store};
use uuid::Uuid;

fn proof() -> CrossTenantContext {
    RequestContext::authenticated(Uuid::now_v7(), Uuid::now_v7(), Role::PlatformSuperadmin)
        .elevate()
        .unwrap()
}

fn resolver() -> TenantResolver<MemoryStore> {
    TenantResolver::new(
        Arc::new(MemoryStore::new()),
        ResolverConfig::new("merx.test", Duration::from_secs(30)),
    )
}

fn by_host(host: &str) -> ResolutionRequest<'_> {
    ResolutionRequest {
        host,
        explicit_tenant: None,
        caller_role: None,
    }
}

#[tokio::test]
async fn subdomain_resolves_its_tenant() {
    let resolver = resolver();
    let tenant = resolver.create_tenant(&proof(), "Acme", "acme").await.unwrap();

    let resolved = resolver.resolve(&by_host("acme.merx.test")).await.unwrap();
    assert_eq!(resolved.id, tenant.id);

    // Case and port do not matter.
    let resolved = resolver.resolve(&by_host("ACME.Merx.Test:8443")).await.unwrap();
    assert_eq!(resolved.id, tenant.id);
}

#[tokio::test]
async fn unknown_hosts_fail_not_found() {
    let resolver = resolver();
    resolver.create_tenant(&proof(), "Acme", "acme").await.unwrap();

    for host in [
        "globex.merx.test",
        "merx.test",
        "deep.acme.merx.test",
        "unrelated.example.com",
        "",
    ] {
        let err = resolver.resolve(&by_host(host)).await.unwrap_err();
        assert!(
            matches!(err, ResolverError::Isolation(IsolationError::TenantNotFound)),
            "host {host:?}"
        );
    }
}

#[tokio::test]
async fn custom_domain_resolves_after_assignment() {
    let resolver = resolver();
    let tenant = resolver.create_tenant(&proof(), "Acme", "acme").await.unwrap();
    resolver
        .change_domains(&proof(), tenant.id, "acme", Some("shop.acme.com"))
        .await
        .unwrap();

    let resolved = resolver.resolve(&by_host("shop.acme.com")).await.unwrap();
    assert_eq!(resolved.id, tenant.id);
    // The subdomain keeps working.
    assert!(resolver.resolve(&by_host("acme.merx.test")).await.is_ok());
}

#[tokio::test]
async fn suspension_takes_effect_despite_the_cache() {
    let resolver = resolver();
    let tenant = resolver.create_tenant(&proof(), "Acme", "acme").await.unwrap();

    // Warm the cache.
    resolver.resolve(&by_host("acme.merx.test")).await.unwrap();

    resolver.suspend_tenant(&proof(), tenant.id).await.unwrap();
    let err = resolver.resolve(&by_host("acme.merx.test")).await.unwrap_err();
    assert!(matches!(
        err,
        ResolverError::Isolation(IsolationError::TenantSuspended)
    ));

    resolver.activate_tenant(&proof(), tenant.id).await.unwrap();
    assert!(resolver.resolve(&by_host("acme.merx.test")).await.is_ok());
}

#[tokio::test]
async fn soft_deleted_tenant_is_indistinguishable_from_absent() {
    let resolver = resolver();
    let tenant = resolver.create_tenant(&proof(), "Acme", "acme").await.unwrap();
    resolver.soft_delete_tenant(&proof(), tenant.id).await.unwrap();

    let err = resolver.resolve(&by_host("acme.merx.test")).await.unwrap_err();
    assert!(matches!(
        err,
        ResolverError::Isolation(IsolationError::TenantNotFound)
    ));

    // Terminal: no way back.
    assert!(resolver.activate_tenant(&proof(), tenant.id).await.is_err());
}

#[tokio::test]
async fn addresses_are_unique_case_insensitively() {
    let resolver = resolver();
    resolver.create_tenant(&proof(), "Acme", "acme").await.unwrap();

    let err = resolver.create_tenant(&proof(), "Impostor", "ACME").await.unwrap_err();
    assert!(matches!(err, ResolverError::AddressTaken(_)));
}

#[tokio::test]
async fn explicit_selection_is_superadmin_only() {
    let resolver = resolver();
    let acme = resolver.create_tenant(&proof(), "Acme", "acme").await.unwrap();
    let globex = resolver.create_tenant(&proof(), "Globex", "globex").await.unwrap();

    // Superadmin may address any tenant regardless of host.
    let req = ResolutionRequest {
        host: "globex.merx.test",
        explicit_tenant: Some(acme.id),
        caller_role: Some(Role::PlatformSuperadmin),
    };
    assert_eq!(resolver.resolve(&req).await.unwrap().id, acme.id);

    // Anyone else: the explicit selection is ignored and the host wins.
    let req = ResolutionRequest {
        host: "globex.merx.test",
        explicit_tenant: Some(acme.id),
        caller_role: Some(Role::TenantAdmin),
    };
    assert_eq!(resolver.resolve(&req).await.unwrap().id, globex.id);

    let req = ResolutionRequest {
        host: "globex.merx.test",
        explicit_tenant: Some(acme.id),
        caller_role: None,
    };
    assert_eq!(resolver.resolve(&req).await.unwrap().id, globex.id);
}

#[tokio::test]
async fn cache_serves_repeat_lookups_without_queries() {
    let store = Arc::new(MemoryStore::new());
    let resolver = TenantResolver::new(
        store.clone(),
        ResolverConfig::new("merx.test", Duration::from_secs(30)),
    );
    resolver.create_tenant(&proof(), "Acme", "acme").await.unwrap();

    resolver.resolve(&by_host("acme.merx.test")).await.unwrap();
    let after_first = store.query_count();
    for _ in 0..5 {
        resolver.resolve(&by_host("acme.merx.test")).await.unwrap();
    }
    assert_eq!(store.query_count(), after_first);
}

#[tokio::test]
async fn address_change_is_visible_immediately() {
    let resolver = resolver();
    let tenant = resolver.create_tenant(&proof(), "Acme", "acme").await.unwrap();
    resolver.resolve(&by_host("acme.merx.test")).await.unwrap();

    resolver
        .change_domains(&proof(), tenant.id, "acme-inc", None)
        .await
        .unwrap();

    assert!(resolver.resolve(&by_host("acme.merx.test")).await.is_err());
    assert!(resolver.resolve(&by_host("acme-inc.merx.test")).await.is_ok());
}

#[tokio::test]
async fn malformed_addresses_never_reach_the_store() {
    let resolver = resolver();
    let tenant = resolver.create_tenant(&proof(), "Acme", "acme").await.unwrap();

    for (subdomain, custom) in [
        ("has space", None),
        ("dot.ted", None),
        ("acme", Some("nodots")),
        ("acme", Some("http://x.com")),
        ("acme", Some("a b.com")),
    ] {
        let err = resolver
            .change_domains(&proof(), tenant.id, subdomain, custom)
            .await
            .unwrap_err();
        assert!(
            matches!(err, ResolverError::InvalidAddress(_)),
            "{subdomain:?} / {custom:?}"
        );
    }

    // The original address still resolves; nothing was persisted.
    assert!(resolver.resolve(&by_host("acme.merx.test")).await.is_ok());

    // Valid input is normalized before it is stored.
    let updated = resolver
        .change_domains(&proof(), tenant.id, "AcMe", Some("Shop.Acme.COM"))
        .await
        .unwrap();
    assert_eq!(updated.subdomain, "acme");
    assert_eq!(updated.custom_domain.as_deref(), Some("shop.acme.com"));
}

#[tokio::test]
async fn lifecycle_changes_are_audited() {
    let store = Arc::new(MemoryStore::new());
    let resolver = TenantResolver::new(
        store.clone(),
        ResolverConfig::new("merx.test", Duration::from_secs(30)),
    );
    let tenant = resolver.create_tenant(&proof(), "Acme", "acme").await.unwrap();
    resolver.suspend_tenant(&proof(), tenant.id).await.unwrap();

    let ctx = RequestContext::for_tenant(tenant.id);
    let entries = store.audit().list(&ctx).await.unwrap();
    let actions: Vec<&str> = entries.iter().map(|e| e.action.as_str()).collect();
    assert_eq!(actions, vec!["create", "suspend"]);
    assert!(entries.iter().all(|e| e.entity_type == "tenant"));
}

#[tokio::test]
async fn preexisting_tenants_resolve_without_admin_involvement() {
    let store = Arc::new(MemoryStore::new());
    let tenant = Tenant::new("Acme", "acme").unwrap();
    store.tenants().create(&proof(), &tenant).await.unwrap();

    let resolver = TenantResolver::new(
        store,
        ResolverConfig::new("merx.test", Duration::from_secs(30)),
    );
    assert_eq!(
        resolver.resolve(&by_host("acme.merx.test")).await.unwrap().id,
        tenant.id
    );
}
