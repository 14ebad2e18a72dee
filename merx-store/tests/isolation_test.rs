//! Gateway isolation tests.
//!
//! Exercises the tenant-scoping contract end to end against the in-memory
//! gateway: pairwise confinement, tenant stamping, fail-closed behavior
//! with no context or no policy, connection-parameter hygiene under
//! concurrency, and the audit side channel of the write path.

use merx_domain::{IsolationError, NewProduct, Principal, RequestContext, Role, Tenant};
use merx_policy::PolicyRegistry;
use merx_store::{MemoryStore, RedeemOutcome, Store, StoreError};
use rust_decimal_macros::dec;
use std::sync::Arc;
use uuid::Uuid;

fn new_product(name: &str) -> NewProduct {
    NewProduct {
        name: name.into(),
        price: dec!(19.90),
        tenant_id: None,
    }
}

#[tokio::test]
async fn tenants_never_see_each_other() {
    let store = MemoryStore::new();
    let acme = RequestContext::for_tenant(Uuid::now_v7());
    let globex = RequestContext::for_tenant(Uuid::now_v7());

    let widget = store.products().insert(&acme, &new_product("Widget")).await.unwrap();
    store.products().insert(&globex, &new_product("Gadget")).await.unwrap();

    let acme_view = store.products().list(&acme).await.unwrap();
    assert_eq!(acme_view.len(), 1);
    assert_eq!(acme_view[0].name, "Widget");

    let globex_view = store.products().list(&globex).await.unwrap();
    assert_eq!(globex_view.len(), 1);
    assert_eq!(globex_view[0].name, "Gadget");

    // Knowing the row's primary key does not help.
    assert!(store.products().get(&globex, widget.id).await.unwrap().is_none());
    // Nor does soft-deleting across the fence.
    assert!(matches!(
        store.products().soft_delete(&globex, widget.id).await,
        Err(StoreError::NotFound { .. })
    ));
}

#[tokio::test]
async fn writes_are_stamped_with_the_context_tenant() {
    let store = MemoryStore::new();
    let ctx = RequestContext::for_tenant(Uuid::now_v7());

    // The payload does not name a tenant at all; the gateway supplies it.
    let product = store.products().insert(&ctx, &new_product("Widget")).await.unwrap();
    assert_eq!(product.tenant_id, ctx.tenant_id());
}

#[tokio::test]
async fn mismatched_payload_tenant_fails_without_touching_storage() {
    let store = MemoryStore::new();
    let ctx = RequestContext::for_tenant(Uuid::now_v7());
    let queries_before = store.query_count();

    let foreign = NewProduct {
        name: "Widget".into(),
        price: dec!(1.00),
        tenant_id: Some(Uuid::now_v7()),
    };
    let err = store.products().insert(&ctx, &foreign).await.unwrap_err();

    assert!(matches!(
        err,
        StoreError::Isolation(IsolationError::TenantMismatch)
    ));
    assert_eq!(store.query_count(), queries_before);
    assert!(store.audit_entries().is_empty());
}

#[tokio::test]
async fn unregistered_table_denies_and_issues_no_data_query() {
    let store = MemoryStore::with_registry(PolicyRegistry::empty());
    let ctx = RequestContext::for_tenant(Uuid::now_v7());

    let err = store.products().list(&ctx).await.unwrap_err();
    assert!(matches!(err, StoreError::PolicyMissing { .. }));
    assert_eq!(store.query_count(), 0);
}

#[tokio::test]
async fn concurrent_tenants_on_a_shared_pool_stay_isolated() {
    // Many tenants hammering the same gateway (and its small connection
    // pool) concurrently. Every read must come back confined to its own
    // tenant, and no connection may be observed with a leftover parameter.
    let store = Arc::new(MemoryStore::new());
    let mut handles = Vec::new();

    for i in 0..16 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let ctx = RequestContext::for_tenant(Uuid::now_v7());
            for round in 0..8 {
                let name = format!("item-{i}-{round}");
                store.products().insert(&ctx, &new_product(&name)).await.unwrap();
                tokio::task::yield_now().await;
                let view = store.products().list(&ctx).await.unwrap();
                assert_eq!(view.len(), round + 1);
                for p in &view {
                    assert_eq!(p.tenant_id, ctx.tenant_id());
                }
            }
        }));
    }

    for h in handles {
        h.await.unwrap();
    }
}

#[tokio::test]
async fn cross_tenant_listing_requires_superadmin_proof() {
    let store = MemoryStore::new();
    let a = RequestContext::for_tenant(Uuid::now_v7());
    let b = RequestContext::for_tenant(Uuid::now_v7());
    store.products().insert(&a, &new_product("A")).await.unwrap();
    store.products().insert(&b, &new_product("B")).await.unwrap();

    // A tenant admin cannot elevate.
    let admin_ctx =
        RequestContext::authenticated(a.tenant_id(), Uuid::now_v7(), Role::TenantAdmin);
    assert!(admin_ctx.elevate().is_err());

    // A platform superadmin can, and then sees everything.
    let root_ctx = RequestContext::authenticated(
        Uuid::now_v7(),
        Uuid::now_v7(),
        Role::PlatformSuperadmin,
    );
    let proof = root_ctx.elevate().unwrap();
    assert_eq!(store.products().list_all(&proof).await.unwrap().len(), 2);
}

#[tokio::test]
async fn principal_email_is_unique_per_tenant_not_globally() {
    let store = MemoryStore::new();
    let a = RequestContext::for_tenant(Uuid::now_v7());
    let b = RequestContext::for_tenant(Uuid::now_v7());

    let make = |tenant| Principal::new(tenant, "Sam@Example.com", Role::Customer, "$argon2id$stub");

    store.principals().create(&a, &make(a.tenant_id())).await.unwrap();
    // Same address in another tenant is fine.
    store.principals().create(&b, &make(b.tenant_id())).await.unwrap();
    // Same address in the same tenant is not (case-insensitive).
    let err = store.principals().create(&a, &make(a.tenant_id())).await.unwrap_err();
    assert!(matches!(err, StoreError::Duplicate { .. }));
}

#[tokio::test]
async fn concurrent_redemptions_consume_exactly_once() {
    let store = Arc::new(MemoryStore::new());
    let tid = Uuid::now_v7();
    let ctx = RequestContext::for_tenant(tid);
    let session = merx_domain::RefreshSession::new(tid, Uuid::now_v7(), "shared-hash", 3600);
    store.refresh_sessions().create(&ctx, &session).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        let ctx = ctx.clone();
        handles.push(tokio::spawn(async move {
            store.refresh_sessions().redeem(&ctx, "shared-hash").await.unwrap()
        }));
    }

    let mut redeemed = 0;
    let mut already = 0;
    for h in handles {
        match h.await.unwrap() {
            RedeemOutcome::Redeemed(_) => redeemed += 1,
            RedeemOutcome::AlreadyConsumed(_) => already += 1,
            RedeemOutcome::Unknown => panic!("session vanished"),
        }
    }
    assert_eq!(redeemed, 1);
    assert_eq!(already, 7);
}

#[tokio::test]
async fn product_writes_leave_an_audit_trail() {
    let store = MemoryStore::new();
    let tid = Uuid::now_v7();
    let pid = Uuid::now_v7();
    let ctx = RequestContext::authenticated(tid, pid, Role::TenantAdmin);

    let product = store.products().insert(&ctx, &new_product("Widget")).await.unwrap();
    store.products().soft_delete(&ctx, product.id).await.unwrap();

    let entries = store.audit().list(&ctx).await.unwrap();
    assert_eq!(entries.len(), 2);

    let create = &entries[0];
    assert_eq!(create.action.as_str(), "create");
    assert_eq!(create.entity_type, "product");
    assert_eq!(create.entity_id, product.id.to_string());
    assert_eq!(create.principal_id, Some(pid));
    assert_eq!(create.tenant_id, tid);
    assert!(create.before.is_none());
    assert!(create.after.is_some());

    let delete = &entries[1];
    assert_eq!(delete.action.as_str(), "soft_delete");
    assert!(delete.before.is_some());
    assert!(delete.after.as_ref().unwrap().get("deleted_at").is_some());
}

#[tokio::test]
async fn audit_trail_is_append_only_per_tenant() {
    let store = MemoryStore::new();
    let a = RequestContext::for_tenant(Uuid::now_v7());
    let b = RequestContext::for_tenant(Uuid::now_v7());

    store.products().insert(&a, &new_product("A")).await.unwrap();
    store.products().insert(&b, &new_product("B")).await.unwrap();

    // Each tenant reads only its own history.
    for ctx in [&a, &b] {
        let entries = store.audit().list(ctx).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].tenant_id, ctx.tenant_id());
    }
}

#[tokio::test]
async fn audit_appends_are_tenant_bound_like_every_other_write() {
    let store = MemoryStore::new();
    let a = RequestContext::for_tenant(Uuid::now_v7());
    let b = RequestContext::for_tenant(Uuid::now_v7());
    let queries_before = store.query_count();

    // An entry naming another tenant is refused before any statement.
    let entry = merx_domain::AuditEntry::new(
        b.tenant_id(),
        None,
        merx_domain::AuditAction::Create,
        "product",
        Uuid::now_v7().to_string(),
        None,
        None,
    );
    let err = store.audit().append(&a, &entry).await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::Isolation(IsolationError::TenantMismatch)
    ));
    assert_eq!(store.query_count(), queries_before);
    assert!(store.audit_entries().is_empty());

    // The cross-tenant shape takes superadmin proof.
    let proof = RequestContext::authenticated(
        Uuid::now_v7(),
        Uuid::now_v7(),
        Role::PlatformSuperadmin,
    )
    .elevate()
    .unwrap();
    store.audit().append_as_admin(&proof, &entry).await.unwrap();
    assert_eq!(store.audit().list(&b).await.unwrap().len(), 1);
    assert!(store.audit().list(&a).await.unwrap().is_empty());
}

#[tokio::test]
async fn suspended_status_round_trips_through_the_tenant_repository() {
    let store = MemoryStore::new();
    let root = RequestContext::authenticated(
        Uuid::now_v7(),
        Uuid::now_v7(),
        Role::PlatformSuperadmin,
    );
    let proof = root.elevate().unwrap();

    let tenant = Tenant::new("Acme", "acme").unwrap();
    store.tenants().create(&proof, &tenant).await.unwrap();

    let suspended = store
        .tenants()
        .update_status(&proof, tenant.id, merx_domain::TenantStatus::Suspended)
        .await
        .unwrap();
    assert_eq!(suspended.status, merx_domain::TenantStatus::Suspended);

    let fetched = store.tenants().get(tenant.id).await.unwrap().unwrap();
    assert_eq!(fetched.status, merx_domain::TenantStatus::Suspended);
}
