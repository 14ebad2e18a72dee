//! Tenant administration: lifecycle and address changes.
//!
//! Every operation requires cross-tenant proof, emits an audit entry, and
//! invalidates the resolver cache so address and status changes take
//! effect on the next request.

use merx_domain::{AuditAction, AuditEntry, CrossTenantContext, Tenant, TenantStatus};
use merx_store::{Store, StoreError};

use crate::error::ResolverError;
use crate::resolve::TenantResolver;

impl<S: Store> TenantResolver<S> {
    /// Provision a tenant under a subdomain.
    pub async fn create_tenant(
        &self,
        admin: &CrossTenantContext,
        name: &str,
        subdomain: &str,
    ) -> Result<Tenant, ResolverError> {
        let tenant = Tenant::new(name, subdomain)?;
        self.store()
            .tenants()
            .create(admin, &tenant)
            .await
            .map_err(taken)?;
        self.invalidate();
        self.record(admin, &tenant, AuditAction::Create, None).await?;
        tracing::info!(tenant_id = %tenant.id, subdomain = %tenant.subdomain, "tenant created");
        Ok(tenant)
    }

    /// Suspend a tenant. Resolution fails `TenantSuspended` from the next
    /// request on.
    pub async fn suspend_tenant(
        &self,
        admin: &CrossTenantContext,
        id: merx_domain::TenantId,
    ) -> Result<Tenant, ResolverError> {
        self.transition(admin, id, TenantStatus::Suspended, AuditAction::Suspend)
            .await
    }

    /// Re-activate a suspended tenant.
    pub async fn activate_tenant(
        &self,
        admin: &CrossTenantContext,
        id: merx_domain::TenantId,
    ) -> Result<Tenant, ResolverError> {
        self.transition(admin, id, TenantStatus::Active, AuditAction::Activate)
            .await
    }

    /// Soft-delete a tenant. Terminal; the tenant becomes unresolvable.
    pub async fn soft_delete_tenant(
        &self,
        admin: &CrossTenantContext,
        id: merx_domain::TenantId,
    ) -> Result<Tenant, ResolverError> {
        self.transition(admin, id, TenantStatus::SoftDeleted, AuditAction::SoftDelete)
            .await
    }

    /// Change a tenant's subdomain and custom domain.
    pub async fn change_domains(
        &self,
        admin: &CrossTenantContext,
        id: merx_domain::TenantId,
        subdomain: &str,
        custom_domain: Option<&str>,
    ) -> Result<Tenant, ResolverError> {
        // Validate and normalize through the domain entity before the
        // store sees anything, so both backends enforce the same rules.
        let mut current = self
            .store()
            .tenants()
            .get(id)
            .await?
            .ok_or_else(|| StoreError::not_found("tenant", id.to_string()))?;
        let before = current.clone();
        current.set_domains(subdomain, custom_domain)?;

        let tenant = self
            .store()
            .tenants()
            .update_domains(
                admin,
                id,
                &current.subdomain,
                current.custom_domain.as_deref(),
            )
            .await
            .map_err(taken)?;
        self.invalidate();
        self.record(admin, &tenant, AuditAction::Update, Some(&before))
            .await?;
        Ok(tenant)
    }

    async fn transition(
        &self,
        admin: &CrossTenantContext,
        id: merx_domain::TenantId,
        status: TenantStatus,
        action: AuditAction,
    ) -> Result<Tenant, ResolverError> {
        // Validate the transition against domain rules before persisting.
        let mut current = self
            .store()
            .tenants()
            .get(id)
            .await?
            .ok_or_else(|| StoreError::not_found("tenant", id.to_string()))?;
        let before = current.clone();
        match status {
            TenantStatus::Suspended => current.suspend()?,
            TenantStatus::Active => current.activate()?,
            TenantStatus::SoftDeleted => current.soft_delete(),
        }

        let tenant = self
            .store()
            .tenants()
            .update_status(admin, id, status)
            .await?;
        self.invalidate();
        self.record(admin, &tenant, action, Some(&before)).await?;
        tracing::info!(tenant_id = %id, status = status.as_str(), "tenant status changed");
        Ok(tenant)
    }

    async fn record(
        &self,
        admin: &CrossTenantContext,
        tenant: &Tenant,
        action: AuditAction,
        before: Option<&Tenant>,
    ) -> Result<(), ResolverError> {
        let entry = AuditEntry::new(
            tenant.id,
            Some(admin.principal_id()),
            action,
            "tenant",
            tenant.id.to_string(),
            before
                .map(serde_json::to_value)
                .transpose()
                .map_err(|e| StoreError::Serialization(e.to_string()))?,
            Some(
                serde_json::to_value(tenant)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?,
            ),
        );
        self.store().audit().append_as_admin(admin, &entry).await?;
        Ok(())
    }
}

fn taken(err: StoreError) -> ResolverError {
    match err {
        StoreError::Duplicate { id, .. } => ResolverError::AddressTaken(id),
        other => ResolverError::Store(other),
    }
}
