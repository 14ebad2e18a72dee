//! Audit decorator for the product write path.
//!
//! Wraps a [`ProductRepository`] so every successful write appends one
//! [`AuditEntry`] to the sink. Reads pass straight through. Handlers never
//! write audit entries themselves; the decorator is the single emission
//! point.

use async_trait::async_trait;
use merx_domain::{AuditAction, AuditEntry, CrossTenantContext, NewProduct, Product, ProductId,
    RequestContext};
use serde_json::Value;

use crate::error::StoreError;
use crate::repository::{AuditSink, ProductRepository};

/// Product repository whose writes emit audit entries.
pub struct Audited<P, A> {
    inner: P,
    sink: A,
}

impl<P, A> Audited<P, A> {
    /// Wrap a repository with an audit sink.
    pub fn new(inner: P, sink: A) -> Self {
        Self { inner, sink }
    }
}

fn snapshot(product: &Product) -> Result<Value, StoreError> {
    serde_json::to_value(product).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn acting_principal(ctx: &RequestContext) -> Option<merx_domain::PrincipalId> {
    ctx.principal().map(|p| p.principal_id)
}

#[async_trait]
impl<P, A> ProductRepository for Audited<P, A>
where
    P: ProductRepository,
    A: AuditSink,
{
    async fn insert(
        &self,
        ctx: &RequestContext,
        new: &NewProduct,
    ) -> Result<Product, StoreError> {
        let product = self.inner.insert(ctx, new).await?;
        let entry = AuditEntry::new(
            ctx.tenant_id(),
            acting_principal(ctx),
            AuditAction::Create,
            "product",
            product.id.to_string(),
            None,
            Some(snapshot(&product)?),
        );
        self.sink.append(ctx, &entry).await?;
        Ok(product)
    }

    async fn list(&self, ctx: &RequestContext) -> Result<Vec<Product>, StoreError> {
        self.inner.list(ctx).await
    }

    async fn get(
        &self,
        ctx: &RequestContext,
        id: ProductId,
    ) -> Result<Option<Product>, StoreError> {
        self.inner.get(ctx, id).await
    }

    async fn soft_delete(
        &self,
        ctx: &RequestContext,
        id: ProductId,
    ) -> Result<Product, StoreError> {
        let before = self.inner.get(ctx, id).await?;
        let product = self.inner.soft_delete(ctx, id).await?;
        let entry = AuditEntry::new(
            ctx.tenant_id(),
            acting_principal(ctx),
            AuditAction::SoftDelete,
            "product",
            product.id.to_string(),
            before.as_ref().map(snapshot).transpose()?,
            Some(snapshot(&product)?),
        );
        self.sink.append(ctx, &entry).await?;
        Ok(product)
    }

    async fn list_all(&self, admin: &CrossTenantContext) -> Result<Vec<Product>, StoreError> {
        self.inner.list_all(admin).await
    }
}
