//! Product, the exemplar tenant-scoped entity.
//!
//! Product business logic lives outside this core; the entity is carried
//! here so the isolation layer has a concrete tenant-scoped table to
//! enforce and test against.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tenant::TenantId;

/// Unique identifier for a Product.
pub type ProductId = Uuid;

/// A tenant-owned catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Product identity.
    pub id: ProductId,
    /// Owning tenant; stamped by the gateway, never by callers.
    pub tenant_id: TenantId,
    /// Display name.
    pub name: String,
    /// Unit price.
    pub price: Decimal,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
    /// Soft-delete timestamp.
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Payload for creating a product.
///
/// `tenant_id` exists only so a caller-supplied value can be *checked*
/// against the active context; the gateway stamps the real value and
/// rejects any conflict with `TenantMismatch`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProduct {
    /// Display name.
    pub name: String,
    /// Unit price.
    pub price: Decimal,
    /// Optional caller-supplied tenant; must match the context if present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<TenantId>,
}

impl Product {
    /// Materialize a product for the given tenant.
    pub fn create(tenant_id: TenantId, new: &NewProduct) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            tenant_id,
            name: new.name.clone(),
            price: new.price,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Whether the product is visible (not soft-deleted).
    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn create_stamps_tenant_and_timestamps() {
        let tid = Uuid::now_v7();
        let p = Product::create(
            tid,
            &NewProduct {
                name: "Widget".into(),
                price: dec!(9.99),
                tenant_id: None,
            },
        );
        assert_eq!(p.tenant_id, tid);
        assert_eq!(p.price, dec!(9.99));
        assert!(p.is_live());
    }
}
