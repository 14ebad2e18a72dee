//! Merx Domain Layer
//!
//! Pure domain logic with zero I/O dependencies.
//! Contains entities, the per-request tenant context, and the isolation
//! error taxonomy shared by every other crate.

#![warn(missing_docs)]
#![warn(clippy::all)]

// Public modules
pub mod audit;
pub mod context;
pub mod error;
pub mod principal;
pub mod product;
pub mod session;
pub mod tenant;

// Re-export commonly used types
pub use audit::{AuditAction, AuditEntry};
pub use context::{with_tenant_context, CrossTenantContext, PrincipalContext, RequestContext};
pub use error::IsolationError;
pub use principal::{Password, Principal, PrincipalId, Role};
pub use product::{NewProduct, Product, ProductId};
pub use session::RefreshSession;
pub use tenant::{Tenant, TenantError, TenantId, TenantStatus};
