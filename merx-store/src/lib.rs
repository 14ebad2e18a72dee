//! Merx Scoped Data Gateway
//!
//! The only code path allowed to touch tenant-scoped tables. Exposes
//! repository traits with exactly two call shapes (tenant-scoped via
//! `RequestContext`, administrative cross-tenant via `CrossTenantContext`),
//! an in-memory implementation for tests and development, and a PostgreSQL
//! implementation behind the `postgres` feature that pairs application
//! filtering with row-level security as a second fence.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod audit;
pub mod error;
pub mod memory;
pub mod repository;
pub mod retry;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use audit::Audited;
pub use error::StoreError;
pub use memory::MemoryStore;
pub use repository::{
    AuditSink, PrincipalRepository, ProductRepository, RedeemOutcome, RefreshSessionRepository,
    Store, TenantRepository,
};
pub use retry::RetryPolicy;

#[cfg(feature = "postgres")]
pub use postgres::PgStore;
