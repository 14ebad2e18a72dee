//! Merx Tenant Resolver
//!
//! Maps inbound hosts (subdomain under the platform base domain, or a
//! verified custom domain) and explicit superadmin selection to active
//! tenants, with a short-TTL cache, and carries the administrative
//! lifecycle of tenants (provisioning, suspension, soft deletion, address
//! changes).

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod admin;
pub mod error;
pub mod resolve;

pub use error::ResolverError;
pub use resolve::{ResolutionRequest, ResolverConfig, TenantResolver, MAX_CACHE_TTL};
