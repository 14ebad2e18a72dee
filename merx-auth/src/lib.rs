//! Merx Session Manager
//!
//! Tenant-bound credentials: Argon2id password verification, HS256 access
//! tokens carrying the tenant binding in their claims, and opaque
//! single-use refresh tokens with rotation and reuse detection. All
//! storage goes through the scoped gateway, so sessions are only ever
//! visible within their own tenant.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod password;
pub mod service;
pub mod token;

pub use config::AuthConfig;
pub use error::AuthError;
pub use service::{SessionManager, TokenPair};
pub use token::AccessClaims;
