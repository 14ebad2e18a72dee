//! Merx Daemon
//!
//! HTTP front of the tenant-isolation layer: context middleware, auth and
//! product routes, and the superadmin tenant administration surface.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod config;
pub mod error;
pub mod middleware;
pub mod state;

pub use api::router;
pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
