//! Shared state for API handlers.

use std::sync::Arc;

use merx_auth::SessionManager;
use merx_resolver::TenantResolver;
use merx_store::Store;

use crate::config::Config;

/// Shared state handed to every handler and the context middleware.
pub struct AppState<S: Store> {
    /// Scoped data gateway.
    pub store: Arc<S>,
    /// Host-to-tenant resolver and tenant administration.
    pub resolver: Arc<TenantResolver<S>>,
    /// Session manager.
    pub sessions: Arc<SessionManager<S>>,
}

impl<S: Store> AppState<S> {
    /// Wire up the state from a gateway and configuration.
    pub fn new(store: Arc<S>, config: &Config) -> Self {
        Self {
            resolver: Arc::new(TenantResolver::new(store.clone(), config.resolver.clone())),
            sessions: Arc::new(SessionManager::new(store.clone(), config.auth.clone())),
            store,
        }
    }
}

impl<S: Store> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            resolver: self.resolver.clone(),
            sessions: self.sessions.clone(),
        }
    }
}
