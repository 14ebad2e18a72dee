//! Session manager: login, stateless verification, single-use refresh
//! rotation with reuse detection, and revocation.

use std::sync::Arc;

use merx_domain::{Password, Principal, PrincipalId, RefreshSession, RequestContext, Role};
use merx_store::{RedeemOutcome, Store};
use serde::Serialize;

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::password::{hash_password, verify_password};
use crate::token::{
    generate_refresh_token, hash_refresh_token, issue_access_token, verify_access_token,
    AccessClaims,
};

/// Credential pair returned on login and refresh.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    /// Signed access token.
    pub access_token: String,
    /// Opaque single-use refresh token.
    pub refresh_token: String,
    /// Access-token lifetime in seconds.
    pub expires_in: u64,
}

/// Issues, verifies, rotates, and revokes tenant-bound credentials.
///
/// Every storage access goes through the gateway with the caller's
/// context, so a credential can only ever be found within its own tenant.
pub struct SessionManager<S: Store> {
    store: Arc<S>,
    config: AuthConfig,
}

impl<S: Store> SessionManager<S> {
    /// Build a manager over a gateway.
    pub fn new(store: Arc<S>, config: AuthConfig) -> Self {
        Self { store, config }
    }

    /// The active configuration.
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Create a principal with a hashed password in the context's tenant.
    pub async fn create_principal(
        &self,
        ctx: &RequestContext,
        email: &str,
        role: Role,
        password: &Password,
    ) -> Result<Principal, AuthError> {
        let phc = hash_password(password, self.config.pepper.as_deref())?;
        let principal = Principal::new(ctx.tenant_id(), email, role, phc);
        self.store.principals().create(ctx, &principal).await?;
        Ok(principal)
    }

    /// Verify credentials and open a session.
    ///
    /// Unknown email and wrong password both fail `InvalidCredentials`.
    pub async fn login(
        &self,
        ctx: &RequestContext,
        email: &str,
        password: &Password,
    ) -> Result<TokenPair, AuthError> {
        let principal = self
            .store
            .principals()
            .find_by_email(ctx, email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !verify_password(password, &principal.password_hash, self.config.pepper.as_deref())? {
            return Err(AuthError::InvalidCredentials);
        }
        if !principal.is_active() {
            return Err(AuthError::PrincipalInactive);
        }

        let pair = self.open_session(ctx, &principal, None).await?;
        tracing::info!(
            principal_id = %principal.id,
            role = principal.role.as_str(),
            "session opened"
        );
        Ok(pair)
    }

    /// Verify an access token without touching storage.
    ///
    /// The caller (daemon middleware) is responsible for comparing the
    /// claim's tenant binding against the resolved tenant.
    pub fn verify(&self, token: &str) -> Result<AccessClaims, AuthError> {
        verify_access_token(&self.config, token)
    }

    /// Redeem a refresh token and rotate the session.
    ///
    /// The presented token is consumed exactly once. A token that was
    /// already consumed is treated as theft evidence: every live session
    /// of the principal is revoked before the error is returned.
    pub async fn refresh(
        &self,
        ctx: &RequestContext,
        raw_token: &str,
    ) -> Result<TokenPair, AuthError> {
        let hash = hash_refresh_token(raw_token);
        match self.store.refresh_sessions().redeem(ctx, &hash).await? {
            RedeemOutcome::Unknown => Err(AuthError::RefreshTokenInvalid),
            RedeemOutcome::AlreadyConsumed(session) => {
                let revoked = self
                    .store
                    .refresh_sessions()
                    .revoke_all_for_principal(ctx, session.principal_id)
                    .await?;
                tracing::warn!(
                    principal_id = %session.principal_id,
                    family_id = %session.family_id,
                    sessions_revoked = revoked,
                    "refresh token reuse detected, principal sessions revoked"
                );
                Err(AuthError::RefreshTokenReused)
            }
            RedeemOutcome::Redeemed(session) => {
                if session.expires_at <= chrono::Utc::now() {
                    return Err(AuthError::RefreshTokenInvalid);
                }
                let principal = self
                    .store
                    .principals()
                    .get(ctx, session.principal_id)
                    .await?
                    .filter(|p| p.is_active())
                    .ok_or(AuthError::PrincipalInactive)?;
                self.open_session(ctx, &principal, Some(session.family_id)).await
            }
        }
    }

    /// Revoke the session matching a raw refresh token (logout).
    /// Idempotent.
    pub async fn revoke(&self, ctx: &RequestContext, raw_token: &str) -> Result<(), AuthError> {
        let hash = hash_refresh_token(raw_token);
        self.store.refresh_sessions().revoke(ctx, &hash).await?;
        Ok(())
    }

    /// Revoke every live session of a principal. Returns the count.
    pub async fn revoke_all(
        &self,
        ctx: &RequestContext,
        principal_id: PrincipalId,
    ) -> Result<u64, AuthError> {
        Ok(self
            .store
            .refresh_sessions()
            .revoke_all_for_principal(ctx, principal_id)
            .await?)
    }

    async fn open_session(
        &self,
        ctx: &RequestContext,
        principal: &Principal,
        family_id: Option<uuid::Uuid>,
    ) -> Result<TokenPair, AuthError> {
        let access_token = issue_access_token(&self.config, principal)?;
        let (raw_refresh, refresh_hash) = generate_refresh_token();
        let session = match family_id {
            Some(family) => RefreshSession::in_family(
                ctx.tenant_id(),
                principal.id,
                family,
                refresh_hash,
                self.config.refresh_ttl_secs,
            ),
            None => RefreshSession::new(
                ctx.tenant_id(),
                principal.id,
                refresh_hash,
                self.config.refresh_ttl_secs,
            ),
        };
        self.store.refresh_sessions().create(ctx, &session).await?;
        Ok(TokenPair {
            access_token,
            refresh_token: raw_refresh,
            expires_in: self.config.access_ttl_secs,
        })
    }
}
