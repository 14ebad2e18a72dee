//! Refresh session, the stateful half of a credential pair.
//!
//! The raw refresh token is opaque and returned to the client once; only
//! its SHA-256 hash is ever persisted. Each session is single-use:
//! redemption consumes it and issues a replacement in the same family.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::principal::PrincipalId;
use crate::tenant::TenantId;

/// Server-side record of one refresh token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshSession {
    /// Session identity.
    pub id: Uuid,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Principal the credential is bound to.
    pub principal_id: PrincipalId,
    /// Rotation lineage; preserved across redemptions.
    pub family_id: Uuid,
    /// SHA-256 hex of the opaque token. The raw value is never stored.
    pub token_hash: String,
    /// Hard expiry.
    pub expires_at: DateTime<Utc>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Set when the token is redeemed; a consumed session can never be
    /// redeemed again.
    pub consumed_at: Option<DateTime<Utc>>,
    /// Set on logout or cascading revocation.
    pub revoked_at: Option<DateTime<Utc>>,
}

impl RefreshSession {
    /// Open a new session in a fresh family.
    pub fn new(
        tenant_id: TenantId,
        principal_id: PrincipalId,
        token_hash: impl Into<String>,
        lifetime_secs: u64,
    ) -> Self {
        Self::in_family(tenant_id, principal_id, Uuid::now_v7(), token_hash, lifetime_secs)
    }

    /// Open a session continuing an existing family (rotation).
    pub fn in_family(
        tenant_id: TenantId,
        principal_id: PrincipalId,
        family_id: Uuid,
        token_hash: impl Into<String>,
        lifetime_secs: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            tenant_id,
            principal_id,
            family_id,
            token_hash: token_hash.into(),
            expires_at: now + Duration::seconds(lifetime_secs as i64),
            created_at: now,
            consumed_at: None,
            revoked_at: None,
        }
    }

    /// Redeemable: neither consumed, revoked, nor expired.
    pub fn is_live(&self) -> bool {
        self.consumed_at.is_none() && self.revoked_at.is_none() && self.expires_at > Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_is_live() {
        let s = RefreshSession::new(Uuid::now_v7(), Uuid::now_v7(), "hash", 3600);
        assert!(s.is_live());
        assert_eq!(s.token_hash, "hash");
    }

    #[test]
    fn rotation_preserves_family() {
        let first = RefreshSession::new(Uuid::now_v7(), Uuid::now_v7(), "h1", 3600);
        let next = RefreshSession::in_family(
            first.tenant_id,
            first.principal_id,
            first.family_id,
            "h2",
            3600,
        );
        assert_eq!(next.family_id, first.family_id);
        assert_ne!(next.id, first.id);
    }

    #[test]
    fn expired_session_is_not_live() {
        let mut s = RefreshSession::new(Uuid::now_v7(), Uuid::now_v7(), "h", 3600);
        s.expires_at = Utc::now() - Duration::seconds(1);
        assert!(!s.is_live());
    }

    #[test]
    fn consumed_session_is_not_live() {
        let mut s = RefreshSession::new(Uuid::now_v7(), Uuid::now_v7(), "h", 3600);
        s.consumed_at = Some(Utc::now());
        assert!(!s.is_live());
    }
}
