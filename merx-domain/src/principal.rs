//! Principal (end user / admin) entity and roles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::tenant::TenantId;

/// Unique identifier for a Principal.
pub type PrincipalId = Uuid;

/// Principal role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Platform operator; the only role permitted on the cross-tenant
    /// bypass path.
    PlatformSuperadmin,
    /// Administrator within one tenant.
    TenantAdmin,
    /// End customer of one tenant.
    Customer,
}

impl Role {
    /// Stable string form (storage and token claims).
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::PlatformSuperadmin => "platform_superadmin",
            Role::TenantAdmin => "tenant_admin",
            Role::Customer => "customer",
        }
    }

    /// Parse the storage/claim string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "platform_superadmin" => Some(Role::PlatformSuperadmin),
            "tenant_admin" => Some(Role::TenantAdmin),
            "customer" => Some(Role::Customer),
            _ => None,
        }
    }

    /// Whether this role may use the cross-tenant bypass path.
    pub fn is_superadmin(&self) -> bool {
        matches!(self, Role::PlatformSuperadmin)
    }
}

/// A user account bound to exactly one tenant.
///
/// # Invariants
///
/// - `tenant_id` is immutable after creation (no setter exists; the store
///   never updates the column).
/// - `password_hash` is an irreversible Argon2id PHC string; cleartext is
///   never persisted or logged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    /// Principal identity.
    pub id: PrincipalId,
    /// Owning tenant. Immutable.
    pub tenant_id: TenantId,
    /// Login email, unique within the tenant.
    pub email: String,
    /// Role.
    pub role: Role,
    /// Argon2id PHC-format password hash.
    pub password_hash: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
    /// Soft-delete timestamp.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Principal {
    /// Create a new principal in the given tenant.
    pub fn new(
        tenant_id: TenantId,
        email: impl Into<String>,
        role: Role,
        password_hash: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            tenant_id,
            email: email.into().to_ascii_lowercase(),
            role,
            password_hash: password_hash.into(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Whether the principal may authenticate.
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }

    /// Soft-delete the principal.
    pub fn soft_delete(&mut self) {
        let now = Utc::now();
        self.deleted_at = Some(now);
        self.updated_at = now;
    }
}

/// Cleartext password in transit to the hasher.
///
/// Wrapped so the buffer is zeroed on drop and cannot end up in debug
/// output.
pub struct Password(Zeroizing<String>);

impl Password {
    /// Wrap a cleartext password.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(Zeroizing::new(raw.into()))
    }

    /// Expose the cleartext for hashing/verification.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_string_roundtrip() {
        for r in [Role::PlatformSuperadmin, Role::TenantAdmin, Role::Customer] {
            assert_eq!(Role::parse(r.as_str()), Some(r));
        }
        assert_eq!(Role::parse("root"), None);
    }

    #[test]
    fn only_superadmin_bypasses() {
        assert!(Role::PlatformSuperadmin.is_superadmin());
        assert!(!Role::TenantAdmin.is_superadmin());
        assert!(!Role::Customer.is_superadmin());
    }

    #[test]
    fn email_is_lowercased() {
        let p = Principal::new(Uuid::now_v7(), "Alice@Acme.COM", Role::Customer, "h");
        assert_eq!(p.email, "alice@acme.com");
    }

    #[test]
    fn soft_delete_deactivates() {
        let mut p = Principal::new(Uuid::now_v7(), "a@b.c", Role::Customer, "h");
        assert!(p.is_active());
        p.soft_delete();
        assert!(!p.is_active());
    }

    #[test]
    fn password_debug_is_redacted() {
        let p = Password::new("hunter2");
        assert_eq!(format!("{:?}", p), "Password(<redacted>)");
        assert_eq!(p.expose(), "hunter2");
    }
}
