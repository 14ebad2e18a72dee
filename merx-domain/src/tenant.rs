//! Tenant entity and lifecycle.
//!
//! A tenant owns a disjoint slice of all shared data. Tenants are created
//! by platform operators, mutated only through the resolver's
//! administrative path, and never hard-deleted: suspension and soft-delete
//! are the only destructive transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for a Tenant.
pub type TenantId = Uuid;

/// Tenant lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantStatus {
    /// Serving requests.
    Active,
    /// Temporarily disabled; resolution fails with `TenantSuspended`.
    Suspended,
    /// Logically deleted; indistinguishable from absence to callers.
    SoftDeleted,
}

impl TenantStatus {
    /// Stable string form used in storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            TenantStatus::Active => "active",
            TenantStatus::Suspended => "suspended",
            TenantStatus::SoftDeleted => "soft_deleted",
        }
    }

    /// Parse the storage string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(TenantStatus::Active),
            "suspended" => Some(TenantStatus::Suspended),
            "soft_deleted" => Some(TenantStatus::SoftDeleted),
            _ => None,
        }
    }
}

/// Errors raised by tenant construction and transitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TenantError {
    /// Subdomain failed validation.
    #[error("invalid subdomain: {0}")]
    InvalidSubdomain(String),

    /// Custom domain failed validation.
    #[error("invalid custom domain: {0}")]
    InvalidDomain(String),

    /// Transition not permitted from the current status.
    #[error("invalid status transition: {0}")]
    InvalidTransition(String),
}

/// An isolated customer account.
///
/// # Invariants
///
/// - `subdomain` and `custom_domain` are stored lowercase and are globally
///   unique across all tenants (enforced by the store).
/// - A soft-deleted tenant never returns to any other status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    /// Tenant identity.
    pub id: TenantId,
    /// Human-readable name.
    pub name: String,
    /// Resolvable subdomain label (e.g. `acme` for `acme.merx.app`).
    pub subdomain: String,
    /// Optional fully-qualified custom domain (e.g. `shop.acme.com`).
    pub custom_domain: Option<String>,
    /// Lifecycle status.
    pub status: TenantStatus,
    /// Free-form settings blob.
    pub settings: serde_json::Value,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
    /// Soft-delete timestamp.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Tenant {
    /// Create a new active tenant.
    ///
    /// # Errors
    ///
    /// Returns `TenantError::InvalidSubdomain` if the subdomain is empty or
    /// contains characters other than lowercase ASCII alphanumerics and
    /// hyphens (input is lowercased first).
    pub fn new(name: impl Into<String>, subdomain: &str) -> Result<Self, TenantError> {
        let subdomain = normalize_subdomain(subdomain)?;
        let now = Utc::now();
        Ok(Self {
            id: Uuid::now_v7(),
            name: name.into(),
            subdomain,
            custom_domain: None,
            status: TenantStatus::Active,
            settings: serde_json::json!({}),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }

    /// Whether the tenant may serve requests.
    pub fn is_active(&self) -> bool {
        self.status == TenantStatus::Active
    }

    /// Suspend the tenant.
    ///
    /// # Errors
    ///
    /// Fails if the tenant is soft-deleted.
    pub fn suspend(&mut self) -> Result<(), TenantError> {
        if self.status == TenantStatus::SoftDeleted {
            return Err(TenantError::InvalidTransition(
                "cannot suspend a soft-deleted tenant".into(),
            ));
        }
        self.status = TenantStatus::Suspended;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Re-activate a suspended tenant.
    ///
    /// # Errors
    ///
    /// Fails if the tenant is soft-deleted.
    pub fn activate(&mut self) -> Result<(), TenantError> {
        if self.status == TenantStatus::SoftDeleted {
            return Err(TenantError::InvalidTransition(
                "cannot activate a soft-deleted tenant".into(),
            ));
        }
        self.status = TenantStatus::Active;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Soft-delete the tenant. Terminal.
    pub fn soft_delete(&mut self) {
        let now = Utc::now();
        self.status = TenantStatus::SoftDeleted;
        self.deleted_at = Some(now);
        self.updated_at = now;
    }

    /// Replace the tenant's resolvable addresses.
    ///
    /// # Errors
    ///
    /// Validation only; global uniqueness is the store's responsibility.
    pub fn set_domains(
        &mut self,
        subdomain: &str,
        custom_domain: Option<&str>,
    ) -> Result<(), TenantError> {
        self.subdomain = normalize_subdomain(subdomain)?;
        self.custom_domain = match custom_domain {
            Some(d) => Some(normalize_domain(d)?),
            None => None,
        };
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Lowercase and validate a subdomain label.
fn normalize_subdomain(s: &str) -> Result<String, TenantError> {
    let s = s.trim().to_ascii_lowercase();
    if s.is_empty()
        || !s
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        || s.starts_with('-')
        || s.ends_with('-')
    {
        return Err(TenantError::InvalidSubdomain(s));
    }
    Ok(s)
}

/// Lowercase and validate a fully-qualified domain.
fn normalize_domain(s: &str) -> Result<String, TenantError> {
    let s = s.trim().to_ascii_lowercase();
    if s.is_empty() || !s.contains('.') || s.contains(['/', ':', ' ']) {
        return Err(TenantError::InvalidDomain(s));
    }
    Ok(s)
}
