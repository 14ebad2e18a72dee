//! Append-only audit entries.
//!
//! Every gateway write emits one entry as a side effect. Entries are never
//! updated or deleted, and before/after diffs never contain secrets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::principal::PrincipalId;
use crate::tenant::TenantId;

/// Fields stripped from before/after snapshots before they are recorded.
const REDACTED_FIELDS: &[&str] = &["password_hash", "token_hash", "password", "secret"];

/// What happened to the entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Row created.
    Create,
    /// Row updated.
    Update,
    /// Row soft-deleted.
    SoftDelete,
    /// Tenant suspended.
    Suspend,
    /// Tenant re-activated.
    Activate,
    /// Credential revoked.
    Revoke,
}

impl AuditAction {
    /// Stable string form used in storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "create",
            AuditAction::Update => "update",
            AuditAction::SoftDelete => "soft_delete",
            AuditAction::Suspend => "suspend",
            AuditAction::Activate => "activate",
            AuditAction::Revoke => "revoke",
        }
    }
}

/// One immutable audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Entry identity.
    pub id: Uuid,
    /// Tenant whose data was touched.
    pub tenant_id: TenantId,
    /// Acting principal, when known (None for system actions).
    pub principal_id: Option<PrincipalId>,
    /// Action performed.
    pub action: AuditAction,
    /// Entity type label (e.g. "product", "tenant").
    pub entity_type: String,
    /// Entity identifier.
    pub entity_id: String,
    /// Snapshot before the change, secrets redacted.
    pub before: Option<Value>,
    /// Snapshot after the change, secrets redacted.
    pub after: Option<Value>,
    /// When the change happened.
    pub occurred_at: DateTime<Utc>,
}

impl AuditEntry {
    /// Build an entry, redacting secret fields from both snapshots.
    pub fn new(
        tenant_id: TenantId,
        principal_id: Option<PrincipalId>,
        action: AuditAction,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        before: Option<Value>,
        after: Option<Value>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            tenant_id,
            principal_id,
            action,
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            before: before.map(redacted),
            after: after.map(redacted),
            occurred_at: Utc::now(),
        }
    }
}

/// Strip secret fields from a JSON snapshot, recursively.
fn redacted(mut value: Value) -> Value {
    redact_in_place(&mut value);
    value
}

fn redact_in_place(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for field in REDACTED_FIELDS {
                map.remove(*field);
            }
            for (_, v) in map.iter_mut() {
                redact_in_place(v);
            }
        }
        Value::Array(items) => {
            for v in items.iter_mut() {
                redact_in_place(v);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn secrets_are_redacted_from_snapshots() {
        let entry = AuditEntry::new(
            Uuid::now_v7(),
            None,
            AuditAction::Update,
            "principal",
            "p1",
            Some(json!({"email": "a@b.c", "password_hash": "$argon2id$..."})),
            Some(json!({"email": "a@b.c", "nested": {"token_hash": "deadbeef"}})),
        );

        let before = entry.before.unwrap();
        assert!(before.get("password_hash").is_none());
        assert_eq!(before["email"], "a@b.c");

        let after = entry.after.unwrap();
        assert!(after["nested"].get("token_hash").is_none());
    }

    #[test]
    fn action_strings_are_stable() {
        assert_eq!(AuditAction::Create.as_str(), "create");
        assert_eq!(AuditAction::SoftDelete.as_str(), "soft_delete");
    }
}
