//! Merx Policy Store
//!
//! The declarative set of row-level access rules attached to every
//! tenant-scoped table, plus the bypass rule for platform operators.
//!
//! Two enforcement surfaces consume this registry:
//!
//! - PostgreSQL: the generated DDL (see `migrations/`) installs one
//!   isolation policy per table comparing `tenant_id` to the
//!   transaction-local `merx.tenant_id` setting, and one bypass policy
//!   active only when `merx.bypass` is set. [`verify_policies`] checks at
//!   startup that every registered table actually has both policies
//!   installed, and fails closed otherwise.
//! - The in-memory gateway: [`PolicyRegistry::require`] is consulted
//!   before every operation; a table missing from the registry is treated
//!   as a configuration defect and denied.

#![warn(missing_docs)]
#![warn(clippy::all)]

use thiserror::Error;

/// Transaction-local setting carrying the active tenant.
pub const TENANT_PARAM: &str = "merx.tenant_id";

/// Transaction-local marker enabling the superadmin bypass.
pub const BYPASS_PARAM: &str = "merx.bypass";

/// Value of [`BYPASS_PARAM`] when the bypass is engaged.
pub const BYPASS_ON: &str = "on";

/// Policy configuration errors. All of them fail closed.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// A tenant-scoped table has no policy attached.
    #[error("no isolation policy registered for table '{table}' (deny-all)")]
    MissingPolicy {
        /// Offending table name.
        table: String,
    },

    /// Startup verification found registered tables without installed
    /// database policies.
    #[error("row-level policies missing in database for tables: {tables:?}")]
    Unverified {
        /// Tables lacking installed policies.
        tables: Vec<String>,
    },

    /// Database error during verification.
    #[error("policy verification failed: {0}")]
    Database(String),
}

/// Row-level rule for one tenant-scoped table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TablePolicy {
    /// Table name.
    pub table: &'static str,
    /// Column holding the owning tenant.
    pub tenant_column: &'static str,
}

impl TablePolicy {
    /// The isolation predicate: row tenant equals the transaction-local
    /// tenant setting.
    pub fn isolation_predicate(&self) -> String {
        format!(
            "{} = current_setting('{}')::uuid",
            self.tenant_column, TENANT_PARAM
        )
    }

    /// The bypass predicate, true only under the superadmin marker.
    ///
    /// `current_setting(..., true)` returns NULL instead of erroring when
    /// the marker was never set, so the predicate is false on the default
    /// path.
    pub fn bypass_predicate(&self) -> String {
        format!(
            "current_setting('{}', true) = '{}'",
            BYPASS_PARAM, BYPASS_ON
        )
    }

    /// DDL installing row-level security and both policies for the table.
    pub fn install_sql(&self) -> Vec<String> {
        vec![
            format!("ALTER TABLE {} ENABLE ROW LEVEL SECURITY", self.table),
            format!("ALTER TABLE {} FORCE ROW LEVEL SECURITY", self.table),
            format!(
                "CREATE POLICY tenant_isolation ON {} USING ({}) WITH CHECK ({})",
                self.table,
                self.isolation_predicate(),
                self.isolation_predicate()
            ),
            format!(
                "CREATE POLICY platform_bypass ON {} USING ({})",
                self.table,
                self.bypass_predicate()
            ),
        ]
    }
}

/// Tables carrying a `tenant_id` column. `tenants` itself is
/// platform-level and deliberately absent.
pub const TENANT_SCOPED_TABLES: &[TablePolicy] = &[
    TablePolicy {
        table: "principals",
        tenant_column: "tenant_id",
    },
    TablePolicy {
        table: "refresh_sessions",
        tenant_column: "tenant_id",
    },
    TablePolicy {
        table: "products",
        tenant_column: "tenant_id",
    },
    TablePolicy {
        table: "audit_log",
        tenant_column: "tenant_id",
    },
];

/// The enumerable set of policies. Default posture is deny-all: a table
/// not present here cannot be touched through the gateway.
#[derive(Debug, Clone)]
pub struct PolicyRegistry {
    policies: Vec<TablePolicy>,
}

impl PolicyRegistry {
    /// Registry covering all built-in tenant-scoped tables.
    pub fn builtin() -> Self {
        Self {
            policies: TENANT_SCOPED_TABLES.to_vec(),
        }
    }

    /// Empty registry (every table denied). Test hook.
    pub fn empty() -> Self {
        Self {
            policies: Vec::new(),
        }
    }

    /// Look up the policy for a table.
    pub fn policy_for(&self, table: &str) -> Option<&TablePolicy> {
        self.policies.iter().find(|p| p.table == table)
    }

    /// Require a policy; absence is a configuration defect, not allow-all.
    ///
    /// # Errors
    ///
    /// `PolicyError::MissingPolicy` when no policy is registered.
    pub fn require(&self, table: &str) -> Result<&TablePolicy, PolicyError> {
        self.policy_for(table).ok_or_else(|| PolicyError::MissingPolicy {
            table: table.to_string(),
        })
    }

    /// All registered table names.
    pub fn tables(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.policies.iter().map(|p| p.table)
    }

    /// Full DDL for every registered table, in registry order.
    ///
    /// The RLS migration is generated from this so the registry and the
    /// database cannot drift.
    pub fn install_sql(&self) -> Vec<String> {
        self.policies.iter().flat_map(|p| p.install_sql()).collect()
    }
}

#[cfg(feature = "postgres")]
mod verify {
    use super::{PolicyError, PolicyRegistry};
    use sqlx::{PgPool, Row};

    /// Verify at startup that every registered table has both the
    /// isolation and bypass policies installed.
    ///
    /// # Errors
    ///
    /// `PolicyError::Unverified` listing the offending tables; the caller
    /// must refuse to serve (fail closed), never proceed default-allow.
    pub async fn verify_policies(
        pool: &PgPool,
        registry: &PolicyRegistry,
    ) -> Result<(), PolicyError> {
        let rows = sqlx::query(
            r#"
            SELECT tablename, policyname
            FROM pg_policies
            WHERE schemaname = current_schema()
            "#,
        )
        .fetch_all(pool)
        .await
        .map_err(|e| PolicyError::Database(e.to_string()))?;

        let installed: Vec<(String, String)> = rows
            .iter()
            .map(|r| (r.get::<String, _>("tablename"), r.get::<String, _>("policyname")))
            .collect();

        let mut missing = Vec::new();
        for table in registry.tables() {
            let has_isolation = installed
                .iter()
                .any(|(t, p)| t == table && p == "tenant_isolation");
            let has_bypass = installed
                .iter()
                .any(|(t, p)| t == table && p == "platform_bypass");
            if !has_isolation || !has_bypass {
                missing.push(table.to_string());
            }
        }

        if missing.is_empty() {
            tracing::info!(
                tables = registry.tables().count(),
                "row-level policies verified"
            );
            Ok(())
        } else {
            Err(PolicyError::Unverified { tables: missing })
        }
    }
}

#[cfg(feature = "postgres")]
pub use verify::verify_policies;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_covers_every_tenant_scoped_table() {
        let registry = PolicyRegistry::builtin();
        for expected in ["principals", "refresh_sessions", "products", "audit_log"] {
            assert!(
                registry.require(expected).is_ok(),
                "missing policy for {expected}"
            );
        }
    }

    #[test]
    fn tenants_table_is_not_tenant_scoped() {
        let registry = PolicyRegistry::builtin();
        assert!(registry.policy_for("tenants").is_none());
    }

    #[test]
    fn unregistered_table_fails_closed() {
        let registry = PolicyRegistry::builtin();
        let err = registry.require("orders").unwrap_err();
        assert!(matches!(err, PolicyError::MissingPolicy { table } if table == "orders"));
    }

    #[test]
    fn isolation_predicate_uses_transaction_local_setting() {
        let policy = PolicyRegistry::builtin();
        let products = policy.require("products").unwrap();
        assert_eq!(
            products.isolation_predicate(),
            "tenant_id = current_setting('merx.tenant_id')::uuid"
        );
    }

    #[test]
    fn bypass_predicate_is_null_safe() {
        let policy = PolicyRegistry::builtin();
        let products = policy.require("products").unwrap();
        // The second argument to current_setting suppresses the error when
        // the marker is absent, keeping the default path deny.
        assert_eq!(
            products.bypass_predicate(),
            "current_setting('merx.bypass', true) = 'on'"
        );
    }

    #[test]
    fn install_sql_enables_and_forces_rls() {
        let sql = PolicyRegistry::builtin().install_sql();
        assert!(sql
            .iter()
            .any(|s| s == "ALTER TABLE products ENABLE ROW LEVEL SECURITY"));
        assert!(sql
            .iter()
            .any(|s| s == "ALTER TABLE products FORCE ROW LEVEL SECURITY"));
        assert!(sql.iter().any(|s| s.starts_with("CREATE POLICY tenant_isolation ON audit_log")));
    }

    #[test]
    fn empty_registry_denies_everything() {
        let registry = PolicyRegistry::empty();
        assert!(registry.require("products").is_err());
        assert_eq!(registry.tables().count(), 0);
    }
}
