//! Storage layer errors.

use merx_domain::IsolationError;
use merx_policy::PolicyError;
use thiserror::Error;

/// Errors that can occur in the storage layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Entity not found.
    #[error("entity not found: {entity_type} with id {id}")]
    NotFound {
        /// Type of entity (tenant, principal, product, ...).
        entity_type: String,
        /// Entity ID or conflicting key.
        id: String,
    },

    /// Duplicate entity (uniqueness violation).
    #[error("duplicate entity: {entity_type} with key {id}")]
    Duplicate {
        /// Type of entity.
        entity_type: String,
        /// Conflicting key.
        id: String,
    },

    /// Isolation-contract violation. Always fatal, never downgraded.
    #[error("isolation violation: {0}")]
    Isolation(#[from] IsolationError),

    /// Tenant-scoped table with no registered policy (deny-all posture).
    #[error("no policy for table '{table}', operation denied")]
    PolicyMissing {
        /// Offending table.
        table: String,
    },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Database error.
    #[error("database error: {0}")]
    Database(String),

    /// Connection error (transient class).
    #[error("connection error: {0}")]
    Connection(String),
}

impl StoreError {
    /// Create a not found error.
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    /// Create a duplicate error.
    pub fn duplicate(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::Duplicate {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }
}

impl From<PolicyError> for StoreError {
    fn from(err: PolicyError) -> Self {
        match err {
            PolicyError::MissingPolicy { table } => StoreError::PolicyMissing { table },
            other => StoreError::Database(other.to_string()),
        }
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound {
                entity_type: "unknown".to_string(),
                id: "unknown".to_string(),
            },
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Connection(err.to_string())
            }
            sqlx::Error::Database(db_err) => {
                // 23505 unique_violation
                if db_err.code().map(|c| c == "23505").unwrap_or(false) {
                    StoreError::Duplicate {
                        entity_type: "unknown".to_string(),
                        id: "unknown".to_string(),
                    }
                } else {
                    // Keep the SQLSTATE visible so the retry layer can
                    // classify serialization conflicts and deadlocks.
                    match db_err.code() {
                        Some(code) => {
                            StoreError::Database(format!("{code}: {db_err}"))
                        }
                        None => StoreError::Database(db_err.to_string()),
                    }
                }
            }
            _ => StoreError::Database(err.to_string()),
        }
    }
}
