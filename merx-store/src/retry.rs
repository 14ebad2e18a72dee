//! Read retry policy.
//!
//! Transient failures (connection loss, serialization conflict, deadlock)
//! are retried on read paths only. Writes are never retried; a write whose
//! outcome is unknown must surface to the caller rather than execute
//! twice.

use std::time::Duration;

use crate::error::StoreError;

/// Retry policy for read operations.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay between attempts.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(50),
        }
    }
}

impl RetryPolicy {
    /// Policy with a configured attempt count.
    pub fn with_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }
}

/// Whether an error belongs to the transient class worth retrying.
///
/// Serialization failure (40001) and deadlock (40P01) surface as database
/// errors carrying their SQLSTATE in the message.
pub fn is_transient(err: &StoreError) -> bool {
    match err {
        StoreError::Connection(_) => true,
        StoreError::Database(msg) => msg.contains("40001") || msg.contains("40P01"),
        _ => false,
    }
}
