//! Tracked Transactions
//!
//! A tracked record remembers a transaction hash that has already been
//! announced. Records carry no invariants beyond existence: the same hash may
//! be stored more than once.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A persisted transaction-hash record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedRecord {
    id: Uuid,
    transaction_hash: String,
    tracked_at: DateTime<Utc>,
}

impl TrackedRecord {
    /// Create a record for `transaction_hash`, stamped now.
    #[must_use]
    pub fn new(transaction_hash: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            transaction_hash: transaction_hash.into(),
            tracked_at: Utc::now(),
        }
    }

    /// Record identity.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Tracked transaction hash.
    #[must_use]
    pub fn transaction_hash(&self) -> &str {
        &self.transaction_hash
    }

    /// When the record was created.
    #[must_use]
    pub const fn tracked_at(&self) -> DateTime<Utc> {
        self.tracked_at
    }
}
