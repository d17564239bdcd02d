//! Tracked Record Port (Driven Port)
//!
//! Interface for persisting tracked transaction hashes.

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::domain::tracking::TrackedRecord;

/// Tracked record storage error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrackingError {
    /// The backing store could not be reached.
    #[error("tracked record store unavailable: {0}")]
    Unavailable(String),
}

/// Port for tracked record persistence.
#[async_trait]
pub trait TrackedRecordStore: Send + Sync {
    /// Store a new record for `transaction_hash`.
    async fn create(&self, transaction_hash: &str) -> Result<TrackedRecord, TrackingError>;

    /// Find the first record for `transaction_hash`.
    async fn find_by_hash(
        &self,
        transaction_hash: &str,
    ) -> Result<Option<TrackedRecord>, TrackingError>;

    /// Delete every record for `transaction_hash`, returning how many were removed.
    async fn delete_by_hash(&self, transaction_hash: &str) -> Result<usize, TrackingError>;

    /// All stored records, oldest first.
    async fn list(&self) -> Result<Vec<TrackedRecord>, TrackingError>;
}

/// In-memory implementation.
#[derive(Debug, Default)]
pub struct InMemoryTrackedRecordStore {
    records: RwLock<Vec<TrackedRecord>>,
}

impl InMemoryTrackedRecordStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TrackedRecordStore for InMemoryTrackedRecordStore {
    async fn create(&self, transaction_hash: &str) -> Result<TrackedRecord, TrackingError> {
        let record = TrackedRecord::new(transaction_hash);
        self.records.write().push(record.clone());
        Ok(record)
    }

    async fn find_by_hash(
        &self,
        transaction_hash: &str,
    ) -> Result<Option<TrackedRecord>, TrackingError> {
        Ok(self
            .records
            .read()
            .iter()
            .find(|r| r.transaction_hash() == transaction_hash)
            .cloned())
    }

    async fn delete_by_hash(&self, transaction_hash: &str) -> Result<usize, TrackingError> {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|r| r.transaction_hash() != transaction_hash);
        Ok(before - records.len())
    }

    async fn list(&self) -> Result<Vec<TrackedRecord>, TrackingError> {
        Ok(self.records.read().clone())
    }
}
