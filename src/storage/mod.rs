//! Analysis Storage Module
//!
//! Persists completed Analysis records to sled so reports survive restarts
//! and can be queried per fermentation lot.

use crate::types::Analysis;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// Error type for storage operations
#[derive(Debug)]
pub enum StorageError {
    DatabaseError(String),
    SerializationError(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::DatabaseError(msg) => write!(f, "Database error: {}", msg),
            StorageError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        StorageError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::SerializationError(err.to_string())
    }
}

/// Durable store for completed analyses
#[derive(Clone)]
pub struct AnalysisStorage {
    db: Arc<sled::Db>,
}

impl AnalysisStorage {
    /// Open or create the analysis storage at the specified path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Open an in-memory database (tests, demo mode)
    pub fn open_temporary() -> Result<Self, StorageError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Store a completed analysis.
    ///
    /// Key: fermentation UUID bytes followed by the analysis timestamp as
    /// u64 big-endian millis, so all analyses of one lot are contiguous
    /// and sorted chronologically within the lot.
    /// Value: JSON-serialized Analysis
    ///
    /// Note: Does not call flush() on each write for performance. Sled
    /// provides durability via background flushing; on crash at most the
    /// last few writes may be lost, and an analysis can be re-run.
    pub fn store(&self, analysis: &Analysis) -> Result<(), StorageError> {
        let key = Self::key(analysis.fermentation_id, analysis.analyzed_at.timestamp_millis());
        let value = serde_json::to_vec(analysis)?;
        self.db.insert(key, value)?;
        Ok(())
    }

    /// Get the most recent N analyses for one fermentation lot (newest first)
    pub fn recent_for_fermentation(&self, fermentation_id: Uuid, limit: usize) -> Vec<Analysis> {
        let prefix = fermentation_id.as_bytes().to_vec();
        let mut analyses = Vec::with_capacity(limit);

        for item in self.db.scan_prefix(&prefix).rev() {
            if analyses.len() >= limit {
                break;
            }

            if let Ok((_key, value)) = item {
                if let Ok(analysis) = serde_json::from_slice::<Analysis>(&value) {
                    analyses.push(analysis);
                }
            }
        }

        analyses
    }

    /// Get the latest analysis for one fermentation lot, if any
    pub fn latest_for_fermentation(&self, fermentation_id: Uuid) -> Option<Analysis> {
        self.recent_for_fermentation(fermentation_id, 1).into_iter().next()
    }

    /// Get total number of stored analyses
    pub fn count(&self) -> usize {
        self.db.len()
    }

    /// Get database size in bytes
    pub fn size_bytes(&self) -> u64 {
        self.db.size_on_disk().unwrap_or(0)
    }

    /// Clear all analyses
    pub fn clear(&self) -> Result<(), StorageError> {
        self.db.clear()?;
        self.db.flush()?;
        Ok(())
    }

    fn key(fermentation_id: Uuid, timestamp_millis: i64) -> [u8; 24] {
        let mut key = [0u8; 24];
        key[..16].copy_from_slice(fermentation_id.as_bytes());
        key[16..].copy_from_slice(&(timestamp_millis.max(0) as u64).to_be_bytes());
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn make_analysis(fermentation_id: Uuid, offset_mins: i64) -> Analysis {
        let mut a = Analysis::new(fermentation_id, Uuid::new_v4());
        a.analyzed_at = Utc::now() + Duration::minutes(offset_mins);
        a
    }

    #[test]
    fn store_and_retrieve_newest_first() {
        let storage = AnalysisStorage::open_temporary().expect("temp db");
        let lot = Uuid::new_v4();

        for i in 0..5 {
            storage.store(&make_analysis(lot, i)).expect("store");
        }

        let recent = storage.recent_for_fermentation(lot, 3);
        assert_eq!(recent.len(), 3);
        assert!(recent[0].analyzed_at > recent[1].analyzed_at);
        assert!(recent[1].analyzed_at > recent[2].analyzed_at);
    }

    #[test]
    fn lots_do_not_leak_into_each_other() {
        let storage = AnalysisStorage::open_temporary().expect("temp db");
        let lot_a = Uuid::new_v4();
        let lot_b = Uuid::new_v4();

        storage.store(&make_analysis(lot_a, 0)).expect("store");
        storage.store(&make_analysis(lot_b, 0)).expect("store");
        storage.store(&make_analysis(lot_b, 1)).expect("store");

        assert_eq!(storage.recent_for_fermentation(lot_a, 10).len(), 1);
        assert_eq!(storage.recent_for_fermentation(lot_b, 10).len(), 2);
        assert_eq!(storage.count(), 3);
    }

    #[test]
    fn latest_returns_none_for_unknown_lot() {
        let storage = AnalysisStorage::open_temporary().expect("temp db");
        assert!(storage.latest_for_fermentation(Uuid::new_v4()).is_none());
    }
}
