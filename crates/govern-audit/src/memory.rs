//! In-memory audit sink

use crate::sink::{merge_records, validate_run_id, AuditError, AuditSink};
use async_trait::async_trait;
use govern_core::RunRecord;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// Keeps records in a map; nothing survives the process
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: RwLock<HashMap<String, RunRecord>>,
    writes: AtomicUsize,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `put` calls
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn put(&self, record: &RunRecord) -> Result<(), AuditError> {
        validate_run_id(&record.run_id)?;
        let mut records = self.records.write().await;
        let stored = match records.get(&record.run_id) {
            Some(existing) => merge_records(existing, record)?,
            None => record.clone(),
        };
        records.insert(record.run_id.clone(), stored);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get(&self, run_id: &str) -> Result<Option<RunRecord>, AuditError> {
        Ok(self.records.read().await.get(run_id).cloned())
    }

    async fn list(&self) -> Result<Vec<RunRecord>, AuditError> {
        let mut records: Vec<_> = self.records.read().await.values().cloned().collect();
        records.sort_by(|a, b| a.completed_at.cmp(&b.completed_at));
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::record;
    use govern_core::Outcome;

    #[tokio::test]
    async fn test_put_is_idempotent_per_run_id() {
        let sink = MemoryAuditSink::new();
        let rec = record("run-1", Outcome::Approved);

        sink.put(&rec).await.unwrap();
        sink.put(&rec).await.unwrap();

        assert_eq!(sink.len().await, 1);
        assert_eq!(sink.writes(), 2);
        assert_eq!(sink.get("run-1").await.unwrap(), Some(rec));
    }

    #[tokio::test]
    async fn test_get_missing() {
        let sink = MemoryAuditSink::new();
        assert!(sink.get("nope").await.unwrap().is_none());
        assert!(sink.is_empty().await);
    }

    #[tokio::test]
    async fn test_rejects_unsafe_run_id() {
        let sink = MemoryAuditSink::new();
        let err = sink.put(&record("../x", Outcome::Approved)).await.unwrap_err();
        assert!(matches!(err, AuditError::InvalidRunId(_)));
        assert!(!err.is_transient());
    }
}
