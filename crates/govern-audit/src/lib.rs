//! Govern Audit: durable storage for run records
//!
//! Every run ends in exactly one record. Sinks are keyed by run id and
//! idempotent: writing the same id twice merges instead of duplicating.

pub mod file;
pub mod memory;
pub mod retry;
pub mod sink;

pub use file::FileAuditSink;
pub use memory::MemoryAuditSink;
pub use retry::{persist_with_retry, RetryPolicy};
pub use sink::{merge_records, validate_run_id, AuditError, AuditSink, AuditStats};

#[cfg(test)]
pub(crate) mod test_support {
    use crate::{AuditError, AuditSink, MemoryAuditSink};
    use async_trait::async_trait;
    use chrono::Utc;
    use govern_core::{Outcome, RunContext, RunMode, RunRecord};
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    pub fn record(run_id: &str, outcome: Outcome) -> RunRecord {
        RunRecord {
            run_id: run_id.to_string(),
            pipeline_id: "intent→plan→execute@1.0.0".to_string(),
            mode: RunMode::Validated,
            context: RunContext::new(run_id, RunMode::Validated, json!({"goal": "test"})),
            verdict: None,
            outcome,
            duration_ms: 12,
            error: None,
            supersedes: None,
            completed_at: Utc::now(),
        }
    }

    /// Fails the first `n` writes, then delegates to memory
    pub struct FlakySink {
        pub inner: MemoryAuditSink,
        remaining_failures: AtomicU32,
    }

    impl FlakySink {
        pub fn failing_first(n: u32) -> Self {
            Self {
                inner: MemoryAuditSink::new(),
                remaining_failures: AtomicU32::new(n),
            }
        }

        pub fn always_failing() -> Self {
            Self::failing_first(u32::MAX)
        }
    }

    #[async_trait]
    impl AuditSink for FlakySink {
        async fn put(&self, record: &RunRecord) -> Result<(), AuditError> {
            let left = self.remaining_failures.load(Ordering::SeqCst);
            if left > 0 {
                self.remaining_failures.store(left - 1, Ordering::SeqCst);
                return Err(AuditError::Unavailable("store offline".to_string()));
            }
            self.inner.put(record).await
        }

        async fn get(&self, run_id: &str) -> Result<Option<RunRecord>, AuditError> {
            self.inner.get(run_id).await
        }

        async fn list(&self) -> Result<Vec<RunRecord>, AuditError> {
            self.inner.list().await
        }
    }
}
