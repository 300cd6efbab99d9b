//! Audit sink contract and record merging

use async_trait::async_trait;
use govern_core::{GovernError, Outcome, RunRecord};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("AUDIT/IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("AUDIT/SERIALIZE: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("AUDIT/RUN_ID: '{0}' is not a valid record key")]
    InvalidRunId(String),

    #[error("AUDIT/UNAVAILABLE: {0}")]
    Unavailable(String),
}

impl AuditError {
    /// Whether retrying the same write could succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, AuditError::Io(_) | AuditError::Unavailable(_))
    }
}

impl From<AuditError> for GovernError {
    fn from(err: AuditError) -> Self {
        GovernError::PersistenceFailure {
            run_id: "audit".to_string(),
            attempts: 1,
            reason: err.to_string(),
        }
    }
}

/// Durable store for run records, keyed by run id
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Store a record. Re-submitting a run id merges into the existing record.
    async fn put(&self, record: &RunRecord) -> Result<(), AuditError>;

    async fn get(&self, run_id: &str) -> Result<Option<RunRecord>, AuditError>;

    async fn list(&self) -> Result<Vec<RunRecord>, AuditError>;
}

/// Merge `incoming` over `existing`: incoming fields win, fields it omits are kept
pub fn merge_records(existing: &RunRecord, incoming: &RunRecord) -> Result<RunRecord, AuditError> {
    let mut base = serde_json::to_value(existing)?;
    merge_json(&mut base, serde_json::to_value(incoming)?);
    Ok(serde_json::from_value(base)?)
}

fn merge_json(base: &mut Value, incoming: Value) {
    match (base, incoming) {
        (Value::Object(base), Value::Object(incoming)) => {
            for (key, value) in incoming {
                match base.get_mut(&key) {
                    Some(slot) if slot.is_object() && value.is_object() => merge_json(slot, value),
                    _ => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, incoming) => *base = incoming,
    }
}

/// Record keys become file names, so keep them to a safe alphabet
pub fn validate_run_id(run_id: &str) -> Result<(), AuditError> {
    let valid = !run_id.is_empty()
        && run_id.len() <= 128
        && run_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(AuditError::InvalidRunId(run_id.to_string()))
    }
}

/// Statistics about stored records
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditStats {
    pub total: usize,
    pub approved: usize,
    pub review: usize,
    pub rejected: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub fallback_verdicts: usize,
    pub rejection_rate: f64,
}

impl AuditStats {
    pub fn from_records(records: &[RunRecord]) -> Self {
        let mut stats = AuditStats {
            total: records.len(),
            ..Default::default()
        };
        for record in records {
            match record.outcome {
                Outcome::Approved => stats.approved += 1,
                Outcome::Review => stats.review += 1,
                Outcome::Rejected => stats.rejected += 1,
                Outcome::Failed { .. } => stats.failed += 1,
                Outcome::Cancelled { .. } => stats.cancelled += 1,
            }
            if record.verdict.as_ref().is_some_and(|v| !v.is_authoritative()) {
                stats.fallback_verdicts += 1;
            }
        }
        stats.rejection_rate = if stats.total > 0 {
            stats.rejected as f64 / stats.total as f64
        } else {
            0.0
        };
        stats
    }
}
