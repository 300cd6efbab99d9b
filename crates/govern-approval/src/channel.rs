//! Approval channel contract and in-memory queue

use crate::ticket::{ApprovalError, ApprovalTicket, Resolution};
use async_trait::async_trait;
use govern_core::RunRecord;
use std::collections::BTreeMap;
use tokio::sync::Mutex;
use tracing::info;

/// Hand-off point between REVIEW runs and the humans who decide them
#[async_trait]
pub trait ApprovalChannel: Send + Sync {
    /// Queue a REVIEW record. Submitting a run id twice returns the existing ticket.
    async fn submit(&self, record: &RunRecord) -> Result<ApprovalTicket, ApprovalError>;

    async fn decide(&self, resolution: &Resolution) -> Result<ApprovalTicket, ApprovalError>;

    async fn pending(&self) -> Result<Vec<ApprovalTicket>, ApprovalError>;

    async fn get(&self, run_id: &str) -> Result<Option<ApprovalTicket>, ApprovalError>;
}

pub(crate) fn validate_run_id(run_id: &str) -> Result<(), ApprovalError> {
    let valid = !run_id.is_empty()
        && run_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ApprovalError::InvalidRunId(run_id.to_string()))
    }
}

pub(crate) fn sort_by_queue_time(tickets: &mut [ApprovalTicket]) {
    tickets.sort_by(|a, b| a.queued_at.cmp(&b.queued_at).then_with(|| a.run_id.cmp(&b.run_id)));
}

#[derive(Debug, Default)]
pub struct MemoryApprovalQueue {
    tickets: Mutex<BTreeMap<String, ApprovalTicket>>,
}

impl MemoryApprovalQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ApprovalChannel for MemoryApprovalQueue {
    async fn submit(&self, record: &RunRecord) -> Result<ApprovalTicket, ApprovalError> {
        validate_run_id(&record.run_id)?;
        let mut tickets = self.tickets.lock().await;
        if let Some(existing) = tickets.get(&record.run_id) {
            return Ok(existing.clone());
        }
        let ticket = ApprovalTicket::from_record(record)?;
        tickets.insert(ticket.run_id.clone(), ticket.clone());
        info!(run_id = %ticket.run_id, "Run queued for approval");
        Ok(ticket)
    }

    async fn decide(&self, resolution: &Resolution) -> Result<ApprovalTicket, ApprovalError> {
        let mut tickets = self.tickets.lock().await;
        let ticket = tickets
            .get_mut(&resolution.run_id)
            .ok_or_else(|| ApprovalError::NotFound(resolution.run_id.clone()))?;
        ticket.apply(resolution)?;
        info!(
            run_id = %resolution.run_id,
            decision = %resolution.decision,
            actor = %resolution.actor,
            "Approval decided"
        );
        Ok(ticket.clone())
    }

    async fn pending(&self) -> Result<Vec<ApprovalTicket>, ApprovalError> {
        let mut pending: Vec<_> = self
            .tickets
            .lock()
            .await
            .values()
            .filter(|t| t.is_pending())
            .cloned()
            .collect();
        sort_by_queue_time(&mut pending);
        Ok(pending)
    }

    async fn get(&self, run_id: &str) -> Result<Option<ApprovalTicket>, ApprovalError> {
        Ok(self.tickets.lock().await.get(run_id).cloned())
    }
}
