//! File-backed approval queue
//!
//! # Storage Format
//!
//! ```text
//! <dir>/
//! ├── {run_id_1}.json
//! ├── {run_id_2}.json
//! └── ...
//! ```
//!
//! Tickets survive restarts, so the CLI can decide runs queued by an
//! earlier process.

use crate::channel::{sort_by_queue_time, validate_run_id, ApprovalChannel};
use crate::ticket::{ApprovalError, ApprovalTicket, Resolution};
use async_trait::async_trait;
use govern_core::RunRecord;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug)]
pub struct FileApprovalQueue {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl FileApprovalQueue {
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, ApprovalError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn ticket_path(&self, run_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", run_id))
    }

    async fn load(&self, run_id: &str) -> Result<Option<ApprovalTicket>, ApprovalError> {
        match fs::read(self.ticket_path(run_id)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, ticket: &ApprovalTicket) -> Result<(), ApprovalError> {
        let path = self.ticket_path(&ticket.run_id);
        let json = serde_json::to_vec_pretty(ticket)?;

        let tmp = self.dir.join(format!(".tmp_{}", uuid::Uuid::new_v4()));
        fs::write(&tmp, &json).await?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        debug!(run_id = %ticket.run_id, path = %path.display(), "Saved ticket");
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<ApprovalTicket>, ApprovalError> {
        let mut tickets = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            let bytes = fs::read(&path).await?;
            match serde_json::from_slice::<ApprovalTicket>(&bytes) {
                Ok(ticket) => tickets.push(ticket),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable ticket"),
            }
        }
        Ok(tickets)
    }
}

#[async_trait]
impl ApprovalChannel for FileApprovalQueue {
    async fn submit(&self, record: &RunRecord) -> Result<ApprovalTicket, ApprovalError> {
        validate_run_id(&record.run_id)?;
        let _guard = self.lock.lock().await;
        if let Some(existing) = self.load(&record.run_id).await? {
            return Ok(existing);
        }
        let ticket = ApprovalTicket::from_record(record)?;
        self.save(&ticket).await?;
        info!(run_id = %ticket.run_id, dir = %self.dir.display(), "Run queued for approval");
        Ok(ticket)
    }

    async fn decide(&self, resolution: &Resolution) -> Result<ApprovalTicket, ApprovalError> {
        validate_run_id(&resolution.run_id)?;
        let _guard = self.lock.lock().await;
        let mut ticket = self
            .load(&resolution.run_id)
            .await?
            .ok_or_else(|| ApprovalError::NotFound(resolution.run_id.clone()))?;
        ticket.apply(resolution)?;
        self.save(&ticket).await?;
        info!(
            run_id = %resolution.run_id,
            decision = %resolution.decision,
            actor = %resolution.actor,
            "Approval decided"
        );
        Ok(ticket)
    }

    async fn pending(&self) -> Result<Vec<ApprovalTicket>, ApprovalError> {
        let mut pending: Vec<_> = self
            .load_all()
            .await?
            .into_iter()
            .filter(|t| t.is_pending())
            .collect();
        sort_by_queue_time(&mut pending);
        Ok(pending)
    }

    async fn get(&self, run_id: &str) -> Result<Option<ApprovalTicket>, ApprovalError> {
        validate_run_id(run_id)?;
        self.load(run_id).await
    }
}
