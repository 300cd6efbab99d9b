//! File-backed audit sink
//!
//! One JSON document per run (`<dir>/<run_id>.json`). Writes go to a
//! temp file in the same directory and are renamed into place.

use crate::sink::{merge_records, validate_run_id, AuditError, AuditSink};
use async_trait::async_trait;
use govern_core::RunRecord;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug)]
pub struct FileAuditSink {
    dir: PathBuf,
    // serializes read-merge-write cycles within this process
    write_lock: Mutex<()>,
}

impl FileAuditSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Create the directory if needed
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, AuditError> {
        let sink = Self::new(dir);
        fs::create_dir_all(&sink.dir).await?;
        Ok(sink)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, run_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", run_id))
    }

    async fn read_record(path: &Path) -> Result<Option<RunRecord>, AuditError> {
        match fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), AuditError> {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent).await?;

        let tmp = parent.join(format!(".{}.tmp", uuid::Uuid::new_v4()));
        fs::write(&tmp, bytes).await?;
        if let Err(e) = fs::rename(&tmp, path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

#[async_trait]
impl AuditSink for FileAuditSink {
    async fn put(&self, record: &RunRecord) -> Result<(), AuditError> {
        validate_run_id(&record.run_id)?;
        let _guard = self.write_lock.lock().await;

        let path = self.record_path(&record.run_id);
        let stored = match Self::read_record(&path).await? {
            Some(existing) => merge_records(&existing, record)?,
            None => record.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&stored)?;
        Self::atomic_write(&path, &bytes).await?;

        debug!(run_id = %record.run_id, path = %path.display(), "Record written");
        Ok(())
    }

    async fn get(&self, run_id: &str) -> Result<Option<RunRecord>, AuditError> {
        validate_run_id(run_id)?;
        Self::read_record(&self.record_path(run_id)).await
    }

    async fn list(&self) -> Result<Vec<RunRecord>, AuditError> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_record = path.extension().is_some_and(|ext| ext == "json")
                && !path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with('.'));
            if !is_record {
                continue;
            }
            match Self::read_record(&path).await {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable record"),
            }
        }

        records.sort_by(|a, b| a.completed_at.cmp(&b.completed_at));
        Ok(records)
    }
}
