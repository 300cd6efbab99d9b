//! Run Context: append-only state threaded through one pipeline run
use crate::data_model::{RunMode, RunRequest};
use crate::stage::{StageError, StageOutput};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ContextError {
    #[error("CONTEXT/DUPLICATE: stage '{0}' already wrote its output")]
    AlreadyWritten(String),

    #[error("CONTEXT/METADATA: key '{0}' is already set")]
    MetadataExists(String),

    #[error("CONTEXT/HASH: {0}")]
    Unhashable(String),
}

fn hash_json<T: Serialize>(value: &T) -> Result<String, ContextError> {
    let bytes = serde_json::to_vec(value).map_err(|e| ContextError::Unhashable(e.to_string()))?;
    Ok(crate::hash_bytes(&bytes))
}

/// One stage's contribution, with hashes of the context before and the output after
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub stage: String,
    pub output: StageOutput,
    pub in_hash: String,
    pub out_hash: String,
    pub latency_ms: u64,
    pub deterministic: bool,
}

/// Accumulating record of one run. Owned by a single orchestrator call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunContext {
    pub run_id: String,
    pub mode: RunMode,
    pub started_at: DateTime<Utc>,
    pub input: Value,
    #[serde(default)]
    metadata: BTreeMap<String, Value>,
    #[serde(default)]
    entries: Vec<ContextEntry>,
}

impl RunContext {
    pub fn new(run_id: impl Into<String>, mode: RunMode, input: Value) -> Self {
        Self {
            run_id: run_id.into(),
            mode,
            started_at: Utc::now(),
            input,
            metadata: BTreeMap::new(),
            entries: Vec::new(),
        }
    }

    pub fn from_request(request: &RunRequest) -> Self {
        Self::new(request.run_id.clone(), request.mode, request.input.clone())
    }

    /// Output written by `stage`, if that stage already ran
    pub fn get(&self, stage: &str) -> Option<&StageOutput> {
        self.entries
            .iter()
            .find(|e| e.stage == stage)
            .map(|e| &e.output)
    }

    pub fn payload(&self, stage: &str) -> Option<&Value> {
        self.get(stage).map(|o| &o.payload)
    }

    /// Like [`get`](Self::get) but fails the calling stage when the entry is absent
    pub fn require(&self, stage: &str) -> Result<&StageOutput, StageError> {
        self.get(stage).ok_or_else(|| StageError::MissingInput {
            key: stage.to_string(),
        })
    }

    pub fn contains(&self, stage: &str) -> bool {
        self.entries.iter().any(|e| e.stage == stage)
    }

    pub fn entries(&self) -> &[ContextEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&ContextEntry> {
        self.entries.last()
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.stage.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn metadata(&self) -> &BTreeMap<String, Value> {
        &self.metadata
    }

    /// Appends a stage's output. A name can be written only once.
    pub fn append(
        &mut self,
        stage: &str,
        output: StageOutput,
        latency_ms: u64,
        deterministic: bool,
    ) -> Result<&ContextEntry, ContextError> {
        if self.contains(stage) {
            return Err(ContextError::AlreadyWritten(stage.to_string()));
        }

        let in_hash = self.digest()?;
        let out_hash = hash_json(&output)?;

        self.entries.push(ContextEntry {
            stage: stage.to_string(),
            output,
            in_hash,
            out_hash,
            latency_ms,
            deterministic,
        });

        Ok(&self.entries[self.entries.len() - 1])
    }

    /// Sets a metadata key once
    pub fn annotate(&mut self, key: impl Into<String>, value: Value) -> Result<(), ContextError> {
        let key = key.into();
        if self.metadata.contains_key(&key) {
            return Err(ContextError::MetadataExists(key));
        }
        self.metadata.insert(key, value);
        Ok(())
    }

    /// Digest of the whole context as it stands
    pub fn digest(&self) -> Result<String, ContextError> {
        hash_json(self)
    }
}
