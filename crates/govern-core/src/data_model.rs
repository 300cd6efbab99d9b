//! Data Model: RunRequest, RunRecord, Outcome
use crate::context::RunContext;
use crate::verdict::{Disposition, Verdict};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// How far a run's results may reach
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunMode {
    /// Simulate only; can never auto-approve
    DryRun,
    /// Validate without live effects
    Validated,
    /// Results may be acted upon
    Live,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::DryRun => "DRY_RUN",
            RunMode::Validated => "VALIDATED",
            RunMode::Live => "LIVE",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "dry-run" | "dryrun" => Ok(RunMode::DryRun),
            "validated" => Ok(RunMode::Validated),
            "live" => Ok(RunMode::Live),
            other => Err(format!("unknown run mode '{}'", other)),
        }
    }
}

/// A request to execute the pipeline once
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    /// Fresh id per request; re-running means a new request
    pub run_id: String,
    pub mode: RunMode,
    /// Input parameters, read by the first stages
    pub input: serde_json::Value,
    pub submitted_at: DateTime<Utc>,
    /// Run id of an earlier record this request corrects
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supersedes: Option<String>,
}

impl RunRequest {
    pub fn new(mode: RunMode, input: serde_json::Value) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            mode,
            input,
            submitted_at: Utc::now(),
            supersedes: None,
        }
    }

    pub fn superseding(mut self, run_id: impl Into<String>) -> Self {
        self.supersedes = Some(run_id.into());
        self
    }
}

/// Terminal classification of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Approved,
    Review,
    Rejected,
    Failed { reason: String },
    Cancelled { reason: String },
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Approved => "APPROVED",
            Outcome::Review => "REVIEW",
            Outcome::Rejected => "REJECTED",
            Outcome::Failed { .. } => "FAILED",
            Outcome::Cancelled { .. } => "CANCELLED",
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed { .. })
    }

    /// Runs awaiting a human decision
    pub fn awaits_approval(&self) -> bool {
        matches!(self, Outcome::Review)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Outcome::Failed { reason } | Outcome::Cancelled { reason } => Some(reason),
            _ => None,
        }
    }
}

impl From<Disposition> for Outcome {
    fn from(disposition: Disposition) -> Self {
        match disposition {
            Disposition::Approved => Outcome::Approved,
            Disposition::Review => Outcome::Review,
            Disposition::Rejected => Outcome::Rejected,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.reason() {
            Some(reason) => write!(f, "{}({})", self.label(), reason),
            None => write!(f, "{}", self.label()),
        }
    }
}

/// Immutable artifact persisted once per run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub pipeline_id: String,
    pub mode: RunMode,
    pub context: RunContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
    pub outcome: Outcome,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supersedes: Option<String>,
    pub completed_at: DateTime<Utc>,
}

impl RunRecord {
    /// Confidence the record was issued with, if a verdict exists
    pub fn confidence(&self) -> Option<f64> {
        self.verdict.as_ref().map(|v| v.confidence)
    }
}

/// Whether the run record reached the audit sink
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PersistenceStatus {
    Persisted { attempts: u32 },
    NotPersisted { attempts: u32, reason: String },
}

/// What the orchestrator hands back to its caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub record: RunRecord,
    pub persistence: PersistenceStatus,
}

impl RunReport {
    pub fn is_persisted(&self) -> bool {
        matches!(self.persistence, PersistenceStatus::Persisted { .. })
    }

    pub fn outcome(&self) -> &Outcome {
        &self.record.outcome
    }
}
