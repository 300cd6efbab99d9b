//! Approval tickets and decisions

use chrono::{DateTime, Utc};
use govern_core::{GovernError, GovernanceLevel, Outcome, RunMode, RunRecord};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApprovalError {
    #[error("APPROVAL/NOT_FOUND: no ticket for run '{0}'")]
    NotFound(String),

    #[error("APPROVAL/DECIDED: run '{run_id}' was already {status}")]
    AlreadyDecided { run_id: String, status: TicketStatus },

    #[error("APPROVAL/NOT_REVIEWABLE: run '{run_id}' ended {outcome}, only REVIEW runs are queued")]
    NotReviewable { run_id: String, outcome: String },

    #[error("APPROVAL/ACTOR: a decision needs a named actor")]
    MissingActor,

    #[error("APPROVAL/RUN_ID: '{0}' is not a valid ticket key")]
    InvalidRunId(String),

    #[error("APPROVAL/IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("APPROVAL/SERIALIZE: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl From<ApprovalError> for GovernError {
    fn from(err: ApprovalError) -> Self {
        match &err {
            ApprovalError::Io(_) | ApprovalError::Serialize(_) => GovernError::PersistenceFailure {
                run_id: "approvals".to_string(),
                attempts: 1,
                reason: err.to_string(),
            },
            _ => GovernError::PolicyViolation(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalDecision {
    Approve,
    Reject,
}

impl ApprovalDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalDecision::Approve => "approve",
            ApprovalDecision::Reject => "reject",
        }
    }
}

impl fmt::Display for ApprovalDecision {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ApprovalDecision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "approve" | "approved" => Ok(ApprovalDecision::Approve),
            "reject" | "rejected" => Ok(ApprovalDecision::Reject),
            other => Err(format!("unknown decision '{}'", other)),
        }
    }
}

/// A human decision on a queued run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub run_id: String,
    pub decision: ApprovalDecision,
    pub actor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Resolution {
    pub fn approve(run_id: impl Into<String>, actor: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            decision: ApprovalDecision::Approve,
            actor: actor.into(),
            reason: None,
        }
    }

    pub fn reject(run_id: impl Into<String>, actor: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            decision: ApprovalDecision::Reject,
            actor: actor.into(),
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    Pending,
    Approved,
    Rejected,
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            TicketStatus::Pending => "PENDING",
            TicketStatus::Approved => "APPROVED",
            TicketStatus::Rejected => "REJECTED",
        };
        write!(f, "{}", s)
    }
}

/// Queue entry for one REVIEW run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalTicket {
    pub run_id: String,
    pub pipeline_id: String,
    pub mode: RunMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub governance_level: Option<GovernanceLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub reasoning: String,
    pub status: TicketStatus,
    pub queued_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ApprovalTicket {
    pub fn from_record(record: &RunRecord) -> Result<Self, ApprovalError> {
        if record.outcome != Outcome::Review {
            return Err(ApprovalError::NotReviewable {
                run_id: record.run_id.clone(),
                outcome: record.outcome.to_string(),
            });
        }

        Ok(Self {
            run_id: record.run_id.clone(),
            pipeline_id: record.pipeline_id.clone(),
            mode: record.mode,
            governance_level: record.verdict.as_ref().map(|v| v.governance_level),
            confidence: record.confidence(),
            reasoning: record
                .verdict
                .as_ref()
                .map(|v| v.reasoning.clone())
                .unwrap_or_default(),
            status: TicketStatus::Pending,
            queued_at: Utc::now(),
            decided_at: None,
            decided_by: None,
            reason: None,
        })
    }

    pub fn is_pending(&self) -> bool {
        self.status == TicketStatus::Pending
    }

    /// Record a decision. A ticket is decided at most once.
    pub fn apply(&mut self, resolution: &Resolution) -> Result<(), ApprovalError> {
        if !self.is_pending() {
            return Err(ApprovalError::AlreadyDecided {
                run_id: self.run_id.clone(),
                status: self.status,
            });
        }
        if resolution.actor.trim().is_empty() {
            return Err(ApprovalError::MissingActor);
        }

        self.status = match resolution.decision {
            ApprovalDecision::Approve => TicketStatus::Approved,
            ApprovalDecision::Reject => TicketStatus::Rejected,
        };
        self.decided_at = Some(Utc::now());
        self.decided_by = Some(resolution.actor.clone());
        self.reason = resolution.reason.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::review_record;

    #[test]
    fn test_ticket_from_review_record() {
        let ticket = ApprovalTicket::from_record(&review_record("run-1")).unwrap();
        assert!(ticket.is_pending());
        assert_eq!(ticket.governance_level, Some(GovernanceLevel::Critical));
        assert_eq!(ticket.confidence, Some(1.0));
    }

    #[test]
    fn test_only_review_records_are_ticketed() {
        let mut record = review_record("run-1");
        record.outcome = Outcome::Approved;
        assert!(matches!(
            ApprovalTicket::from_record(&record),
            Err(ApprovalError::NotReviewable { .. })
        ));
    }

    #[test]
    fn test_decided_once() {
        let mut ticket = ApprovalTicket::from_record(&review_record("run-1")).unwrap();
        ticket
            .apply(&Resolution::approve("run-1", "alice").with_reason("looks right"))
            .unwrap();
        assert_eq!(ticket.status, TicketStatus::Approved);
        assert_eq!(ticket.decided_by.as_deref(), Some("alice"));

        let err = ticket.apply(&Resolution::reject("run-1", "bob")).unwrap_err();
        assert!(matches!(err, ApprovalError::AlreadyDecided { .. }));
    }

    #[test]
    fn test_actor_required() {
        let mut ticket = ApprovalTicket::from_record(&review_record("run-1")).unwrap();
        let err = ticket.apply(&Resolution::approve("run-1", "  ")).unwrap_err();
        assert!(matches!(err, ApprovalError::MissingActor));
        assert!(ticket.is_pending());
    }

    #[test]
    fn test_decision_parse() {
        assert_eq!("approve".parse::<ApprovalDecision>(), Ok(ApprovalDecision::Approve));
        assert_eq!("REJECTED".parse::<ApprovalDecision>(), Ok(ApprovalDecision::Reject));
        assert!("maybe".parse::<ApprovalDecision>().is_err());
    }
}
