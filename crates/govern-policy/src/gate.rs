//! Governance Gate: maps a verdict onto the run's final disposition
//!
//! Rules, first match wins:
//! 1. REJECTED verdicts stay REJECTED (veto)
//! 2. Levels with mandatory approval halt for REVIEW
//! 3. Effective confidence at or above the level threshold → APPROVED
//! 4. Otherwise REVIEW
//!
//! DRY_RUN caps the result at REVIEW.

use crate::decay::effective_confidence;
use crate::policy::GovernancePolicy;
use chrono::{DateTime, Utc};
use govern_core::{Disposition, GovernError, RunMode, Verdict};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Which rule decided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateRule {
    Veto,
    MandatoryApproval,
    ConfidenceMet,
    BelowThreshold,
}

/// Gate result with the facts that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateDecision {
    pub disposition: Disposition,
    pub rule: GateRule,
    pub effective_confidence: f64,
    pub threshold: f64,
    /// DRY_RUN lowered an APPROVED result to REVIEW
    pub capped_by_dry_run: bool,
}

/// Policy engine shared read-only across runs
#[derive(Debug, Clone)]
pub struct GovernanceGate {
    policy: Arc<GovernancePolicy>,
}

impl GovernanceGate {
    pub fn new(policy: GovernancePolicy) -> Self {
        Self {
            policy: Arc::new(policy),
        }
    }

    pub fn policy(&self) -> &GovernancePolicy {
        &self.policy
    }

    pub fn decide(&self, verdict: &Verdict, mode: RunMode) -> Result<GateDecision, GovernError> {
        self.decide_at(verdict, mode, Utc::now())
    }

    /// Pure evaluation at an explicit instant
    pub fn decide_at(
        &self,
        verdict: &Verdict,
        mode: RunMode,
        now: DateTime<Utc>,
    ) -> Result<GateDecision, GovernError> {
        let rule = self.policy.level(verdict.governance_level);

        if verdict.disposition == Disposition::Rejected {
            return Ok(GateDecision {
                disposition: Disposition::Rejected,
                rule: GateRule::Veto,
                effective_confidence: verdict.confidence,
                threshold: rule.map(|r| r.min_confidence).unwrap_or(f64::NAN),
                capped_by_dry_run: false,
            });
        }

        let rule = rule?;
        if !(0.0..=1.0).contains(&verdict.confidence) {
            return Err(GovernError::PolicyViolation(format!(
                "verdict confidence {} outside [0, 1]",
                verdict.confidence
            )));
        }

        let effective = effective_confidence(verdict, now, self.policy.decay.as_ref());

        let (disposition, gate_rule) = if rule.requires_approval {
            (Disposition::Review, GateRule::MandatoryApproval)
        } else if effective >= rule.min_confidence {
            (Disposition::Approved, GateRule::ConfidenceMet)
        } else {
            (Disposition::Review, GateRule::BelowThreshold)
        };

        let capped = mode == RunMode::DryRun && disposition == Disposition::Approved;
        let disposition = if capped {
            Disposition::Review
        } else {
            disposition
        };

        debug!(
            run_id = %verdict.run_id,
            level = %verdict.governance_level,
            effective_confidence = effective,
            threshold = rule.min_confidence,
            disposition = %disposition,
            "Gate decided"
        );

        Ok(GateDecision {
            disposition,
            rule: gate_rule,
            effective_confidence: effective,
            threshold: rule.min_confidence,
            capped_by_dry_run: capped,
        })
    }
}

/// `(Verdict, GovernancePolicy) -> Disposition` for one-off checks
pub fn evaluate(
    verdict: &Verdict,
    policy: &GovernancePolicy,
    mode: RunMode,
) -> Result<Disposition, GovernError> {
    GovernanceGate::new(policy.clone())
        .decide(verdict, mode)
        .map(|d| d.disposition)
}
