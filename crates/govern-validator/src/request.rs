//! Summary of a run sent to the validation authority

use govern_core::{ContextError, Disposition, GovernanceLevel, RunContext, RunMode};
use serde::{Deserialize, Serialize};

/// What one stage contributed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSummary {
    pub stage: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    pub out_hash: String,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerdictRequest {
    pub run_id: String,
    pub mode: RunMode,
    pub stages: Vec<StageSummary>,
    /// Self-report of the last stage that made one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proposed_disposition: Option<Disposition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proposed_confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proposed_level: Option<GovernanceLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proposed_reasoning: Option<String>,
    pub context_digest: String,
}

impl VerdictRequest {
    pub fn from_context(ctx: &RunContext) -> Result<Self, ContextError> {
        let stages = ctx
            .entries()
            .iter()
            .map(|entry| StageSummary {
                stage: entry.stage.clone(),
                confidence: entry.output.confidence(),
                reasoning: entry.output.assessment.as_ref().map(|a| a.reasoning.clone()),
                out_hash: entry.out_hash.clone(),
                latency_ms: entry.latency_ms,
            })
            .collect();

        // trailing ungoverned stages (reporters, formatters) carry no assessment
        let proposal = ctx
            .entries()
            .iter()
            .rev()
            .find_map(|entry| entry.output.assessment.as_ref());

        Ok(Self {
            run_id: ctx.run_id.clone(),
            mode: ctx.mode,
            stages,
            proposed_disposition: proposal.and_then(|a| a.disposition),
            proposed_confidence: proposal.map(|a| a.confidence),
            proposed_level: proposal.and_then(|a| a.governance_level),
            proposed_reasoning: proposal.map(|a| a.reasoning.clone()),
            context_digest: ctx.digest()?,
        })
    }

    /// Some stage reported an assessment
    pub fn has_proposal(&self) -> bool {
        self.proposed_confidence.is_some()
    }
}
