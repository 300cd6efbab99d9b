//! Stage Trait: single contract for every pipeline stage
use crate::context::RunContext;
use crate::telemetry::TelemetrySink;
use crate::verdict::{Disposition, GovernanceLevel};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Single contract of a governed stage
pub trait Stage: Send + Sync {
    /// Unique stage name, also the key its output is stored under (ex: "planner")
    fn name(&self) -> &str;

    /// Whether the stage contributes to the governance decision.
    /// Governing stages must return an [`Assessment`] (default: true)
    fn governs(&self) -> bool {
        true
    }

    /// Whether the stage is deterministic (default: true)
    fn deterministic(&self) -> bool {
        true
    }

    /// Executes the stage against every output written so far
    fn run(
        &self,
        ctx: &RunContext,
        telemetry: &dyn TelemetrySink,
    ) -> Result<StageOutput, StageError>;
}

/// Self-reported judgment attached to a governing stage's output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    /// Confidence in the output (0.0 to 1.0)
    pub confidence: f64,
    /// Why the stage reached this output
    pub reasoning: String,
    /// Disposition the stage proposes; the local fallback verdict reads it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disposition: Option<Disposition>,
    /// Governance level the stage proposes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub governance_level: Option<GovernanceLevel>,
}

impl Assessment {
    pub fn new(confidence: f64, reasoning: impl Into<String>) -> Self {
        Self {
            confidence,
            reasoning: reasoning.into(),
            disposition: None,
            governance_level: None,
        }
    }

    pub fn with_disposition(mut self, disposition: Disposition) -> Self {
        self.disposition = Some(disposition);
        self
    }

    pub fn with_level(mut self, level: GovernanceLevel) -> Self {
        self.governance_level = Some(level);
        self
    }

    /// Checks the mandatory fields: confidence within [0, 1] and a non-empty reasoning
    pub fn validate(&self) -> Result<(), StageError> {
        // NaN is never contained in a range
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(StageError::InvalidAssessment(format!(
                "confidence {} outside [0, 1]",
                self.confidence
            )));
        }
        if self.reasoning.trim().is_empty() {
            return Err(StageError::InvalidAssessment("reasoning is empty".to_string()));
        }
        Ok(())
    }
}

/// Typed payload a stage contributes to the context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageOutput {
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assessment: Option<Assessment>,
}

impl StageOutput {
    /// Output of a non-governing stage
    pub fn new(payload: Value) -> Self {
        Self {
            payload,
            assessment: None,
        }
    }

    /// Output carrying the mandatory confidence and reasoning
    pub fn assessed(payload: Value, assessment: Assessment) -> Self {
        Self {
            payload,
            assessment: Some(assessment),
        }
    }

    pub fn confidence(&self) -> Option<f64> {
        self.assessment.as_ref().map(|a| a.confidence)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StageError {
    ValidationFailed(String),
    ExecutionFailed(String),
    MissingInput { key: String },
    MissingAssessment,
    InvalidAssessment(String),
}

impl std::fmt::Display for StageError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::ValidationFailed(msg) => write!(f, "STAGE/VALIDATION: {}", msg),
            Self::ExecutionFailed(msg) => write!(f, "STAGE/EXEC: {}", msg),
            Self::MissingInput { key } => write!(f, "STAGE/INPUT: missing '{}'", key),
            Self::MissingAssessment => {
                write!(f, "STAGE/ASSESSMENT: governing stage returned no confidence or reasoning")
            }
            Self::InvalidAssessment(msg) => write!(f, "STAGE/ASSESSMENT: {}", msg),
        }
    }
}

impl std::error::Error for StageError {}
