//! Local fallback verdicts
//!
//! Used only when the authority cannot be reached. The verdict mirrors the
//! last assessed stage's self-report; it adds no judgment of its own.

use crate::request::VerdictRequest;
use govern_core::{Disposition, GovernError, GovernanceLevel, Verdict, VerdictOrigin};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalFallback {
    level: GovernanceLevel,
}

impl Default for LocalFallback {
    fn default() -> Self {
        Self::new(GovernanceLevel::Medium)
    }
}

impl LocalFallback {
    /// `level` applies when that stage reports none
    pub fn new(level: GovernanceLevel) -> Self {
        Self { level }
    }

    pub fn level(&self) -> GovernanceLevel {
        self.level
    }

    pub fn verdict(&self, request: &VerdictRequest, reason: &str) -> Result<Verdict, GovernError> {
        let confidence = request.proposed_confidence.ok_or_else(|| {
            GovernError::PolicyViolation(format!(
                "no stage assessment to derive a fallback verdict for run '{}'",
                request.run_id
            ))
        })?;

        // a stage that reports confidence without a disposition gets a human look
        let disposition = request.proposed_disposition.unwrap_or(Disposition::Review);
        let level = request.proposed_level.unwrap_or(self.level);
        let reasoning = match &request.proposed_reasoning {
            Some(stage_reasoning) => format!("local fallback ({}): {}", reason, stage_reasoning),
            None => format!("local fallback ({})", reason),
        };

        Ok(Verdict::new(
            request.run_id.as_str(),
            disposition,
            confidence,
            level,
            VerdictOrigin::LocalFallback,
            reasoning,
        ))
    }
}
