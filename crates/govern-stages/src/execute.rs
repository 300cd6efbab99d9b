//! Executor stage: scores the planned change and proposes a disposition
//!
//! Works like a quality gate. Each check starts from a score of 100 and
//! subtracts its impact; the remaining score becomes the stage confidence.

use crate::plan::{Plan, PLAN_STAGE};
use govern_core::{
    Assessment, Disposition, GovernanceLevel, RunContext, RunMode, Stage, StageError, StageOutput,
    TelemetryEvent, TelemetrySink,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const EXECUTE_STAGE: &str = "executor";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Ok,
    Warn,
    Fail,
}

/// Single check result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Check {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    /// Score impact (negative)
    pub impact: i32,
}

impl Check {
    fn new(name: &str, status: CheckStatus, message: impl Into<String>, impact: i32) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: message.into(),
            impact,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TestResults {
    pub passed: u32,
    pub failed: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LintResults {
    pub errors: u32,
    pub warnings: u32,
}

/// Score thresholds for the proposed disposition
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExecutionProfile {
    /// Require test results in the request
    pub require_tests: bool,
    /// At or above: APPROVED, unless a check failed
    pub approve_score: u32,
    /// Below: REJECTED
    pub reject_score: u32,
}

impl Default for ExecutionProfile {
    fn default() -> Self {
        Self {
            require_tests: true,
            approve_score: 70,
            reject_score: 40,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub score: u32,
    pub checks: Vec<Check>,
    pub proposed: Disposition,
    pub level: GovernanceLevel,
    /// Nothing leaves the run in DRY_RUN mode
    pub dry_run: bool,
    pub summary: String,
}

/// Evaluates the plan against reported test and lint results
#[derive(Debug, Clone, Default)]
pub struct ExecuteStage {
    profile: ExecutionProfile,
}

impl ExecuteStage {
    pub fn new(profile: ExecutionProfile) -> Self {
        Self { profile }
    }

    pub fn evaluate(&self, plan: &Plan, tests: Option<TestResults>, lint: Option<LintResults>) -> (u32, Vec<Check>) {
        let mut checks = Vec::new();

        if plan.within_limits {
            checks.push(Check::new("plan_limits", CheckStatus::Ok, "change within limits", 0));
        } else {
            checks.push(Check::new(
                "plan_limits",
                CheckStatus::Fail,
                plan.violations.join("; "),
                -30,
            ));
        }

        match tests {
            Some(t) if t.failed > 0 => checks.push(Check::new(
                "tests_pass",
                CheckStatus::Fail,
                format!("{} passed, {} failed", t.passed, t.failed),
                -30,
            )),
            Some(t) => checks.push(Check::new(
                "tests_pass",
                CheckStatus::Ok,
                format!("{} passed", t.passed),
                0,
            )),
            None if self.profile.require_tests => checks.push(Check::new(
                "tests_pass",
                CheckStatus::Warn,
                "no test results reported",
                -15,
            )),
            None => {}
        }

        if let Some(l) = lint {
            if l.errors > 0 {
                checks.push(Check::new(
                    "lint_clean",
                    CheckStatus::Warn,
                    format!("{} lint errors", l.errors),
                    -10,
                ));
            } else if l.warnings > 10 {
                checks.push(Check::new(
                    "lint_clean",
                    CheckStatus::Warn,
                    format!("{} lint warnings", l.warnings),
                    -5,
                ));
            }
        }

        if plan.intent == "unknown" {
            checks.push(Check::new(
                "intent_known",
                CheckStatus::Warn,
                "goal did not map to a known intent",
                -20,
            ));
        }

        let score = checks.iter().fold(100i32, |acc, c| acc + c.impact).clamp(0, 100) as u32;
        (score, checks)
    }

    fn propose(&self, score: u32, checks: &[Check]) -> Disposition {
        if score < self.profile.reject_score {
            Disposition::Rejected
        } else if score < self.profile.approve_score
            || checks.iter().any(|c| c.status == CheckStatus::Fail)
        {
            Disposition::Review
        } else {
            Disposition::Approved
        }
    }
}

fn input_as<T: serde::de::DeserializeOwned>(input: &Value, key: &str) -> Result<Option<T>, StageError> {
    match input.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => serde_json::from_value(v.clone())
            .map(Some)
            .map_err(|e| StageError::ValidationFailed(format!("{}: {}", key, e))),
    }
}

impl Stage for ExecuteStage {
    fn name(&self) -> &str {
        EXECUTE_STAGE
    }

    fn run(&self, ctx: &RunContext, telemetry: &dyn TelemetrySink) -> Result<StageOutput, StageError> {
        let plan: Plan = serde_json::from_value(ctx.require(PLAN_STAGE)?.payload.clone())
            .map_err(|e| StageError::ValidationFailed(format!("planner output: {}", e)))?;
        let tests = input_as::<TestResults>(&ctx.input, "tests")?;
        let lint = input_as::<LintResults>(&ctx.input, "lint")?;

        let (score, checks) = self.evaluate(&plan, tests, lint);
        let proposed = self.propose(score, &checks);
        let level = GovernanceLevel::from_score(plan.risk_score);
        let failed = checks.iter().filter(|c| c.status == CheckStatus::Fail).count();

        telemetry.emit(&TelemetryEvent::StageProgress {
            run_id: ctx.run_id.clone(),
            stage: EXECUTE_STAGE.to_string(),
            message: format!("score {} ({} failed checks)", score, failed),
        });

        let summary = format!(
            "{} change scored {}/100 with {} failed check(s), level {}",
            plan.intent, score, failed, level
        );
        let assessment = Assessment::new(score as f64 / 100.0, summary.clone())
            .with_disposition(proposed)
            .with_level(level);

        let execution = Execution {
            score,
            checks,
            proposed,
            level,
            dry_run: ctx.mode == RunMode::DryRun,
            summary,
        };
        let payload = serde_json::to_value(&execution)
            .map_err(|e| StageError::ExecutionFailed(e.to_string()))?;
        Ok(StageOutput::assessed(payload, assessment))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::{IntentStage, INTENT_STAGE};
    use crate::plan::PlanStage;
    use govern_core::NoopTelemetry;
    use serde_json::json;

    fn run(mode: RunMode, input: Value) -> Result<StageOutput, StageError> {
        let mut ctx = RunContext::new("r", mode, input);
        let out = IntentStage.run(&ctx, &NoopTelemetry)?;
        ctx.append(INTENT_STAGE, out, 0, true).unwrap();
        let out = PlanStage::default().run(&ctx, &NoopTelemetry)?;
        ctx.append(PLAN_STAGE, out, 0, true).unwrap();
        ExecuteStage::default().run(&ctx, &NoopTelemetry)
    }

    #[test]
    fn test_clean_change_proposes_approval() {
        let out = run(
            RunMode::Validated,
            json!({"goal": "fix typo bug", "files_changed": 1, "lines_changed": 3,
                   "tests": {"passed": 12, "failed": 0}}),
        )
        .unwrap();
        let assessment = out.assessment.unwrap();
        assert_eq!(assessment.confidence, 1.0);
        assert_eq!(assessment.disposition, Some(Disposition::Approved));
        assert_eq!(assessment.governance_level, Some(GovernanceLevel::Low));
        assert_eq!(out.payload["dry_run"], false);
    }

    #[test]
    fn test_failing_tests_need_review() {
        let out = run(
            RunMode::DryRun,
            json!({"goal": "add export", "tests": {"passed": 3, "failed": 2}}),
        )
        .unwrap();
        let assessment = out.assessment.unwrap();
        assert_eq!(assessment.confidence, 0.7);
        assert_eq!(assessment.disposition, Some(Disposition::Review));
        assert_eq!(out.payload["dry_run"], true);
    }

    #[test]
    fn test_low_score_proposes_rejection() {
        let out = run(
            RunMode::Live,
            json!({"goal": "delete all tables", "files_changed": 80, "production": true,
                   "tests": {"passed": 0, "failed": 4}, "lint": {"errors": 3, "warnings": 0}}),
        )
        .unwrap();
        let assessment = out.assessment.unwrap();
        assert_eq!(assessment.confidence, 0.3);
        assert_eq!(assessment.disposition, Some(Disposition::Rejected));
        assert_eq!(assessment.governance_level, Some(GovernanceLevel::Critical));
    }

    #[test]
    fn test_malformed_test_results() {
        let err = run(RunMode::Live, json!({"goal": "fix it", "tests": "green"})).unwrap_err();
        assert!(matches!(err, StageError::ValidationFailed(msg) if msg.starts_with("tests")));
    }
}
