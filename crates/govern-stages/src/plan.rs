use crate::intent::{Intent, INTENT_STAGE};
use govern_core::{Assessment, RunContext, Stage, StageError, StageOutput, TelemetryEvent, TelemetrySink};
use govern_prompt::PromptInjector;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

pub const PLAN_STAGE: &str = "planner";

/// Change-size limits a plan must respect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanLimits {
    pub max_files: u64,
    pub max_lines: u64,
}

impl Default for PlanLimits {
    fn default() -> Self {
        Self::broad()
    }
}

impl PlanLimits {
    /// Small, surgical changes
    pub fn conservative() -> Self {
        Self {
            max_files: 5,
            max_lines: 200,
        }
    }

    pub fn broad() -> Self {
        Self {
            max_files: 20,
            max_lines: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub intent: String,
    pub steps: Vec<String>,
    pub files_changed: u64,
    pub lines_changed: u64,
    pub violations: Vec<String>,
    pub within_limits: bool,
    /// 0-100; higher means more governance
    pub risk_score: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

/// Turns the classified intent into an ordered plan and a risk score
#[derive(Debug, Clone, Default)]
pub struct PlanStage {
    limits: PlanLimits,
    prompts: Option<Arc<PromptInjector>>,
}

impl PlanStage {
    pub fn new(limits: PlanLimits) -> Self {
        Self {
            limits,
            prompts: None,
        }
    }

    /// Render a planner prompt for the request's identity
    pub fn with_prompts(mut self, prompts: Arc<PromptInjector>) -> Self {
        self.prompts = Some(prompts);
        self
    }

    pub fn limits(&self) -> PlanLimits {
        self.limits
    }

    fn steps_for(kind: &str) -> Vec<String> {
        let steps: &[&str] = match kind {
            "bug_fix" => &["reproduce", "patch", "add regression test"],
            "feature" => &["design", "implement", "test", "document"],
            "refactor" => &["map call sites", "restructure", "verify behavior unchanged"],
            "deletion" => &["inventory dependents", "remove", "verify nothing references it"],
            _ => &["clarify goal"],
        };
        steps.iter().map(|s| s.to_string()).collect()
    }

    /// Base risk by intent, raised by change size and explicit production scope
    pub fn risk_score(kind: &str, files: u64, lines: u64, production: bool) -> u32 {
        let base: u32 = match kind {
            "deletion" => 45,
            "feature" => 25,
            "refactor" => 20,
            "bug_fix" => 10,
            _ => 30,
        };
        let size = (files.min(50) as u32) + (lines / 100).min(25) as u32;
        let scope = if production { 40 } else { 0 };
        (base + size + scope).min(100)
    }
}

fn input_u64(input: &Value, key: &str) -> u64 {
    input.get(key).and_then(|v| v.as_u64()).unwrap_or(0)
}

impl Stage for PlanStage {
    fn name(&self) -> &str {
        PLAN_STAGE
    }

    fn run(&self, ctx: &RunContext, telemetry: &dyn TelemetrySink) -> Result<StageOutput, StageError> {
        let intent: Intent = serde_json::from_value(ctx.require(INTENT_STAGE)?.payload.clone())
            .map_err(|e| StageError::ValidationFailed(format!("intent output: {}", e)))?;

        let files = input_u64(&ctx.input, "files_changed");
        let lines = input_u64(&ctx.input, "lines_changed");
        let production = ctx
            .input
            .get("production")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        let mut violations = Vec::new();
        if files > self.limits.max_files {
            violations.push(format!(
                "files changed ({}) exceeds max ({})",
                files, self.limits.max_files
            ));
        }
        if lines > self.limits.max_lines {
            violations.push(format!(
                "lines changed ({}) exceeds max ({})",
                lines, self.limits.max_lines
            ));
        }
        let within_limits = violations.is_empty();
        if !within_limits {
            debug!(run_id = %ctx.run_id, violations = ?violations, "Plan exceeds limits");
        }
        let steps = Self::steps_for(&intent.kind);
        let risk_score = Self::risk_score(&intent.kind, files, lines, production);

        let prompt = match &self.prompts {
            Some(prompts) => {
                let vars = json!({
                    "identity": intent.identity,
                    "goal": intent.goal,
                    "intent": intent.kind,
                    "steps": steps,
                    "mode": ctx.mode.as_str(),
                });
                let rendered = prompts
                    .inject(&intent.identity, Some(&intent.kind), &vars)
                    .map_err(|e| StageError::ExecutionFailed(e.to_string()))?;
                Some(rendered.text)
            }
            None => None,
        };

        telemetry.emit(&TelemetryEvent::StageProgress {
            run_id: ctx.run_id.clone(),
            stage: PLAN_STAGE.to_string(),
            message: format!("{} steps, risk {}", steps.len(), risk_score),
        });

        let assessment = if within_limits {
            Assessment::new(0.85, format!("{} plan within limits", intent.kind))
        } else {
            Assessment::new(0.3, violations.join("; "))
        };

        let plan = Plan {
            intent: intent.kind,
            steps,
            files_changed: files,
            lines_changed: lines,
            violations,
            within_limits,
            risk_score,
            prompt,
        };
        let payload =
            serde_json::to_value(&plan).map_err(|e| StageError::ExecutionFailed(e.to_string()))?;
        Ok(StageOutput::assessed(payload, assessment))
    }
}
