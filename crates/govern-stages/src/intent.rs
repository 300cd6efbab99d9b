use govern_core::{Assessment, RunContext, Stage, StageError, StageOutput, TelemetryEvent, TelemetrySink};
use serde::{Deserialize, Serialize};

pub const INTENT_STAGE: &str = "intent";

/// Keyword table, checked in order
const KEYWORDS: &[(&str, &[&str])] = &[
    ("deletion", &["delete", "remove", "drop", "purge"]),
    ("bug_fix", &["fix", "bug", "crash", "regression"]),
    ("refactor", &["refactor", "cleanup", "rename"]),
    ("feature", &["add", "implement", "support", "introduce"]),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub kind: String,
    pub goal: String,
    pub identity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
}

/// Classifies the request goal into an intent
#[derive(Debug, Clone, Default)]
pub struct IntentStage;

impl IntentStage {
    pub fn classify(goal: &str) -> (&'static str, Option<&'static str>) {
        let lower = goal.to_lowercase();
        for (kind, words) in KEYWORDS {
            if let Some(word) = words.iter().find(|w| lower.contains(*w)) {
                return (*kind, Some(*word));
            }
        }
        ("unknown", None)
    }
}

impl Stage for IntentStage {
    fn name(&self) -> &str {
        INTENT_STAGE
    }

    fn run(&self, ctx: &RunContext, telemetry: &dyn TelemetrySink) -> Result<StageOutput, StageError> {
        let goal = ctx
            .input
            .get("goal")
            .or_else(|| ctx.input.get("text"))
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .ok_or_else(|| StageError::MissingInput {
                key: "goal".to_string(),
            })?;
        let identity = ctx
            .input
            .get("identity")
            .and_then(|v| v.as_str())
            .unwrap_or("agent");

        let (kind, keyword) = Self::classify(goal);
        telemetry.emit(&TelemetryEvent::StageProgress {
            run_id: ctx.run_id.clone(),
            stage: INTENT_STAGE.to_string(),
            message: format!("classified as {}", kind),
        });

        let intent = Intent {
            kind: kind.to_string(),
            goal: goal.to_string(),
            identity: identity.to_string(),
            keyword: keyword.map(String::from),
        };
        let assessment = match keyword {
            Some(word) => Assessment::new(0.9, format!("goal mentions '{}'", word)),
            None => Assessment::new(0.4, "no known keyword in goal"),
        };

        let payload =
            serde_json::to_value(&intent).map_err(|e| StageError::ExecutionFailed(e.to_string()))?;
        Ok(StageOutput::assessed(payload, assessment))
    }
}
