//! Govern Stages: reference stages for the governed pipeline
//!
//! Small and deterministic. They let a pipeline run end to end without
//! bespoke business logic; real deployments replace or extend them.
//!
//! # Pipeline Flow
//!
//! ```text
//! Request → intent → planner → executor → Validator → Gate
//!             ↓          ↓          ↓
//!          Intent      Plan    Execution + Assessment
//! ```

mod execute;
mod func;
mod intent;
mod plan;

pub use execute::{
    Check, CheckStatus, ExecuteStage, Execution, ExecutionProfile, LintResults, TestResults,
    EXECUTE_STAGE,
};
pub use func::FnStage;
pub use intent::{Intent, IntentStage, INTENT_STAGE};
pub use plan::{Plan, PlanLimits, PlanStage, PLAN_STAGE};

use govern_core::Stage;
use govern_prompt::PromptInjector;
use std::sync::Arc;

/// intent → planner → executor with default limits and profile
pub fn standard_pipeline() -> Vec<Arc<dyn Stage>> {
    vec![
        Arc::new(IntentStage),
        Arc::new(PlanStage::default()),
        Arc::new(ExecuteStage::default()),
    ]
}

/// Same as [`standard_pipeline`], with the planner rendering prompts
pub fn with_prompts(limits: PlanLimits, prompts: Arc<PromptInjector>) -> Vec<Arc<dyn Stage>> {
    vec![
        Arc::new(IntentStage),
        Arc::new(PlanStage::new(limits).with_prompts(prompts)),
        Arc::new(ExecuteStage::default()),
    ]
}
