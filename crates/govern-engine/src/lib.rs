//! Govern Engine: the run orchestrator
//!
//! # Run Flow
//!
//! ```text
//! RunRequest → RunContext → stage₁ … stageₙ → Validator → Gate → RunRecord
//!                               │ failure            │              │
//!                               └──── FAILED ────────┘              ├─→ AuditSink (retry)
//!                                                                   └─→ ApprovalChannel (REVIEW)
//! ```
//!
//! Every run ends in exactly one record, persisted once, whether it was
//! approved, sent for review, rejected, failed or cancelled.

pub mod config;
pub mod metrics;
pub mod orchestrator;
pub mod pipeline;

pub use config::{
    ApprovalsConfig, AuditConfig, ConfigError, EngineConfig, PromptsConfig, ValidatorConfig,
    DEFAULT_CONFIG_FILE,
};
pub use metrics::MetricsTelemetry;
pub use orchestrator::Orchestrator;
pub use pipeline::PipelineDefinition;
