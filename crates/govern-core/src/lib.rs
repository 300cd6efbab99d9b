//! Govern Core: Stage trait, run context, and data model
//!
//! Generic staged core with a single stage contract. One run threads one
//! append-only [`RunContext`] through an ordered list of [`Stage`]s and ends
//! in exactly one [`Outcome`].

pub mod cancel;
pub mod context;
pub mod data_model;
pub mod error;
pub mod stage;
pub mod telemetry;
pub mod verdict;

pub use cancel::CancelHandle;
pub use context::{ContextEntry, ContextError, RunContext};
pub use data_model::{Outcome, PersistenceStatus, RunMode, RunRecord, RunReport, RunRequest};
pub use error::GovernError;
pub use stage::{Assessment, Stage, StageError, StageOutput};
pub use telemetry::{
    FanoutTelemetry, MemoryTelemetry, NoopTelemetry, TelemetryEvent, TelemetrySink,
    TracingTelemetry,
};
pub use verdict::{Disposition, GovernanceLevel, ParseLevelError, Verdict, VerdictOrigin};

/// Engine version stamped into pipeline ids
pub const GOVERN_VERSION: &str = "1.0.0";

/// Content digest used for context hashes and verdict signatures
pub fn hash_bytes(data: &[u8]) -> String {
    format!("blake3:{}", blake3::hash(data))
}
