//! Unified Error Model
use crate::context::ContextError;
use crate::stage::StageError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GovernError {
    #[error("STAGE/{stage}: {reason}")]
    StageFailure { stage: String, reason: String },

    #[error("VALIDATOR/UNAVAILABLE: {0}")]
    ValidatorUnavailable(String),

    #[error("PERSIST/{run_id}: {reason} after {attempts} attempt(s)")]
    PersistenceFailure {
        run_id: String,
        attempts: u32,
        reason: String,
    },

    #[error("POLICY/{0}")]
    PolicyViolation(String),

    #[error("CANCELLED/{0}")]
    Cancelled(String),

    #[error("CONFIG/{0}")]
    Config(String),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error("SERIALIZE/{0}")]
    Serialize(#[from] serde_json::Error),
}

impl GovernError {
    pub fn stage(stage: impl Into<String>, err: &StageError) -> Self {
        GovernError::StageFailure {
            stage: stage.into(),
            reason: err.to_string(),
        }
    }

    /// Whether the run can still reach a verdict after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(self, GovernError::ValidatorUnavailable(_))
    }
}
