//! Telemetry: progress events emitted by stages and the orchestrator
//!
//! Sinks observe a run; they never influence its outcome.

use serde::Serialize;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TelemetryEvent {
    RunStarted {
        run_id: String,
        mode: String,
    },
    StageStarted {
        run_id: String,
        stage: String,
    },
    StageProgress {
        run_id: String,
        stage: String,
        message: String,
    },
    StageCompleted {
        run_id: String,
        stage: String,
        latency_ms: u64,
        confidence: Option<f64>,
    },
    StageFailed {
        run_id: String,
        stage: String,
        reason: String,
    },
    ValidatorFallback {
        run_id: String,
        reason: String,
    },
    VerdictIssued {
        run_id: String,
        disposition: String,
        origin: String,
    },
    PersistenceRetry {
        run_id: String,
        attempt: u32,
        reason: String,
    },
    ApprovalQueued {
        run_id: String,
    },
    RunFinished {
        run_id: String,
        outcome: String,
        duration_ms: u64,
        persisted: bool,
    },
}

impl TelemetryEvent {
    pub fn run_id(&self) -> &str {
        match self {
            TelemetryEvent::RunStarted { run_id, .. }
            | TelemetryEvent::StageStarted { run_id, .. }
            | TelemetryEvent::StageProgress { run_id, .. }
            | TelemetryEvent::StageCompleted { run_id, .. }
            | TelemetryEvent::StageFailed { run_id, .. }
            | TelemetryEvent::ValidatorFallback { run_id, .. }
            | TelemetryEvent::VerdictIssued { run_id, .. }
            | TelemetryEvent::PersistenceRetry { run_id, .. }
            | TelemetryEvent::ApprovalQueued { run_id }
            | TelemetryEvent::RunFinished { run_id, .. } => run_id,
        }
    }
}

/// Receiver of telemetry events
pub trait TelemetrySink: Send + Sync {
    fn emit(&self, event: &TelemetryEvent);
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTelemetry;

impl TelemetrySink for NoopTelemetry {
    fn emit(&self, _event: &TelemetryEvent) {}
}

/// Writes events as structured tracing records
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetry;

impl TelemetrySink for TracingTelemetry {
    fn emit(&self, event: &TelemetryEvent) {
        match event {
            TelemetryEvent::RunStarted { run_id, mode } => {
                info!(run_id = %run_id, mode = %mode, "Run started");
            }
            TelemetryEvent::StageStarted { run_id, stage } => {
                debug!(run_id = %run_id, stage = %stage, "Stage started");
            }
            TelemetryEvent::StageProgress {
                run_id,
                stage,
                message,
            } => {
                debug!(run_id = %run_id, stage = %stage, "{}", message);
            }
            TelemetryEvent::StageCompleted {
                run_id,
                stage,
                latency_ms,
                confidence,
            } => {
                info!(
                    run_id = %run_id,
                    stage = %stage,
                    latency_ms = latency_ms,
                    confidence = ?confidence,
                    "Stage completed"
                );
            }
            TelemetryEvent::StageFailed {
                run_id,
                stage,
                reason,
            } => {
                warn!(run_id = %run_id, stage = %stage, reason = %reason, "Stage failed, halting run");
            }
            TelemetryEvent::ValidatorFallback { run_id, reason } => {
                warn!(run_id = %run_id, reason = %reason, "Validation authority unavailable, using local fallback");
            }
            TelemetryEvent::VerdictIssued {
                run_id,
                disposition,
                origin,
            } => {
                info!(run_id = %run_id, disposition = %disposition, origin = %origin, "Verdict issued");
            }
            TelemetryEvent::PersistenceRetry {
                run_id,
                attempt,
                reason,
            } => {
                warn!(run_id = %run_id, attempt = attempt, reason = %reason, "Persisting run record failed, will retry");
            }
            TelemetryEvent::ApprovalQueued { run_id } => {
                info!(run_id = %run_id, "Run queued for human approval");
            }
            TelemetryEvent::RunFinished {
                run_id,
                outcome,
                duration_ms,
                persisted,
            } => {
                info!(
                    run_id = %run_id,
                    outcome = %outcome,
                    duration_ms = duration_ms,
                    persisted = persisted,
                    "Run finished"
                );
            }
        }
    }
}

/// Forwards each event to every inner sink
#[derive(Default, Clone)]
pub struct FanoutTelemetry {
    sinks: Vec<Arc<dyn TelemetrySink>>,
}

impl FanoutTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl TelemetrySink for FanoutTelemetry {
    fn emit(&self, event: &TelemetryEvent) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }
}

/// Keeps every event in memory; used by tests and the CLI's event dump
#[derive(Debug, Default)]
pub struct MemoryTelemetry {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl MemoryTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn events_for(&self, run_id: &str) -> Vec<TelemetryEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.run_id() == run_id)
            .collect()
    }
}

impl TelemetrySink for MemoryTelemetry {
    fn emit(&self, event: &TelemetryEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fanout_reaches_every_sink() {
        let a = Arc::new(MemoryTelemetry::new());
        let b = Arc::new(MemoryTelemetry::new());
        let fanout = FanoutTelemetry::new().with(a.clone()).with(b.clone());

        fanout.emit(&TelemetryEvent::ApprovalQueued {
            run_id: "r1".into(),
        });

        assert_eq!(a.events().len(), 1);
        assert_eq!(b.events_for("r1").len(), 1);
        assert!(b.events_for("r2").is_empty());
    }

    #[test]
    fn test_event_serialization() {
        let event = TelemetryEvent::StageFailed {
            run_id: "r1".into(),
            stage: "planner".into(),
            reason: "boom".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "stage_failed");
        assert_eq!(json["stage"], "planner");
    }
}
