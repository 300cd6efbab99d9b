//! Run Orchestrator: drives one request through stages, validator, gate and audit
use crate::config::EngineConfig;
use crate::pipeline::PipelineDefinition;
use chrono::Utc;
use govern_approval::{
    ApprovalChannel, ApprovalDecision, ApprovalError, FileApprovalQueue, MemoryApprovalQueue,
    Resolution, TicketStatus,
};
use govern_audit::{persist_with_retry, AuditSink, FileAuditSink, MemoryAuditSink, RetryPolicy};
use govern_core::{
    CancelHandle, Disposition, GovernError, Outcome, RunContext, RunMode, RunRecord, RunReport,
    RunRequest, Stage, StageError, StageOutput, TelemetryEvent, TelemetrySink, Verdict,
    VerdictOrigin,
};
use govern_policy::GovernanceGate;
use govern_prompt::PromptInjector;
use govern_validator::{RemoteAuthority, Validator};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

/// How a run settled before its record is written
struct Settled {
    verdict: Option<Verdict>,
    outcome: Outcome,
}

impl Settled {
    fn failed(verdict: Option<Verdict>, err: &GovernError) -> Self {
        Self {
            verdict,
            outcome: Outcome::Failed {
                reason: err.to_string(),
            },
        }
    }

    fn cancelled(verdict: Option<Verdict>, reason: String) -> Self {
        Self {
            verdict,
            outcome: Outcome::Cancelled { reason },
        }
    }
}

/// A governing stage must hand back a complete assessment
fn check_assessment(stage: &dyn Stage, output: StageOutput) -> Result<StageOutput, StageError> {
    if !stage.governs() {
        return Ok(output);
    }
    match &output.assessment {
        None => Err(StageError::MissingAssessment),
        Some(assessment) => {
            assessment.validate()?;
            Ok(output)
        }
    }
}

/// Shares only read-only configuration, so clones can execute runs concurrently
#[derive(Clone)]
pub struct Orchestrator {
    pipeline: Arc<PipelineDefinition>,
    gate: GovernanceGate,
    validator: Validator,
    audit: Arc<dyn AuditSink>,
    approvals: Option<Arc<dyn ApprovalChannel>>,
    telemetry: Arc<dyn TelemetrySink>,
    retry: RetryPolicy,
    /// Held from the supersede check until the superseding record is written
    resolving: Arc<Mutex<()>>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("pipeline", &self.pipeline)
            .field("validator", &self.validator)
            .field("approvals", &self.approvals.is_some())
            .field("retry", &self.retry)
            .finish()
    }
}

impl Orchestrator {
    pub fn new(pipeline: PipelineDefinition, validator: Validator, audit: Arc<dyn AuditSink>) -> Self {
        let gate = GovernanceGate::new(pipeline.policy().clone());
        Self {
            pipeline: Arc::new(pipeline),
            gate,
            validator,
            audit,
            approvals: None,
            telemetry: Arc::new(govern_core::TracingTelemetry),
            retry: RetryPolicy::default(),
            resolving: Arc::new(Mutex::new(())),
        }
    }

    pub fn with_approvals(mut self, approvals: Arc<dyn ApprovalChannel>) -> Self {
        self.approvals = Some(approvals);
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Wire the standard pipeline and the configured collaborators
    pub async fn from_config(
        config: &EngineConfig,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Result<Self, GovernError> {
        config.validate()?;

        let stages = match &config.prompts.path {
            Some(path) => {
                let prompts = PromptInjector::load(path)?;
                govern_stages::with_prompts(config.planner, Arc::new(prompts))
            }
            None => vec![
                Arc::new(govern_stages::IntentStage) as Arc<dyn Stage>,
                Arc::new(govern_stages::PlanStage::new(config.planner)),
                Arc::new(govern_stages::ExecuteStage::default()),
            ],
        };
        let pipeline = PipelineDefinition::new(stages, config.policy.clone())?;

        let validator = match &config.validator.endpoint {
            Some(endpoint) => Validator::new(
                Arc::new(RemoteAuthority::new(endpoint.as_str())?),
                Duration::from_millis(config.validator.timeout_ms),
                config.validator.fallback_level,
            ),
            None => Validator::local_only(config.validator.fallback_level),
        };

        let audit: Arc<dyn AuditSink> = match &config.audit.dir {
            Some(dir) => Arc::new(FileAuditSink::open(dir.clone()).await?),
            None => Arc::new(MemoryAuditSink::new()),
        };
        let approvals: Arc<dyn ApprovalChannel> = match &config.approvals.dir {
            Some(dir) => Arc::new(FileApprovalQueue::open(dir.clone()).await?),
            None => Arc::new(MemoryApprovalQueue::new()),
        };

        Ok(Self::new(pipeline, validator, audit)
            .with_approvals(approvals)
            .with_telemetry(telemetry)
            .with_retry(RetryPolicy::new(
                config.audit.max_attempts,
                config.audit.base_delay_ms,
            )))
    }

    pub fn pipeline(&self) -> &PipelineDefinition {
        &self.pipeline
    }

    pub fn gate(&self) -> &GovernanceGate {
        &self.gate
    }

    pub fn audit(&self) -> &Arc<dyn AuditSink> {
        &self.audit
    }

    pub fn approvals(&self) -> Option<&Arc<dyn ApprovalChannel>> {
        self.approvals.as_ref()
    }

    /// Execute one run to its terminal outcome
    pub async fn execute(&self, request: RunRequest) -> RunReport {
        self.execute_with_cancel(request, &CancelHandle::new()).await
    }

    /// Execute one run, stopping at the next boundary once `cancel` fires
    pub async fn execute_with_cancel(&self, request: RunRequest, cancel: &CancelHandle) -> RunReport {
        let started = Instant::now();
        let telemetry = self.telemetry.as_ref();
        let mut ctx = RunContext::from_request(&request);

        telemetry.emit(&TelemetryEvent::RunStarted {
            run_id: request.run_id.clone(),
            mode: request.mode.to_string(),
        });

        let settled = self.drive(&mut ctx, cancel).await;

        let record = RunRecord {
            run_id: request.run_id.clone(),
            pipeline_id: self.pipeline.pipeline_id().to_string(),
            mode: request.mode,
            context: ctx,
            error: settled.outcome.reason().map(String::from),
            verdict: settled.verdict,
            outcome: settled.outcome,
            duration_ms: started.elapsed().as_millis() as u64,
            supersedes: request.supersedes,
            completed_at: Utc::now(),
        };

        self.finish(record).await
    }

    async fn drive(&self, ctx: &mut RunContext, cancel: &CancelHandle) -> Settled {
        let telemetry = self.telemetry.as_ref();

        for stage in self.pipeline.stages() {
            let name = stage.name();
            if cancel.is_cancelled() {
                return Settled::cancelled(None, format!("cancelled before stage '{}'", name));
            }

            telemetry.emit(&TelemetryEvent::StageStarted {
                run_id: ctx.run_id.clone(),
                stage: name.to_string(),
            });
            let start = Instant::now();
            let result = stage
                .run(ctx, telemetry)
                .and_then(|output| check_assessment(stage.as_ref(), output));
            let latency_ms = start.elapsed().as_millis() as u64;

            let output = match result {
                Ok(output) => output,
                Err(e) => {
                    let err = GovernError::stage(name, &e);
                    telemetry.emit(&TelemetryEvent::StageFailed {
                        run_id: ctx.run_id.clone(),
                        stage: name.to_string(),
                        reason: e.to_string(),
                    });
                    return Settled::failed(None, &err);
                }
            };

            let confidence = output.confidence();
            if let Err(e) = ctx.append(name, output, latency_ms, stage.deterministic()) {
                return Settled::failed(None, &GovernError::from(e));
            }
            telemetry.emit(&TelemetryEvent::StageCompleted {
                run_id: ctx.run_id.clone(),
                stage: name.to_string(),
                latency_ms,
                confidence,
            });
        }

        let verdict = match self.validator.validate(ctx, telemetry).await {
            Ok(verdict) => verdict,
            Err(e) => return Settled::failed(None, &e),
        };

        if cancel.is_cancelled() {
            return Settled::cancelled(Some(verdict), "cancelled after validation".to_string());
        }

        match self.gate.decide(&verdict, ctx.mode) {
            Ok(decision) => Settled {
                outcome: Outcome::from(decision.disposition),
                verdict: Some(verdict),
            },
            Err(e) => Settled::failed(Some(verdict), &e),
        }
    }

    /// Persist the record exactly once, queue REVIEW runs, report
    async fn finish(&self, record: RunRecord) -> RunReport {
        let telemetry = self.telemetry.as_ref();
        let persistence = persist_with_retry(self.audit.as_ref(), &record, &self.retry, telemetry).await;
        let report = RunReport {
            record,
            persistence,
        };

        if report.record.outcome.awaits_approval() {
            self.queue_for_approval(&report).await;
        }

        telemetry.emit(&TelemetryEvent::RunFinished {
            run_id: report.record.run_id.clone(),
            outcome: report.record.outcome.label().to_string(),
            duration_ms: report.record.duration_ms,
            persisted: report.is_persisted(),
        });
        report
    }

    async fn queue_for_approval(&self, report: &RunReport) {
        let Some(approvals) = &self.approvals else {
            return;
        };
        let run_id = &report.record.run_id;
        if !report.is_persisted() {
            warn!(run_id = %run_id, "REVIEW run was not persisted, not queueing it for approval");
            return;
        }
        match approvals.submit(&report.record).await {
            Ok(_) => self.telemetry.emit(&TelemetryEvent::ApprovalQueued {
                run_id: run_id.clone(),
            }),
            Err(e) => warn!(run_id = %run_id, error = %e, "Approval handoff failed"),
        }
    }

    /// Apply a human decision to a persisted REVIEW run. The original record
    /// stays untouched; the decision becomes a new record superseding it.
    ///
    /// The ticket is closed only after that record is persisted, so a
    /// decision lost to an unavailable audit sink can be submitted again.
    pub async fn resolve(&self, resolution: Resolution) -> Result<RunReport, GovernError> {
        let run_id = resolution.run_id.as_str();
        if resolution.actor.trim().is_empty() {
            return Err(ApprovalError::MissingActor.into());
        }

        let _resolving = self.resolving.lock().await;
        let original = self
            .audit
            .get(run_id)
            .await?
            .ok_or_else(|| ApprovalError::NotFound(run_id.to_string()))?;
        if original.outcome != Outcome::Review {
            return Err(ApprovalError::NotReviewable {
                run_id: run_id.to_string(),
                outcome: original.outcome.to_string(),
            }
            .into());
        }
        if resolution.decision == ApprovalDecision::Approve && original.mode == RunMode::DryRun {
            return Err(GovernError::PolicyViolation(format!(
                "DRY_RUN run '{}' cannot be approved",
                run_id
            )));
        }
        if let Some(existing) = self
            .audit
            .list()
            .await?
            .into_iter()
            .find(|r| r.supersedes.as_deref() == Some(run_id))
        {
            return Err(GovernError::PolicyViolation(format!(
                "run '{}' was already resolved by '{}'",
                run_id, existing.run_id
            )));
        }
        let ticket_open = self.open_ticket(&resolution).await?;

        let started = Instant::now();
        let disposition = match resolution.decision {
            ApprovalDecision::Approve => Disposition::Approved,
            ApprovalDecision::Reject => Disposition::Rejected,
        };
        let reasoning = match &resolution.reason {
            Some(reason) => format!("{} by {}: {}", resolution.decision, resolution.actor, reason),
            None => format!("{} by {}", resolution.decision, resolution.actor),
        };
        let new_run_id = Uuid::new_v4().to_string();
        let level = original
            .verdict
            .as_ref()
            .map(|v| v.governance_level)
            .unwrap_or_default();
        let verdict = Verdict::new(
            new_run_id.clone(),
            disposition,
            1.0,
            level,
            VerdictOrigin::Human,
            reasoning,
        );

        info!(
            run_id = %new_run_id,
            supersedes = %original.run_id,
            decision = %resolution.decision,
            actor = %resolution.actor,
            "Recording approval decision"
        );

        let record = RunRecord {
            run_id: new_run_id,
            pipeline_id: original.pipeline_id.clone(),
            mode: original.mode,
            context: original.context.clone(),
            verdict: Some(verdict),
            outcome: Outcome::from(disposition),
            duration_ms: started.elapsed().as_millis() as u64,
            error: None,
            supersedes: Some(original.run_id.clone()),
            completed_at: Utc::now(),
        };
        let report = self.finish(record).await;

        if !report.is_persisted() {
            warn!(run_id = %run_id, "Decision record not persisted, ticket left open");
        } else if let (true, Some(approvals)) = (ticket_open, &self.approvals) {
            if let Err(e) = approvals.decide(&resolution).await {
                warn!(run_id = %run_id, error = %e, "Decision recorded but ticket not closed");
            }
        }
        Ok(report)
    }

    /// Whether the run has a pending ticket to close. A ticket already
    /// closed with the same decision means its record never landed; any
    /// other closed ticket refuses the resolution.
    async fn open_ticket(&self, resolution: &Resolution) -> Result<bool, GovernError> {
        let Some(approvals) = &self.approvals else {
            return Ok(false);
        };
        let Some(ticket) = approvals.get(&resolution.run_id).await? else {
            return Ok(false);
        };
        if ticket.is_pending() {
            return Ok(true);
        }
        let requested = match resolution.decision {
            ApprovalDecision::Approve => TicketStatus::Approved,
            ApprovalDecision::Reject => TicketStatus::Rejected,
        };
        if ticket.status == requested {
            Ok(false)
        } else {
            Err(ApprovalError::AlreadyDecided {
                run_id: resolution.run_id.clone(),
                status: ticket.status,
            }
            .into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use govern_core::{Assessment, GovernanceLevel, MemoryTelemetry};
    use govern_policy::GovernancePolicy;
    use govern_stages::FnStage;
    use serde_json::json;

    fn assessed(confidence: f64) -> FnStage {
        FnStage::new("only", move |_| {
            Ok(StageOutput::assessed(
                json!({}),
                Assessment::new(confidence, "self check")
                    .with_disposition(Disposition::Approved)
                    .with_level(GovernanceLevel::Low),
            ))
        })
    }

    fn orchestrator(stage: FnStage) -> Orchestrator {
        let pipeline =
            PipelineDefinition::new(vec![Arc::new(stage)], GovernancePolicy::standard()).unwrap();
        Orchestrator::new(
            pipeline,
            Validator::local_only(GovernanceLevel::Low),
            Arc::new(MemoryAuditSink::new()),
        )
        .with_telemetry(Arc::new(MemoryTelemetry::new()))
    }

    #[tokio::test]
    async fn test_governing_stage_needs_assessment() {
        let orch = orchestrator(FnStage::new("bare", |_| Ok(StageOutput::new(json!({})))));
        let report = orch.execute(RunRequest::new(RunMode::Live, json!({}))).await;
        let reason = report.outcome().reason().unwrap();
        assert!(reason.starts_with("STAGE/bare: STAGE/ASSESSMENT"));
        assert!(report.record.verdict.is_none());
    }

    #[tokio::test]
    async fn test_out_of_range_confidence_fails_stage() {
        let orch = orchestrator(assessed(1.5));
        let report = orch.execute(RunRequest::new(RunMode::Live, json!({}))).await;
        assert!(report.outcome().is_failed());
        assert!(report.record.context.is_empty());
    }

    #[tokio::test]
    async fn test_local_fallback_approves_above_threshold() {
        let orch = orchestrator(assessed(0.8));
        let report = orch.execute(RunRequest::new(RunMode::Live, json!({}))).await;
        assert_eq!(report.outcome(), &Outcome::Approved);
        assert_eq!(
            report.record.verdict.as_ref().unwrap().origin,
            VerdictOrigin::LocalFallback
        );
        assert!(report.is_persisted());
    }

    #[tokio::test]
    async fn test_resolve_requires_actor() {
        let orch = orchestrator(assessed(0.8));
        let err = orch.resolve(Resolution::approve("x", " ")).await.unwrap_err();
        assert!(err.to_string().contains("APPROVAL/ACTOR"));
    }
}
