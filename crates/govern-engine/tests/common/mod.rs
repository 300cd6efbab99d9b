#![allow(dead_code)]

use async_trait::async_trait;
use govern_audit::{AuditError, AuditSink, MemoryAuditSink, RetryPolicy};
use govern_core::{
    Assessment, CancelHandle, Disposition, GovernanceLevel, RunRecord, Stage, StageError, StageOutput, Verdict,
    VerdictOrigin,
};
use govern_engine::{Orchestrator, PipelineDefinition};
use govern_policy::GovernancePolicy;
use govern_stages::FnStage;
use govern_validator::{AuthorityError, ValidationAuthority, Validator, VerdictRequest};
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub enum Answer {
    Verdict(Disposition, f64, GovernanceLevel),
    Hang,
    Down,
}

/// Authority with a fixed answer
pub struct ScriptedAuthority(pub Answer);

#[async_trait]
impl ValidationAuthority for ScriptedAuthority {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn validate(&self, request: &VerdictRequest) -> Result<Verdict, AuthorityError> {
        match self.0 {
            Answer::Verdict(disposition, confidence, level) => Ok(Verdict::new(
                request.run_id.as_str(),
                disposition,
                confidence,
                level,
                VerdictOrigin::Remote,
                "scripted answer",
            )),
            Answer::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Err(AuthorityError::Unavailable("hung".into()))
            }
            Answer::Down => Err(AuthorityError::Unavailable("connection refused".into())),
        }
    }
}

pub fn remote(answer: Answer) -> Validator {
    Validator::new(
        Arc::new(ScriptedAuthority(answer)),
        Duration::from_millis(100),
        GovernanceLevel::Medium,
    )
}

/// Authority that approves, cancelling the run while it deliberates
pub struct CancellingAuthority {
    pub cancel: CancelHandle,
    pub level: GovernanceLevel,
}

#[async_trait]
impl ValidationAuthority for CancellingAuthority {
    fn name(&self) -> &str {
        "cancelling"
    }

    async fn validate(&self, request: &VerdictRequest) -> Result<Verdict, AuthorityError> {
        self.cancel.cancel();
        Ok(Verdict::new(
            request.run_id.as_str(),
            Disposition::Approved,
            1.0,
            self.level,
            VerdictOrigin::Remote,
            "approved, then interrupted",
        ))
    }
}

/// Memory sink whose writes can be switched off and on
#[derive(Default)]
pub struct SwitchableSink {
    pub inner: MemoryAuditSink,
    offline: AtomicBool,
}

impl SwitchableSink {
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

#[async_trait]
impl AuditSink for SwitchableSink {
    async fn put(&self, record: &RunRecord) -> Result<(), AuditError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(AuditError::Unavailable("store offline".into()));
        }
        self.inner.put(record).await
    }

    async fn get(&self, run_id: &str) -> Result<Option<RunRecord>, AuditError> {
        self.inner.get(run_id).await
    }

    async fn list(&self) -> Result<Vec<RunRecord>, AuditError> {
        self.inner.list().await
    }
}

/// Sink that refuses every write
pub struct OfflineSink;

#[async_trait]
impl AuditSink for OfflineSink {
    async fn put(&self, _record: &RunRecord) -> Result<(), AuditError> {
        Err(AuditError::Unavailable("store offline".into()))
    }

    async fn get(&self, _run_id: &str) -> Result<Option<RunRecord>, AuditError> {
        Ok(None)
    }

    async fn list(&self) -> Result<Vec<RunRecord>, AuditError> {
        Ok(Vec::new())
    }
}

/// Governing stage reporting a fixed self-assessment; counts its invocations
pub fn counted_stage(
    name: &str,
    confidence: f64,
    disposition: Disposition,
    level: GovernanceLevel,
    calls: Arc<AtomicUsize>,
) -> Arc<dyn Stage> {
    let label = name.to_string();
    Arc::new(FnStage::new(name, move |ctx| {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(StageOutput::assessed(
            json!({"stage": label, "saw": ctx.stage_names()}),
            Assessment::new(confidence, format!("{} done", label))
                .with_disposition(disposition)
                .with_level(level),
        ))
    }))
}

pub fn stage(name: &str, confidence: f64, disposition: Disposition, level: GovernanceLevel) -> Arc<dyn Stage> {
    counted_stage(name, confidence, disposition, level, Arc::new(AtomicUsize::new(0)))
}

pub fn failing_stage(name: &str, reason: &str) -> Arc<dyn Stage> {
    let reason = reason.to_string();
    Arc::new(FnStage::new(name, move |_| {
        Err(StageError::ExecutionFailed(reason.clone()))
    }))
}

pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(max_attempts, 1)
}

pub fn orchestrator(
    stages: Vec<Arc<dyn Stage>>,
    policy: GovernancePolicy,
    validator: Validator,
    audit: Arc<MemoryAuditSink>,
) -> Orchestrator {
    let pipeline = PipelineDefinition::new(stages, policy).expect("valid pipeline");
    Orchestrator::new(pipeline, validator, audit).with_retry(fast_retry(3))
}
