//! Command handlers. Each returns the process exit code.

use crate::cli::{ApprovalsCommand, Cli, Commands, DecisionArgs, PromptArgs, RecordsCommand, RunArgs};
use anyhow::{bail, Context, Result};
use chrono::Utc;
use govern_approval::{ApprovalChannel, Resolution};
use govern_audit::AuditSink;
use govern_core::{
    CancelHandle, FanoutTelemetry, Outcome, PersistenceStatus, RunReport, RunRequest,
    TelemetrySink, TracingTelemetry,
};
use govern_engine::{EngineConfig, MetricsTelemetry, Orchestrator};
use govern_policy::effective_confidence;
use govern_prompt::PromptInjector;
use serde_json::{json, Value};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};

pub const EXIT_OK: u8 = 0;
pub const EXIT_REJECTED: u8 = 1;
pub const EXIT_FAILED: u8 = 2;
pub const EXIT_CANCELLED: u8 = 3;
pub const EXIT_NOT_PERSISTED: u8 = 4;

/// APPROVED and REVIEW succeed; anything else, or a record that never
/// reached the audit sink, does not
pub fn exit_code(report: &RunReport) -> u8 {
    match report.outcome() {
        Outcome::Rejected => EXIT_REJECTED,
        Outcome::Failed { .. } => EXIT_FAILED,
        Outcome::Cancelled { .. } => EXIT_CANCELLED,
        Outcome::Approved | Outcome::Review if !report.is_persisted() => EXIT_NOT_PERSISTED,
        Outcome::Approved | Outcome::Review => EXIT_OK,
    }
}

/// Request input from `--input`, `--input-file`, or an empty object
pub fn read_input(inline: Option<&str>, file: Option<&Path>) -> Result<Value> {
    match (inline, file) {
        (Some(text), _) => serde_json::from_str(text).context("--input is not valid JSON"),
        (None, Some(path)) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("{} is not valid JSON", path.display()))
        }
        (None, None) => Ok(json!({})),
    }
}

/// Verdict and outcome summary printed by `run`
pub fn summarize(report: &RunReport) -> Value {
    json!({
        "run_id": report.record.run_id,
        "pipeline_id": report.record.pipeline_id,
        "mode": report.record.mode,
        "outcome": report.record.outcome,
        "verdict": report.record.verdict,
        "supersedes": report.record.supersedes,
        "duration_ms": report.record.duration_ms,
        "persistence": report.persistence,
    })
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn run_with_cli(cli: Cli) -> Result<ExitCode> {
    let config = EngineConfig::discover(cli.config.as_deref())?;
    let metrics = match &cli.metrics_out {
        Some(_) => Some(Arc::new(MetricsTelemetry::new()?)),
        None => None,
    };
    let mut telemetry = FanoutTelemetry::new().with(Arc::new(TracingTelemetry));
    if let Some(metrics) = &metrics {
        telemetry = telemetry.with(metrics.clone());
    }
    let telemetry: Arc<dyn TelemetrySink> = Arc::new(telemetry);

    let code = match cli.command {
        Commands::Run(args) => run(&config, telemetry, args).await?,
        Commands::Records(cmd) => records(&config, telemetry, cmd).await?,
        Commands::Approvals(cmd) => approvals(&config, telemetry, cmd).await?,
        Commands::Prompt(args) => prompt(&config, args)?,
    };

    if let (Some(path), Some(metrics)) = (&cli.metrics_out, &metrics) {
        std::fs::write(path, metrics.encode()?)
            .with_context(|| format!("writing metrics to {}", path.display()))?;
    }
    Ok(ExitCode::from(code))
}

async fn orchestrator(config: &EngineConfig, telemetry: Arc<dyn TelemetrySink>) -> Result<Orchestrator> {
    if config.audit.dir.is_none() {
        warn!("No audit.dir configured, records are kept in memory for this process only");
    }
    Ok(Orchestrator::from_config(config, telemetry).await?)
}

async fn run(config: &EngineConfig, telemetry: Arc<dyn TelemetrySink>, args: RunArgs) -> Result<u8> {
    let input = read_input(args.input.as_deref(), args.input_file.as_deref())?;
    let orch = orchestrator(config, telemetry).await?;

    let mut request = RunRequest::new(args.mode, input);
    if let Some(original) = args.supersedes {
        request = request.superseding(original);
    }

    let cancel = CancelHandle::new();
    let on_interrupt = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling at the next stage boundary");
            on_interrupt.cancel();
        }
    });

    info!(run_id = %request.run_id, mode = %request.mode, "Submitting run");
    let report = orch.execute_with_cancel(request, &cancel).await;
    watcher.abort();

    print_json(&summarize(&report))?;
    Ok(exit_code(&report))
}

async fn records(config: &EngineConfig, telemetry: Arc<dyn TelemetrySink>, cmd: RecordsCommand) -> Result<u8> {
    let orch = orchestrator(config, telemetry).await?;
    match cmd {
        RecordsCommand::Show { run_id } => {
            let Some(record) = orch.audit().get(&run_id).await? else {
                bail!("no record for run '{}'", run_id);
            };
            let effective = record
                .verdict
                .as_ref()
                .map(|v| effective_confidence(v, Utc::now(), config.policy.decay.as_ref()));
            print_json(&json!({
                "record": record,
                "effective_confidence": effective,
            }))?;
        }
        RecordsCommand::List => {
            let rows: Vec<Value> = orch
                .audit()
                .list()
                .await?
                .iter()
                .map(|r| {
                    json!({
                        "run_id": r.run_id,
                        "outcome": r.outcome.label(),
                        "mode": r.mode,
                        "supersedes": r.supersedes,
                        "completed_at": r.completed_at,
                    })
                })
                .collect();
            print_json(&Value::Array(rows))?;
        }
    }
    Ok(EXIT_OK)
}

async fn approvals(config: &EngineConfig, telemetry: Arc<dyn TelemetrySink>, cmd: ApprovalsCommand) -> Result<u8> {
    let orch = orchestrator(config, telemetry).await?;
    let resolution = match cmd {
        ApprovalsCommand::List => {
            let Some(channel) = orch.approvals() else {
                bail!("no approval channel configured");
            };
            let pending = channel.pending().await?;
            print_json(&serde_json::to_value(&pending)?)?;
            return Ok(EXIT_OK);
        }
        ApprovalsCommand::Approve(args) => decision(Resolution::approve(&args.run_id, &args.actor), &args),
        ApprovalsCommand::Reject(args) => decision(Resolution::reject(&args.run_id, &args.actor), &args),
    };

    let report = orch.resolve(resolution).await?;
    print_json(&summarize(&report))?;
    match report.persistence {
        PersistenceStatus::Persisted { .. } => Ok(EXIT_OK),
        PersistenceStatus::NotPersisted { .. } => Ok(EXIT_NOT_PERSISTED),
    }
}

fn decision(resolution: Resolution, args: &DecisionArgs) -> Resolution {
    match &args.reason {
        Some(reason) => resolution.with_reason(reason.as_str()),
        None => resolution,
    }
}

fn prompt(config: &EngineConfig, args: PromptArgs) -> Result<u8> {
    let Some(path) = args.templates.as_ref().or(config.prompts.path.as_ref()) else {
        bail!("no template set: pass --templates or set prompts.path / GOVERN_TEMPLATES");
    };
    let vars: Value = serde_json::from_str(&args.vars).context("--vars is not valid JSON")?;
    let injector = PromptInjector::load(path)?;
    let rendered = injector.inject(&args.identity, args.action.as_deref(), &vars)?;

    if !rendered.missing.is_empty() {
        warn!(template = %rendered.template_id, missing = ?rendered.missing, "Placeholders without values");
    }
    println!("{}", rendered.text);
    Ok(EXIT_OK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use govern_core::{RunContext, RunMode, RunRecord};

    fn report(outcome: Outcome, persistence: PersistenceStatus) -> RunReport {
        RunReport {
            record: RunRecord {
                run_id: "r1".into(),
                pipeline_id: "intent→planner→executor@1.0.0".into(),
                mode: RunMode::Live,
                context: RunContext::new("r1", RunMode::Live, json!({})),
                verdict: None,
                outcome,
                duration_ms: 3,
                error: None,
                supersedes: None,
                completed_at: Utc::now(),
            },
            persistence,
        }
    }

    #[test]
    fn test_exit_codes() {
        let ok = PersistenceStatus::Persisted { attempts: 1 };
        let lost = PersistenceStatus::NotPersisted {
            attempts: 4,
            reason: "disk full".into(),
        };
        assert_eq!(exit_code(&report(Outcome::Approved, ok.clone())), EXIT_OK);
        assert_eq!(exit_code(&report(Outcome::Review, ok.clone())), EXIT_OK);
        assert_eq!(exit_code(&report(Outcome::Rejected, ok.clone())), EXIT_REJECTED);
        assert_eq!(
            exit_code(&report(Outcome::Failed { reason: "x".into() }, ok.clone())),
            EXIT_FAILED
        );
        assert_eq!(
            exit_code(&report(Outcome::Cancelled { reason: "x".into() }, ok)),
            EXIT_CANCELLED
        );
        assert_eq!(exit_code(&report(Outcome::Approved, lost)), EXIT_NOT_PERSISTED);
    }

    #[test]
    fn test_read_input() {
        assert_eq!(read_input(None, None).unwrap(), json!({}));
        assert_eq!(
            read_input(Some(r#"{"goal": "x"}"#), None).unwrap(),
            json!({"goal": "x"})
        );
        assert!(read_input(Some("{nope"), None).is_err());

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("in.json");
        std::fs::write(&path, r#"{"files_changed": 2}"#).unwrap();
        assert_eq!(
            read_input(None, Some(&path)).unwrap(),
            json!({"files_changed": 2})
        );
    }

    #[test]
    fn test_summary_shape() {
        let summary = summarize(&report(Outcome::Review, PersistenceStatus::Persisted { attempts: 2 }));
        assert_eq!(summary["outcome"]["status"], "REVIEW");
        assert_eq!(summary["mode"], "LIVE");
        assert_eq!(summary["persistence"]["state"], "PERSISTED");
        assert_eq!(summary["persistence"]["attempts"], 2);
    }
}
