//! Prometheus metrics fed from pipeline telemetry.
use govern_core::{TelemetryEvent, TelemetrySink};
use prometheus::{
    CounterVec, Encoder, Histogram, HistogramOpts, IntCounter, Opts, Registry, TextEncoder,
};

/// Telemetry sink that keeps run counters in its own registry
#[derive(Clone)]
pub struct MetricsTelemetry {
    registry: Registry,
    runs_total: CounterVec,
    stage_failures: CounterVec,
    fallbacks: IntCounter,
    persistence_retries: IntCounter,
    run_duration: Histogram,
}

impl MetricsTelemetry {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let runs_total = CounterVec::new(
            Opts::new("govern_runs_total", "Finished runs by outcome"),
            &["outcome", "persisted"],
        )?;
        let stage_failures = CounterVec::new(
            Opts::new("govern_stage_failures_total", "Stage failures that halted a run"),
            &["stage"],
        )?;
        let fallbacks = IntCounter::new(
            "govern_validator_fallbacks_total",
            "Verdicts derived locally because the authority was unavailable",
        )?;
        let persistence_retries = IntCounter::new(
            "govern_persistence_retries_total",
            "Failed audit writes",
        )?;
        let run_duration = Histogram::with_opts(
            HistogramOpts::new("govern_run_duration_seconds", "Run duration in seconds")
                .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0]),
        )?;

        registry.register(Box::new(runs_total.clone()))?;
        registry.register(Box::new(stage_failures.clone()))?;
        registry.register(Box::new(fallbacks.clone()))?;
        registry.register(Box::new(persistence_retries.clone()))?;
        registry.register(Box::new(run_duration.clone()))?;

        Ok(Self {
            registry,
            runs_total,
            stage_failures,
            fallbacks,
            persistence_retries,
            run_duration,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Text exposition format
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        encode(&self.registry)
    }
}

impl TelemetrySink for MetricsTelemetry {
    fn emit(&self, event: &TelemetryEvent) {
        match event {
            TelemetryEvent::RunFinished {
                outcome,
                duration_ms,
                persisted,
                ..
            } => {
                let persisted = if *persisted { "true" } else { "false" };
                self.runs_total.with_label_values(&[outcome.as_str(), persisted]).inc();
                self.run_duration.observe(*duration_ms as f64 / 1000.0);
            }
            TelemetryEvent::StageFailed { stage, .. } => {
                self.stage_failures.with_label_values(&[stage.as_str()]).inc();
            }
            TelemetryEvent::ValidatorFallback { .. } => self.fallbacks.inc(),
            TelemetryEvent::PersistenceRetry { .. } => self.persistence_retries.inc(),
            _ => {}
        }
    }
}

pub fn encode(registry: &Registry) -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&registry.gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_events() {
        let metrics = MetricsTelemetry::new().unwrap();
        metrics.emit(&TelemetryEvent::RunFinished {
            run_id: "r1".into(),
            outcome: "APPROVED".into(),
            duration_ms: 120,
            persisted: true,
        });
        metrics.emit(&TelemetryEvent::StageFailed {
            run_id: "r2".into(),
            stage: "planner".into(),
            reason: "boom".into(),
        });
        metrics.emit(&TelemetryEvent::ValidatorFallback {
            run_id: "r3".into(),
            reason: "timeout".into(),
        });

        assert_eq!(
            metrics
                .runs_total
                .with_label_values(&["APPROVED", "true"])
                .get(),
            1.0
        );
        assert_eq!(metrics.fallbacks.get(), 1);

        let text = metrics.encode().unwrap();
        assert!(text.contains("govern_runs_total"));
        assert!(text.contains("govern_stage_failures_total{stage=\"planner\"} 1"));
        assert!(text.contains("govern_run_duration_seconds_count 1"));
    }
}
