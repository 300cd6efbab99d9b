//! Persistence with bounded retries and exponential backoff

use crate::sink::{AuditError, AuditSink};
use govern_core::{PersistenceStatus, RunRecord, TelemetryEvent, TelemetrySink};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, warn};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;
pub const DEFAULT_BASE_DELAY_MS: u64 = 200;
pub const DEFAULT_MAX_DELAY_MS: u64 = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
}

fn default_max_delay() -> u64 {
    DEFAULT_MAX_DELAY_MS
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
        }
    }

    /// Delay before retry number `attempt` (1-based): base * 2^(attempt-1), capped
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let ms = self.base_delay_ms.saturating_mul(1u64 << exp);
        Duration::from_millis(ms.min(self.max_delay_ms))
    }
}

/// Write `record`, retrying transient failures. Never panics and never
/// returns an error: the caller gets a status it must surface.
pub async fn persist_with_retry(
    sink: &dyn AuditSink,
    record: &RunRecord,
    policy: &RetryPolicy,
    telemetry: &dyn TelemetrySink,
) -> PersistenceStatus {
    let max_attempts = policy.max_attempts.max(1);
    let mut last_error: Option<AuditError> = None;

    for attempt in 1..=max_attempts {
        match sink.put(record).await {
            Ok(()) => return PersistenceStatus::Persisted { attempts: attempt },
            Err(e) => {
                let transient = e.is_transient();
                warn!(
                    run_id = %record.run_id,
                    attempt,
                    max_attempts,
                    error = %e,
                    "Audit write failed"
                );
                telemetry.emit(&TelemetryEvent::PersistenceRetry {
                    run_id: record.run_id.clone(),
                    attempt,
                    reason: e.to_string(),
                });
                last_error = Some(e);

                if !transient {
                    return not_persisted(record, attempt, last_error);
                }
                if attempt < max_attempts {
                    tokio::time::sleep(policy.delay_for(attempt)).await;
                }
            }
        }
    }

    not_persisted(record, max_attempts, last_error)
}

fn not_persisted(record: &RunRecord, attempts: u32, last_error: Option<AuditError>) -> PersistenceStatus {
    let reason = last_error
        .map(|e| e.to_string())
        .unwrap_or_else(|| "no attempt made".to_string());
    error!(run_id = %record.run_id, attempts, reason = %reason, "Run record NOT persisted");
    PersistenceStatus::NotPersisted { attempts, reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{record, FlakySink};
    use govern_core::{MemoryTelemetry, NoopTelemetry, Outcome};

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, 1)
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for(5), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for(60), Duration::from_millis(1_000));
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let sink = FlakySink::failing_first(2);
        let status =
            persist_with_retry(&sink, &record("r", Outcome::Approved), &fast(4), &NoopTelemetry).await;
        assert_eq!(status, PersistenceStatus::Persisted { attempts: 3 });
        assert_eq!(sink.inner.writes(), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_not_persisted() {
        let sink = FlakySink::always_failing();
        let telemetry = MemoryTelemetry::new();
        let status =
            persist_with_retry(&sink, &record("r", Outcome::Review), &fast(3), &telemetry).await;

        match status {
            PersistenceStatus::NotPersisted { attempts, reason } => {
                assert_eq!(attempts, 3);
                assert!(reason.contains("AUDIT/UNAVAILABLE"));
            }
            other => panic!("expected NotPersisted, got {:?}", other),
        }
        let retries = telemetry
            .events()
            .into_iter()
            .filter(|e| matches!(e, TelemetryEvent::PersistenceRetry { .. }))
            .count();
        assert_eq!(retries, 3);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let sink = crate::MemoryAuditSink::new();
        let status =
            persist_with_retry(&sink, &record("bad/id", Outcome::Approved), &fast(5), &NoopTelemetry).await;
        assert!(matches!(status, PersistenceStatus::NotPersisted { attempts: 1, .. }));
    }
}
