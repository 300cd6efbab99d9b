//! Validator: one verdict per run, remote first, local fallback second

use crate::authority::ValidationAuthority;
use crate::fallback::LocalFallback;
use crate::request::VerdictRequest;
use govern_core::{
    GovernError, GovernanceLevel, RunContext, TelemetryEvent, TelemetrySink, Verdict,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;

#[derive(Clone)]
pub struct Validator {
    authority: Option<Arc<dyn ValidationAuthority>>,
    timeout: Duration,
    fallback: LocalFallback,
}

impl std::fmt::Debug for Validator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Validator")
            .field("authority", &self.authority.as_ref().map(|a| a.name()))
            .field("timeout", &self.timeout)
            .field("fallback", &self.fallback)
            .finish()
    }
}

impl Validator {
    pub fn new(authority: Arc<dyn ValidationAuthority>, timeout: Duration, fallback_level: GovernanceLevel) -> Self {
        Self {
            authority: Some(authority),
            timeout,
            fallback: LocalFallback::new(fallback_level),
        }
    }

    /// No authority configured; every verdict is a local fallback
    pub fn local_only(fallback_level: GovernanceLevel) -> Self {
        Self {
            authority: None,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            fallback: LocalFallback::new(fallback_level),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn has_authority(&self) -> bool {
        self.authority.is_some()
    }

    pub async fn validate(&self, ctx: &RunContext, telemetry: &dyn TelemetrySink) -> Result<Verdict, GovernError> {
        let request = VerdictRequest::from_context(ctx)?;
        self.validate_request(&request, telemetry).await
    }

    pub async fn validate_request(
        &self,
        request: &VerdictRequest,
        telemetry: &dyn TelemetrySink,
    ) -> Result<Verdict, GovernError> {
        let unavailable = match &self.authority {
            None => GovernError::ValidatorUnavailable("no authority configured".to_string()),
            Some(authority) => {
                match tokio::time::timeout(self.timeout, authority.validate(request)).await {
                    Ok(Ok(verdict)) => {
                        self.issued(&verdict, telemetry);
                        return Ok(verdict);
                    }
                    Ok(Err(e)) => GovernError::from(e),
                    Err(_) => GovernError::ValidatorUnavailable(format!(
                        "timed out after {} ms",
                        self.timeout.as_millis()
                    )),
                }
            }
        };

        if !unavailable.is_recoverable() {
            return Err(unavailable);
        }

        let reason = match &unavailable {
            GovernError::ValidatorUnavailable(reason) => reason.clone(),
            other => other.to_string(),
        };
        warn!(run_id = %request.run_id, reason = %reason, "Validator unavailable, using local fallback");
        telemetry.emit(&TelemetryEvent::ValidatorFallback {
            run_id: request.run_id.clone(),
            reason: reason.clone(),
        });

        let verdict = self.fallback.verdict(request, &reason)?;
        self.issued(&verdict, telemetry);
        Ok(verdict)
    }

    fn issued(&self, verdict: &Verdict, telemetry: &dyn TelemetrySink) {
        info!(
            run_id = %verdict.run_id,
            disposition = %verdict.disposition,
            confidence = verdict.confidence,
            level = %verdict.governance_level,
            origin = ?verdict.origin,
            "Verdict issued"
        );
        telemetry.emit(&TelemetryEvent::VerdictIssued {
            run_id: verdict.run_id.clone(),
            disposition: verdict.disposition.to_string(),
            origin: format!("{:?}", verdict.origin),
        });
    }
}
