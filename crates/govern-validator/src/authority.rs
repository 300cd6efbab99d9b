//! Validation authorities

use crate::request::VerdictRequest;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use govern_core::{Disposition, GovernError, GovernanceLevel, Verdict, VerdictOrigin};
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AuthorityError {
    /// Could not reach the authority; the caller may fall back
    #[error("AUTHORITY/UNAVAILABLE: {0}")]
    Unavailable(String),

    /// The authority answered with something that is not a verdict
    #[error("AUTHORITY/MALFORMED: {0}")]
    Malformed(String),
}

impl From<AuthorityError> for GovernError {
    fn from(err: AuthorityError) -> Self {
        match err {
            AuthorityError::Unavailable(reason) => GovernError::ValidatorUnavailable(reason),
            AuthorityError::Malformed(reason) => GovernError::PolicyViolation(reason),
        }
    }
}

/// Issues the verdict for a run
#[async_trait]
pub trait ValidationAuthority: Send + Sync {
    fn name(&self) -> &str;

    async fn validate(&self, request: &VerdictRequest) -> Result<Verdict, AuthorityError>;
}

/// Wire shape of an authority response. Level is parsed by hand so an
/// unknown value is reported as a policy problem, not a transport one.
#[derive(Debug, Deserialize)]
struct RawVerdict {
    #[serde(default)]
    run_id: Option<String>,
    disposition: Disposition,
    confidence: f64,
    governance_level: String,
    #[serde(default)]
    signature: Option<String>,
    #[serde(default)]
    issued_at: Option<DateTime<Utc>>,
    #[serde(default)]
    reasoning: Option<String>,
}

impl RawVerdict {
    fn into_verdict(self, run_id: &str) -> Result<Verdict, AuthorityError> {
        if let Some(returned) = &self.run_id {
            if returned != run_id {
                return Err(AuthorityError::Malformed(format!(
                    "verdict for run '{}' returned for run '{}'",
                    returned, run_id
                )));
            }
        }

        let level: GovernanceLevel = self
            .governance_level
            .parse()
            .map_err(|e: govern_core::ParseLevelError| AuthorityError::Malformed(e.to_string()))?;

        let verdict = Verdict::issued_at(
            run_id,
            self.disposition,
            self.confidence,
            level,
            VerdictOrigin::Remote,
            self.reasoning.unwrap_or_default(),
            self.issued_at.unwrap_or_else(Utc::now),
        );

        Ok(match self.signature {
            Some(signature) if !signature.is_empty() => verdict.with_signature(signature),
            _ => verdict,
        })
    }
}

/// HTTP authority: `POST {endpoint}/v1/verdicts`
#[derive(Debug, Clone)]
pub struct RemoteAuthority {
    endpoint: String,
    client: Client,
}

impl RemoteAuthority {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, AuthorityError> {
        let client = Client::builder()
            .build()
            .map_err(|e| AuthorityError::Unavailable(format!("HTTP client: {}", e)))?;
        Ok(Self::with_client(endpoint, client))
    }

    pub fn with_client(endpoint: impl Into<String>, client: Client) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn verdicts_url(&self) -> String {
        format!("{}/v1/verdicts", self.endpoint)
    }
}

#[async_trait]
impl ValidationAuthority for RemoteAuthority {
    fn name(&self) -> &str {
        "remote"
    }

    async fn validate(&self, request: &VerdictRequest) -> Result<Verdict, AuthorityError> {
        let url = self.verdicts_url();
        debug!(run_id = %request.run_id, url = %url, "Requesting verdict");

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| AuthorityError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            // an answer, not an outage: the authority refused the run
            warn!(run_id = %request.run_id, status = %status, "Authority refused run");
            return Ok(Verdict::new(
                request.run_id.as_str(),
                Disposition::Rejected,
                0.0,
                request.proposed_level.unwrap_or_default(),
                VerdictOrigin::Remote,
                format!("authority responded with status {}", status.as_u16()),
            ));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| AuthorityError::Unavailable(e.to_string()))?;
        let raw: RawVerdict = serde_json::from_slice(&body)
            .map_err(|e| AuthorityError::Malformed(format!("unreadable verdict: {}", e)))?;

        raw.into_verdict(&request.run_id)
    }
}
