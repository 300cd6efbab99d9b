//! Verdict types: disposition, governance level, and the signed verdict itself

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Policy tier of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GovernanceLevel {
    /// 0-30: read-only, small changes
    #[default]
    Low = 0,
    /// 31-60: moderate changes
    Medium = 1,
    /// 61-80: significant changes, deletions
    High = 2,
    /// 81-100: mass operations, production changes
    Critical = 3,
}

impl GovernanceLevel {
    pub const ALL: [GovernanceLevel; 4] = [
        GovernanceLevel::Low,
        GovernanceLevel::Medium,
        GovernanceLevel::High,
        GovernanceLevel::Critical,
    ];

    /// Get the level from a risk score (0-100)
    pub fn from_score(score: u32) -> Self {
        match score {
            0..=30 => GovernanceLevel::Low,
            31..=60 => GovernanceLevel::Medium,
            61..=80 => GovernanceLevel::High,
            _ => GovernanceLevel::Critical,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GovernanceLevel::Low => "LOW",
            GovernanceLevel::Medium => "MEDIUM",
            GovernanceLevel::High => "HIGH",
            GovernanceLevel::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for GovernanceLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown governance level '{0}'")]
pub struct ParseLevelError(pub String);

impl FromStr for GovernanceLevel {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOW" => Ok(GovernanceLevel::Low),
            "MEDIUM" => Ok(GovernanceLevel::Medium),
            "HIGH" => Ok(GovernanceLevel::High),
            "CRITICAL" => Ok(GovernanceLevel::Critical),
            _ => Err(ParseLevelError(s.to_string())),
        }
    }
}

/// Validator judgment, ordered by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Disposition {
    Approved = 0,
    Review = 1,
    Rejected = 2,
}

impl Disposition {
    /// Combine two dispositions, taking the more severe one
    pub fn combine(self, other: Disposition) -> Disposition {
        self.max(other)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Approved => "APPROVED",
            Disposition::Review => "REVIEW",
            Disposition::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a verdict came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerdictOrigin {
    /// Issued by the remote validation authority
    Remote,
    /// Derived locally because the authority was unreachable
    LocalFallback,
    /// Recorded from a human approval decision
    Human,
}

/// The single judgment issued for a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub run_id: String,
    pub disposition: Disposition,
    pub confidence: f64,
    pub governance_level: GovernanceLevel,
    pub signature: String,
    pub issued_at: DateTime<Utc>,
    pub origin: VerdictOrigin,
    #[serde(default)]
    pub reasoning: String,
}

impl Verdict {
    /// Create a verdict issued now and signed locally
    pub fn new(
        run_id: impl Into<String>,
        disposition: Disposition,
        confidence: f64,
        governance_level: GovernanceLevel,
        origin: VerdictOrigin,
        reasoning: impl Into<String>,
    ) -> Self {
        Self::issued_at(
            run_id,
            disposition,
            confidence,
            governance_level,
            origin,
            reasoning,
            Utc::now(),
        )
    }

    /// Create a verdict with an explicit issue time
    pub fn issued_at(
        run_id: impl Into<String>,
        disposition: Disposition,
        confidence: f64,
        governance_level: GovernanceLevel,
        origin: VerdictOrigin,
        reasoning: impl Into<String>,
        issued_at: DateTime<Utc>,
    ) -> Self {
        let mut verdict = Self {
            run_id: run_id.into(),
            disposition,
            confidence,
            governance_level,
            signature: String::new(),
            issued_at,
            origin,
            reasoning: reasoning.into(),
        };
        verdict.signature = verdict.compute_signature();
        verdict
    }

    /// Replace the local signature with one supplied by the issuer
    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = signature.into();
        self
    }

    /// Digest over the fields that identify this verdict
    pub fn compute_signature(&self) -> String {
        let material = format!(
            "{}|{}|{:.6}|{}|{}|{:?}",
            self.run_id,
            self.disposition,
            self.confidence,
            self.governance_level,
            self.issued_at.to_rfc3339(),
            self.origin,
        );
        crate::hash_bytes(material.as_bytes())
    }

    /// Whether the signature matches the fields (only meaningful for locally signed verdicts)
    pub fn verify_signature(&self) -> bool {
        self.signature == self.compute_signature()
    }

    /// False when the verdict is a local stand-in for the authority
    pub fn is_authoritative(&self) -> bool {
        self.origin != VerdictOrigin::LocalFallback
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} ({:.2}, {}, {:?})",
            self.disposition, self.confidence, self.governance_level, self.origin
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_from_score() {
        assert_eq!(GovernanceLevel::from_score(0), GovernanceLevel::Low);
        assert_eq!(GovernanceLevel::from_score(45), GovernanceLevel::Medium);
        assert_eq!(GovernanceLevel::from_score(75), GovernanceLevel::High);
        assert_eq!(GovernanceLevel::from_score(100), GovernanceLevel::Critical);
    }

    #[test]
    fn test_level_parse() {
        assert_eq!("critical".parse::<GovernanceLevel>(), Ok(GovernanceLevel::Critical));
        assert_eq!(" LOW ".parse::<GovernanceLevel>(), Ok(GovernanceLevel::Low));
        assert!("SEVERE".parse::<GovernanceLevel>().is_err());
    }

    #[test]
    fn test_disposition_combine() {
        assert_eq!(
            Disposition::Approved.combine(Disposition::Review),
            Disposition::Review
        );
        assert_eq!(
            Disposition::Rejected.combine(Disposition::Approved),
            Disposition::Rejected
        );
    }

    #[test]
    fn test_verdict_signature() {
        let verdict = Verdict::new(
            "run-1",
            Disposition::Approved,
            0.92,
            GovernanceLevel::Low,
            VerdictOrigin::LocalFallback,
            "fallback",
        );
        assert!(verdict.signature.starts_with("blake3:"));
        assert!(verdict.verify_signature());
        assert!(!verdict.is_authoritative());

        let mut tampered = verdict.clone();
        tampered.disposition = Disposition::Rejected;
        assert!(!tampered.verify_signature());
    }

    #[test]
    fn test_verdict_serialization() {
        let verdict = Verdict::new(
            "run-2",
            Disposition::Review,
            0.5,
            GovernanceLevel::High,
            VerdictOrigin::Remote,
            "needs eyes",
        );
        let json = serde_json::to_string(&verdict).unwrap();
        assert!(json.contains("\"REVIEW\""));
        assert!(json.contains("\"HIGH\""));

        let parsed: Verdict = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, verdict);
    }
}
