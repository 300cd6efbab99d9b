//! Governance policy: per-level confidence thresholds and approval mandates
//!
//! Loaded once (usually from YAML) and read-only while runs execute.

use govern_core::{GovernError, GovernanceLevel};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("POLICY/PARSE: {0}")]
    Parse(String),

    #[error("POLICY/IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("POLICY/MISSING_LEVEL: no rule for {0}")]
    MissingLevel(GovernanceLevel),

    #[error("POLICY/THRESHOLD: {level} threshold {value} outside [0, 1]")]
    InvalidThreshold { level: GovernanceLevel, value: f64 },

    #[error("POLICY/DECAY: rate {0} must be finite and non-negative")]
    InvalidDecay(f64),
}

impl From<PolicyError> for GovernError {
    fn from(err: PolicyError) -> Self {
        GovernError::PolicyViolation(err.to_string())
    }
}

/// Rule for one governance level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelPolicy {
    /// Minimum confidence to auto-proceed
    pub min_confidence: f64,
    /// Human approval is mandatory regardless of confidence
    #[serde(default)]
    pub requires_approval: bool,
}

impl LevelPolicy {
    pub fn threshold(min_confidence: f64) -> Self {
        Self {
            min_confidence,
            requires_approval: false,
        }
    }

    pub fn mandatory_approval(min_confidence: f64) -> Self {
        Self {
            min_confidence,
            requires_approval: true,
        }
    }
}

/// Confidence decay applied when a stored verdict is read
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecayPolicy {
    pub rate_per_hour: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernancePolicy {
    #[serde(default = "default_policy_name")]
    pub name: String,
    pub levels: BTreeMap<GovernanceLevel, LevelPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decay: Option<DecayPolicy>,
}

fn default_policy_name() -> String {
    "custom".to_string()
}

impl GovernancePolicy {
    /// Default policy: HIGH and CRITICAL always halt for a human
    pub fn standard() -> Self {
        let mut levels = BTreeMap::new();
        levels.insert(GovernanceLevel::Low, LevelPolicy::threshold(0.75));
        levels.insert(GovernanceLevel::Medium, LevelPolicy::threshold(0.85));
        levels.insert(GovernanceLevel::High, LevelPolicy::mandatory_approval(0.95));
        levels.insert(GovernanceLevel::Critical, LevelPolicy::mandatory_approval(1.0));

        Self {
            name: "standard@1.0".to_string(),
            levels,
            decay: None,
        }
    }

    /// Stricter thresholds; MEDIUM also requires approval
    pub fn strict() -> Self {
        Self::standard()
            .named("strict@1.0")
            .with_level(GovernanceLevel::Low, LevelPolicy::threshold(0.9))
            .with_level(GovernanceLevel::Medium, LevelPolicy::mandatory_approval(0.95))
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_level(mut self, level: GovernanceLevel, rule: LevelPolicy) -> Self {
        self.levels.insert(level, rule);
        self
    }

    pub fn with_decay(mut self, rate_per_hour: f64) -> Self {
        self.decay = Some(DecayPolicy { rate_per_hour });
        self
    }

    pub fn level(&self, level: GovernanceLevel) -> Result<&LevelPolicy, PolicyError> {
        self.levels.get(&level).ok_or(PolicyError::MissingLevel(level))
    }

    /// Parse a policy from YAML and validate it
    pub fn from_yaml(yaml: &str) -> Result<Self, PolicyError> {
        let policy: Self = serde_yaml::from_str(yaml).map_err(|e| PolicyError::Parse(e.to_string()))?;
        policy.validate()?;
        Ok(policy)
    }

    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, PolicyError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Every level present, thresholds within [0, 1], decay rate sane
    pub fn validate(&self) -> Result<(), PolicyError> {
        for level in GovernanceLevel::ALL {
            let rule = self.level(level)?;
            if !(0.0..=1.0).contains(&rule.min_confidence) {
                return Err(PolicyError::InvalidThreshold {
                    level,
                    value: rule.min_confidence,
                });
            }
        }
        if let Some(decay) = &self.decay {
            if !decay.rate_per_hour.is_finite() || decay.rate_per_hour < 0.0 {
                return Err(PolicyError::InvalidDecay(decay.rate_per_hour));
            }
        }
        Ok(())
    }
}

impl Default for GovernancePolicy {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_policy_is_valid() {
        let policy = GovernancePolicy::standard();
        assert!(policy.validate().is_ok());
        assert!(policy.level(GovernanceLevel::Critical).unwrap().requires_approval);
        assert!(!policy.level(GovernanceLevel::Low).unwrap().requires_approval);
        assert!(GovernancePolicy::strict().validate().is_ok());
    }

    #[test]
    fn test_from_yaml() {
        let yaml = r#"
name: team@2
levels:
  LOW: { min_confidence: 0.9 }
  MEDIUM: { min_confidence: 0.95 }
  HIGH: { min_confidence: 0.99, requires_approval: true }
  CRITICAL: { min_confidence: 1.0, requires_approval: true }
decay:
  rate_per_hour: 0.05
"#;
        let policy = GovernancePolicy::from_yaml(yaml).unwrap();
        assert_eq!(policy.name, "team@2");
        assert_eq!(policy.level(GovernanceLevel::Low).unwrap().min_confidence, 0.9);
        assert_eq!(policy.decay, Some(DecayPolicy { rate_per_hour: 0.05 }));
    }

    #[test]
    fn test_missing_level_rejected() {
        let yaml = r#"
levels:
  LOW: { min_confidence: 0.9 }
"#;
        let err = GovernancePolicy::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, PolicyError::MissingLevel(GovernanceLevel::Medium)));
    }

    #[test]
    fn test_unknown_level_rejected() {
        let yaml = r#"
levels:
  SEVERE: { min_confidence: 0.9 }
"#;
        assert!(matches!(
            GovernancePolicy::from_yaml(yaml),
            Err(PolicyError::Parse(_))
        ));
    }

    #[test]
    fn test_invalid_threshold_and_decay() {
        let policy = GovernancePolicy::standard()
            .with_level(GovernanceLevel::High, LevelPolicy::threshold(1.5));
        assert!(matches!(
            policy.validate(),
            Err(PolicyError::InvalidThreshold { .. })
        ));

        let policy = GovernancePolicy::standard().with_decay(-1.0);
        assert!(matches!(policy.validate(), Err(PolicyError::InvalidDecay(_))));
    }
}
