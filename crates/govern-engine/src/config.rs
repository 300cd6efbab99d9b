//! Engine configuration
//!
//! Read from YAML (`--config`, else `govern.yaml` in the working directory,
//! else built-in defaults), then overridden from the environment:
//!
//! | Variable                      | Field                  |
//! |-------------------------------|------------------------|
//! | `GOVERN_VALIDATOR_URL`        | `validator.endpoint`   |
//! | `GOVERN_VALIDATOR_TIMEOUT_MS` | `validator.timeout_ms` |
//! | `GOVERN_AUDIT_DIR`            | `audit.dir`            |
//! | `GOVERN_APPROVALS_DIR`        | `approvals.dir`        |
//! | `GOVERN_TEMPLATES`            | `prompts.path`         |

use govern_core::{GovernError, GovernanceLevel};
use govern_policy::{GovernancePolicy, PolicyError};
use govern_stages::PlanLimits;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_CONFIG_FILE: &str = "govern.yaml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("CONFIG/IO: {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CONFIG/PARSE: {0}")]
    Parse(String),

    #[error("CONFIG/ENV: {var}: {reason}")]
    Env { var: String, reason: String },

    #[error("CONFIG/INVALID: {0}")]
    Invalid(String),

    #[error(transparent)]
    Policy(#[from] PolicyError),
}

impl From<ConfigError> for GovernError {
    fn from(err: ConfigError) -> Self {
        GovernError::Config(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Base URL of the validation authority; none means local fallback only
    pub endpoint: Option<String>,
    pub timeout_ms: u64,
    pub fallback_level: GovernanceLevel,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: govern_validator::DEFAULT_TIMEOUT_MS,
            fallback_level: GovernanceLevel::Medium,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Record directory; none keeps records in memory
    pub dir: Option<PathBuf>,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        let retry = govern_audit::RetryPolicy::default();
        Self {
            dir: None,
            max_attempts: retry.max_attempts,
            base_delay_ms: retry.base_delay_ms,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalsConfig {
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    /// Template set rendered by the planner
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub policy: GovernancePolicy,
    pub validator: ValidatorConfig,
    pub audit: AuditConfig,
    pub approvals: ApprovalsConfig,
    pub prompts: PromptsConfig,
    pub planner: PlanLimits,
}

impl EngineConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Explicit path, else `govern.yaml` if present, else defaults; then the environment
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match explicit {
            Some(path) => Self::load(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => Self::load(DEFAULT_CONFIG_FILE)?,
            None => Self::default(),
        };
        config.apply_overrides(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `GOVERN_*` overrides read through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("GOVERN_VALIDATOR_URL") {
            debug!(endpoint = %url, "Validator endpoint from environment");
            self.validator.endpoint = Some(url).filter(|u| !u.trim().is_empty());
        }
        if let Some(ms) = lookup("GOVERN_VALIDATOR_TIMEOUT_MS") {
            self.validator.timeout_ms = ms.trim().parse().map_err(|_| ConfigError::Env {
                var: "GOVERN_VALIDATOR_TIMEOUT_MS".to_string(),
                reason: format!("'{}' is not a number of milliseconds", ms),
            })?;
        }
        if let Some(dir) = lookup("GOVERN_AUDIT_DIR") {
            self.audit.dir = Some(PathBuf::from(dir));
        }
        if let Some(dir) = lookup("GOVERN_APPROVALS_DIR") {
            self.approvals.dir = Some(PathBuf::from(dir));
        }
        if let Some(path) = lookup("GOVERN_TEMPLATES") {
            self.prompts.path = Some(PathBuf::from(path));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.policy.validate()?;

        if self.audit.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "audit.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.validator.timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "validator.timeout_ms must be positive".to_string(),
            ));
        }
        if let Some(endpoint) = &self.validator.endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(ConfigError::Invalid(format!(
                    "validator.endpoint '{}' is not an http(s) URL",
                    endpoint
                )));
            }
        }
        if self.planner.max_files == 0 || self.planner.max_lines == 0 {
            return Err(ConfigError::Invalid(
                "planner limits must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
