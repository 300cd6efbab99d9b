//! Pipeline Definition: ordered stages plus the governance policy
use govern_core::{GovernError, Stage, GOVERN_VERSION};
use govern_policy::GovernancePolicy;
use std::collections::HashSet;
use std::sync::Arc;

pub struct PipelineDefinition {
    stages: Vec<Arc<dyn Stage>>,
    policy: GovernancePolicy,
    pipeline_id: String,
}

impl std::fmt::Debug for PipelineDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineDefinition")
            .field("pipeline_id", &self.pipeline_id)
            .field("policy", &self.policy.name)
            .finish()
    }
}

impl PipelineDefinition {
    /// Stages run in the given order. Empty pipelines, duplicate stage
    /// names and incomplete policies are rejected here, not mid-run.
    pub fn new(stages: Vec<Arc<dyn Stage>>, policy: GovernancePolicy) -> Result<Self, GovernError> {
        if stages.is_empty() {
            return Err(GovernError::Config("pipeline declares no stages".to_string()));
        }

        let mut seen = HashSet::new();
        for stage in &stages {
            if stage.name().trim().is_empty() {
                return Err(GovernError::Config("stage with an empty name".to_string()));
            }
            if !seen.insert(stage.name().to_string()) {
                return Err(GovernError::Config(format!(
                    "stage '{}' declared twice",
                    stage.name()
                )));
            }
        }
        policy.validate()?;

        let pipeline_id = format!(
            "{}@{}",
            stages
                .iter()
                .map(|s| s.name())
                .collect::<Vec<_>>()
                .join("→"),
            GOVERN_VERSION
        );

        Ok(Self {
            stages,
            policy,
            pipeline_id,
        })
    }

    /// intent → planner → executor under the given policy
    pub fn standard(policy: GovernancePolicy) -> Result<Self, GovernError> {
        Self::new(govern_stages::standard_pipeline(), policy)
    }

    pub fn pipeline_id(&self) -> &str {
        &self.pipeline_id
    }

    pub fn stages(&self) -> &[Arc<dyn Stage>] {
        &self.stages
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn policy(&self) -> &GovernancePolicy {
        &self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use govern_core::{GovernanceLevel, StageOutput};
    use govern_policy::LevelPolicy;
    use govern_stages::FnStage;
    use serde_json::json;

    fn stage(name: &str) -> Arc<dyn Stage> {
        Arc::new(FnStage::new(name, |_| Ok(StageOutput::new(json!({})))).ungoverned())
    }

    #[test]
    fn test_pipeline_id() {
        let pipeline =
            PipelineDefinition::new(vec![stage("a"), stage("b")], GovernancePolicy::standard())
                .unwrap();
        assert_eq!(pipeline.pipeline_id(), format!("a→b@{}", GOVERN_VERSION));
        assert_eq!(pipeline.stage_names(), vec!["a", "b"]);
    }

    #[test]
    fn test_standard() {
        let pipeline = PipelineDefinition::standard(GovernancePolicy::standard()).unwrap();
        assert_eq!(pipeline.stage_names(), vec!["intent", "planner", "executor"]);
    }

    #[test]
    fn test_empty_pipeline_is_config_error() {
        let err = PipelineDefinition::new(vec![], GovernancePolicy::standard()).unwrap_err();
        assert!(matches!(err, GovernError::Config(_)));
    }

    #[test]
    fn test_duplicate_stage_names() {
        let err = PipelineDefinition::new(vec![stage("a"), stage("a")], GovernancePolicy::standard())
            .unwrap_err();
        assert!(err.to_string().contains("declared twice"));
    }

    #[test]
    fn test_invalid_policy() {
        let policy =
            GovernancePolicy::standard().with_level(GovernanceLevel::Low, LevelPolicy::threshold(1.5));
        let err = PipelineDefinition::new(vec![stage("a")], policy).unwrap_err();
        assert!(matches!(err, GovernError::PolicyViolation(_)));
    }
}
