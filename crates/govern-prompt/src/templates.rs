//! Prompt template sets and lookup
//!
//! Templates are declared as an ordered YAML list:
//!
//! ```yaml
//! version: "1.0"
//! default: generic
//! templates:
//!   - id: code-reviewer
//!     tags: [review, pull-request]
//!     actions: [review]
//!     body: "Review {{repo}} as {{identity}}"
//!   - id: generic
//!     body: "Handle {{action}}"
//! ```

use govern_core::GovernError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PromptError {
    #[error("PROMPT/PARSE: {0}")]
    Parse(String),

    #[error("PROMPT/IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("PROMPT/EMPTY: template set declares no templates")]
    Empty,

    #[error("PROMPT/DUPLICATE: template id '{0}' declared twice")]
    DuplicateId(String),

    #[error("PROMPT/DEFAULT: default template '{0}' is not declared")]
    UnknownDefault(String),

    #[error("PROMPT/TEMPLATE: '{id}' does not compile: {reason}")]
    Template { id: String, reason: String },

    #[error("PROMPT/NO_MATCH: nothing fits identity '{identity}' and no default is declared")]
    NoTemplate { identity: String },

    #[error("PROMPT/UNKNOWN: no template with id '{0}'")]
    UnknownTemplate(String),

    #[error("PROMPT/RENDER: {0}")]
    Render(String),
}

impl From<PromptError> for GovernError {
    fn from(err: PromptError) -> Self {
        GovernError::Config(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub actions: Vec<String>,
    pub body: String,
}

impl PromptTemplate {
    pub fn new(id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            tags: Vec::new(),
            actions: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_actions(mut self, actions: &[&str]) -> Self {
        self.actions = actions.iter().map(|a| a.to_string()).collect();
        self
    }

    /// Identity equals or is contained in the id or a tag, ignoring case
    pub fn matches_identity(&self, identity: &str) -> bool {
        let needle = identity.trim().to_lowercase();
        if needle.is_empty() {
            return false;
        }
        std::iter::once(&self.id)
            .chain(self.tags.iter())
            .any(|candidate| candidate.to_lowercase().contains(&needle))
    }

    pub fn matches_action(&self, action: &str) -> bool {
        let action = action.trim();
        !action.is_empty() && self.actions.iter().any(|a| a.eq_ignore_ascii_case(action))
    }
}

/// Why a template was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Identity,
    Action,
    Default,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateSet {
    #[serde(default = "default_version")]
    pub version: String,
    /// Template used when neither identity nor action match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    pub templates: Vec<PromptTemplate>,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl TemplateSet {
    pub fn new(templates: Vec<PromptTemplate>) -> Result<Self, PromptError> {
        let set = Self {
            version: default_version(),
            default: None,
            templates,
        };
        set.validate()?;
        Ok(set)
    }

    pub fn with_default(mut self, id: impl Into<String>) -> Result<Self, PromptError> {
        self.default = Some(id.into());
        self.validate()?;
        Ok(self)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, PromptError> {
        let set: Self = serde_yaml::from_str(yaml).map_err(|e| PromptError::Parse(e.to_string()))?;
        set.validate()?;
        Ok(set)
    }

    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, PromptError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn validate(&self) -> Result<(), PromptError> {
        if self.templates.is_empty() {
            return Err(PromptError::Empty);
        }

        let mut seen = HashSet::new();
        for template in &self.templates {
            if !seen.insert(template.id.as_str()) {
                return Err(PromptError::DuplicateId(template.id.clone()));
            }
            handlebars::Template::compile(&template.body).map_err(|e| PromptError::Template {
                id: template.id.clone(),
                reason: e.to_string(),
            })?;
        }

        if let Some(default) = &self.default {
            if self.get(default).is_none() {
                return Err(PromptError::UnknownDefault(default.clone()));
            }
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&PromptTemplate> {
        self.templates.iter().find(|t| t.id == id)
    }

    pub fn ids(&self) -> Vec<&str> {
        self.templates.iter().map(|t| t.id.as_str()).collect()
    }

    /// The declared default, or a template literally named `default`
    pub fn default_template(&self) -> Option<&PromptTemplate> {
        match &self.default {
            Some(id) => self.get(id),
            None => self.get("default"),
        }
    }

    /// Best-fit template: identity match, then action match, then default.
    /// Ties go to the earlier declaration.
    pub fn select(
        &self,
        identity: &str,
        action: Option<&str>,
    ) -> Result<(&PromptTemplate, MatchKind), PromptError> {
        if let Some(t) = self.templates.iter().find(|t| t.matches_identity(identity)) {
            return Ok((t, MatchKind::Identity));
        }
        if let Some(action) = action {
            if let Some(t) = self.templates.iter().find(|t| t.matches_action(action)) {
                return Ok((t, MatchKind::Action));
            }
        }
        self.default_template()
            .map(|t| (t, MatchKind::Default))
            .ok_or_else(|| PromptError::NoTemplate {
                identity: identity.to_string(),
            })
    }
}
