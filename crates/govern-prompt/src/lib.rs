//! Govern Prompt: template lookup and variable injection
//!
//! Lookup for `(identity, action)` is deterministic: identity match first,
//! then action match, then the declared default. Rendering is pure.

pub mod injector;
pub mod templates;

pub use injector::{missing_sections, missing_token, PromptInjector, RenderedPrompt};
pub use templates::{MatchKind, PromptError, PromptTemplate, TemplateSet};
