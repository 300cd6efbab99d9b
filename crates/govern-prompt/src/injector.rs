//! Variable injection
//!
//! Handlebars renders with HTML escaping off. A placeholder with no value,
//! at any depth including inside `{{#each}}` and `{{#with}}` blocks, renders
//! as the literal token `[[MISSING:name]]` through the `helperMissing` hook.
//! The `join` and `default` helpers mark a missing argument the same way.

use crate::templates::{MatchKind, PromptError, PromptTemplate, TemplateSet};
use handlebars::{Context, Handlebars, Helper, HelperResult, Output, PathAndJson, RenderContext};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

static MISSING_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\[MISSING:([^\]]+)\]\]").expect("missing token regex"));

static SECTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{~?\s*([#/])\s*([A-Za-z_]+)?\s*([A-Za-z_][A-Za-z0-9_\-.]*)?[^{}]*\}\}")
        .expect("section regex")
});

/// Marker rendered in place of a placeholder with no value
pub fn missing_token(name: &str) -> String {
    format!("[[MISSING:{}]]", name)
}

/// Resolve a dotted path (`repo.name`, `files.0`) against the variables
fn lookup<'a>(vars: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(vars, |current, key| match current {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn absent(param: Option<&PathAndJson<'_>>) -> bool {
    param.map_or(true, |p| p.is_value_missing() || p.value().is_null())
}

fn param_name(h: &Helper<'_>, idx: usize) -> String {
    h.param(idx)
        .and_then(|p| p.relative_path().cloned())
        .unwrap_or_else(|| format!("{}#{}", h.name(), idx))
}

fn missing_helper(
    h: &Helper<'_>,
    _: &Handlebars<'_>,
    _: &Context,
    _: &mut RenderContext<'_, '_>,
    out: &mut dyn Output,
) -> HelperResult {
    out.write(&missing_token(h.name()))?;
    Ok(())
}

fn join_helper(
    h: &Helper<'_>,
    _: &Handlebars<'_>,
    _: &Context,
    _: &mut RenderContext<'_, '_>,
    out: &mut dyn Output,
) -> HelperResult {
    if absent(h.param(0)) {
        out.write(&missing_token(&param_name(h, 0)))?;
        return Ok(());
    }
    let sep = h.param(1).and_then(|p| p.value().as_str()).unwrap_or(", ");
    let text = match h.param(0).map(|p| p.value()) {
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| v.as_str().map(String::from).unwrap_or_else(|| v.to_string()))
            .collect::<Vec<_>>()
            .join(sep),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    };
    out.write(&text)?;
    Ok(())
}

fn default_helper(
    h: &Helper<'_>,
    _: &Handlebars<'_>,
    _: &Context,
    _: &mut RenderContext<'_, '_>,
    out: &mut dyn Output,
) -> HelperResult {
    let chosen = if absent(h.param(0)) { h.param(1) } else { h.param(0) };
    match chosen.filter(|p| !absent(Some(*p))).map(|p| p.value()) {
        Some(Value::String(s)) => out.write(s)?,
        Some(other) => out.write(&other.to_string())?,
        // neither the value nor its fallback resolved
        None => out.write(&missing_token(&param_name(h, 0)))?,
    }
    Ok(())
}

/// Copy of `vars` without null object fields, so a null renders as missing
fn without_nulls(vars: &Value) -> Value {
    match vars {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), without_nulls(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(without_nulls).collect()),
        other => other.clone(),
    }
}

/// Top-level `#each` / `#with` sections whose subject has no value.
/// Such a section renders nothing, so it is reported rather than marked.
pub fn missing_sections(body: &str, vars: &Value) -> Vec<String> {
    let mut missing = Vec::new();
    let mut depth: usize = 0;
    for caps in SECTION.captures_iter(body) {
        match caps.get(1).map(|m| m.as_str()) {
            Some("#") => {
                let helper = caps.get(2).map(|m| m.as_str());
                if depth == 0 && matches!(helper, Some("each") | Some("with")) {
                    if let Some(path) = caps.get(3).map(|m| m.as_str()) {
                        let unresolved = matches!(lookup(vars, path), None | Some(Value::Null));
                        if unresolved && !missing.iter().any(|m| m == path) {
                            missing.push(path.to_string());
                        }
                    }
                }
                depth += 1;
            }
            Some("/") => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    missing
}

/// Names of the missing tokens in rendered text, in order of first appearance
fn collect_missing(text: &str, into: &mut Vec<String>) {
    for caps in MISSING_TOKEN.captures_iter(text) {
        if let Some(name) = caps.get(1).map(|m| m.as_str()) {
            if !into.iter().any(|m| m == name) {
                into.push(name.to_string());
            }
        }
    }
}

/// Output of one injection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedPrompt {
    pub template_id: String,
    pub matched_by: MatchKind,
    pub text: String,
    /// Placeholders that had no value
    pub missing: Vec<String>,
}

/// Template lookup plus substitution. Holds no I/O handles; the template
/// set is loaded separately.
pub struct PromptInjector {
    handlebars: Handlebars<'static>,
    templates: TemplateSet,
}

impl std::fmt::Debug for PromptInjector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptInjector")
            .field("templates", &self.templates.ids())
            .finish()
    }
}

impl PromptInjector {
    pub fn new(templates: TemplateSet) -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(false);
        handlebars.register_escape_fn(handlebars::no_escape);
        handlebars.register_helper("helperMissing", Box::new(missing_helper));
        handlebars.register_helper("join", Box::new(join_helper));
        handlebars.register_helper("default", Box::new(default_helper));

        Self {
            handlebars,
            templates,
        }
    }

    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, PromptError> {
        Ok(Self::new(TemplateSet::load(path)?))
    }

    pub fn templates(&self) -> &TemplateSet {
        &self.templates
    }

    /// Pick the best-fit template for `(identity, action)` and render it
    pub fn inject(
        &self,
        identity: &str,
        action: Option<&str>,
        vars: &Value,
    ) -> Result<RenderedPrompt, PromptError> {
        let (template, matched_by) = self.templates.select(identity, action)?;
        debug!(identity, action = ?action, template = %template.id, ?matched_by, "Template selected");
        self.render_template(template, matched_by, vars)
    }

    /// Render a template by id
    pub fn render(&self, id: &str, vars: &Value) -> Result<RenderedPrompt, PromptError> {
        let template = self
            .templates
            .get(id)
            .ok_or_else(|| PromptError::UnknownTemplate(id.to_string()))?;
        self.render_template(template, MatchKind::Identity, vars)
    }

    fn render_template(
        &self,
        template: &PromptTemplate,
        matched_by: MatchKind,
        vars: &Value,
    ) -> Result<RenderedPrompt, PromptError> {
        let text = self
            .handlebars
            .render_template(&template.body, &without_nulls(vars))
            .map_err(|e| PromptError::Render(format!("{}: {}", template.id, e)))?;

        let mut missing = Vec::new();
        collect_missing(&text, &mut missing);
        for section in missing_sections(&template.body, vars) {
            if !missing.contains(&section) {
                missing.push(section);
            }
        }

        Ok(RenderedPrompt {
            template_id: template.id.clone(),
            matched_by,
            text,
            missing,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn injector() -> PromptInjector {
        let set = TemplateSet::from_yaml(
            r#"
default: generic
templates:
  - id: code-reviewer
    tags: [review]
    actions: [review]
    body: "Review {{repo.name}} for {{author}}. Files: {{join files \", \"}}"
  - id: looped
    body: "{{#each steps}}- {{title}}\n{{/each}}Owner: {{owner}}"
  - id: generic
    body: "Handle <{{action}}> & {{default note \"no notes\"}}"
"#,
        )
        .unwrap();
        PromptInjector::new(set)
    }

    #[test]
    fn test_inject_with_all_values() {
        let out = injector()
            .inject(
                "reviewer",
                None,
                &json!({"repo": {"name": "core"}, "author": "ana", "files": ["a.rs", "b.rs"]}),
            )
            .unwrap();
        assert_eq!(out.template_id, "code-reviewer");
        assert_eq!(out.text, "Review core for ana. Files: a.rs, b.rs");
        assert!(out.missing.is_empty());
    }

    #[test]
    fn test_missing_placeholders_are_marked() {
        let out = injector()
            .inject("reviewer", None, &json!({"files": []}))
            .unwrap();
        assert_eq!(
            out.text,
            "Review [[MISSING:repo.name]] for [[MISSING:author]]. Files: "
        );
        assert_eq!(out.missing, vec!["repo.name", "author"]);
    }

    #[test]
    fn test_no_html_escaping() {
        let out = injector()
            .inject("nobody", Some("archive"), &json!({"action": "a&b"}))
            .unwrap();
        assert_eq!(out.template_id, "generic");
        assert_eq!(out.text, "Handle <a&b> & no notes");
    }

    #[test]
    fn test_block_bodies_are_left_to_handlebars() {
        let out = injector()
            .render("looped", &json!({"steps": [{"title": "plan"}, {"title": "apply"}]}))
            .unwrap();
        assert_eq!(out.text, "- plan\n- apply\nOwner: [[MISSING:owner]]");
        assert_eq!(out.missing, vec!["owner"]);
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let inj = injector();
        let vars = json!({"author": "ana"});
        let a = inj.inject("review", None, &vars).unwrap();
        let b = inj.inject("review", None, &vars).unwrap();
        assert_eq!(a, b);
    }

    fn single(body: &str) -> PromptInjector {
        let yaml = format!(
            "default: only\ntemplates:\n  - id: only\n    body: {}\n",
            serde_json::to_string(body).unwrap()
        );
        PromptInjector::new(TemplateSet::from_yaml(&yaml).unwrap())
    }

    #[test]
    fn test_missing_inside_blocks_and_helpers() {
        let out = single("{{#each steps}}[{{title}}]{{/each}} files: {{join files \", \"}}")
            .render("only", &json!({"steps": [{"x": 1}, {"title": "apply"}]}))
            .unwrap();
        assert_eq!(
            out.text,
            "[[[MISSING:title]]][apply] files: [[MISSING:files]]"
        );
        assert_eq!(out.missing, vec!["title", "files"]);
    }

    #[test]
    fn test_triple_stash_and_null_values_are_marked() {
        let out = single("{{a}} {{b}} {{{c}}}")
            .render("only", &json!({"a": 1, "b": null}))
            .unwrap();
        assert_eq!(out.text, "1 [[MISSING:b]] [[MISSING:c]]");
        assert_eq!(out.missing, vec!["b", "c"]);
    }

    #[test]
    fn test_default_without_any_value() {
        let out = single("{{default note missing_too}}")
            .render("only", &json!({}))
            .unwrap();
        assert_eq!(out.text, "[[MISSING:note]]");
        assert_eq!(out.missing, vec!["note"]);
    }

    #[test]
    fn test_missing_sections_are_reported() {
        let out = single("{{#each steps}}- {{this}}\n{{/each}}{{#with repo}}{{name}}{{/with}}done")
            .render("only", &json!({"repo": {"name": "core"}}))
            .unwrap();
        assert_eq!(out.text, "coredone");
        assert_eq!(out.missing, vec!["steps"]);
        assert_eq!(
            missing_sections("{{#each a}}{{#each b}}{{/each}}{{/each}}{{#if c}}{{/if}}", &json!({})),
            vec!["a"]
        );
    }

    #[test]
    fn test_unknown_template() {
        assert!(matches!(
            injector().render("nope", &json!({})),
            Err(PromptError::UnknownTemplate(_))
        ));
    }
}
