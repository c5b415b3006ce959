//! Template rendering for node parameters.
//!
//! Supported placeholders:
//! - `{{ input }}` and `{{ input.path.to.field }}` (the current item)
//! - `{{ nodes.<id>.output }}` and `{{ nodes.<id>.output.field }}`
//! - `{{ env.VAR }}` for allow-listed environment variables
//!
//! Placeholders that do not resolve are left untouched so later stages
//! (e.g. the endpoint's project id) can fill them in.

use std::sync::OnceLock;

use regex_lite::Regex;
use serde_json::Value;

use super::types::NodeContext;

fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER_REGEX: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER_REGEX.get_or_init(|| {
        Regex::new(r"\{\{\s*((?:input|nodes\.[\w-]+\.output)(?:\.[\w-]+)*)\s*\}\}")
            .expect("valid regex")
    })
}

fn whole_placeholder_regex() -> &'static Regex {
    static WHOLE_REGEX: OnceLock<Regex> = OnceLock::new();
    WHOLE_REGEX.get_or_init(|| {
        Regex::new(r"^\{\{\s*((?:input|nodes\.[\w-]+\.output)(?:\.[\w-]+)*)\s*\}\}$")
            .expect("valid regex")
    })
}

fn env_template_regex() -> &'static Regex {
    static ENV_TEMPLATE_REGEX: OnceLock<Regex> = OnceLock::new();
    ENV_TEMPLATE_REGEX
        .get_or_init(|| Regex::new(r"\{\{\s*env\.(\w+)\s*\}\}").expect("valid regex"))
}

/// Check if an environment variable is safe to expose in templates.
///
/// Only R8R_* variables are allowed, plus any listed in
/// R8R_ALLOWED_ENV_VARS (comma-separated).
pub fn is_safe_env_var(var_name: &str) -> bool {
    if var_name.starts_with("R8R_") {
        return true;
    }

    std::env::var("R8R_ALLOWED_ENV_VARS")
        .map(|allowed| allowed.split(',').any(|v| v.trim() == var_name))
        .unwrap_or(false)
}

/// Resolve a dotted placeholder path against the context.
fn lookup<'a>(path: &str, ctx: &'a NodeContext) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = match segments.next()? {
        "input" => &ctx.input,
        "nodes" => {
            let node_id = segments.next()?;
            // Skip the literal "output" segment
            segments.next()?;
            ctx.node_outputs.get(node_id)?
        }
        _ => return None,
    };

    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(arr) => arr.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        _ => value.to_string(),
    }
}

/// Render all placeholders in a string.
pub fn render_template(template: &str, ctx: &NodeContext) -> String {
    let rendered = placeholder_regex().replace_all(template, |caps: &regex_lite::Captures| {
        lookup(&caps[1], ctx)
            .map(value_to_string)
            .unwrap_or_else(|| caps[0].to_string())
    });

    env_template_regex()
        .replace_all(&rendered, |caps: &regex_lite::Captures| {
            let var_name = &caps[1];
            if is_safe_env_var(var_name) {
                std::env::var(var_name).unwrap_or_default()
            } else {
                tracing::warn!(
                    "Blocked access to environment variable '{}' in template (not in allowlist)",
                    var_name
                );
                String::new()
            }
        })
        .to_string()
}

/// Render placeholders in a JSON value recursively.
///
/// A string that is exactly one placeholder takes the referenced value as-is,
/// keeping its JSON type.
pub fn render_value(value: &Value, ctx: &NodeContext) -> Value {
    match value {
        Value::String(s) => {
            if let Some(caps) = whole_placeholder_regex().captures(s.trim()) {
                if let Some(resolved) = lookup(&caps[1], ctx) {
                    return resolved.clone();
                }
            }
            Value::String(render_template(s, ctx))
        }
        Value::Object(obj) => Value::Object(
            obj.iter()
                .map(|(k, v)| (k.clone(), render_value(v, ctx)))
                .collect(),
        ),
        Value::Array(arr) => Value::Array(arr.iter().map(|v| render_value(v, ctx)).collect()),
        _ => value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> NodeContext {
        let mut ctx = NodeContext::new("exec-1", "docs").with_input(json!({
            "branch": "feature/api",
            "meta": {"ticket": 42},
            "tags": ["a", "b"]
        }));
        ctx.add_output("fetch", json!({"job_id": "sess_9"}));
        ctx
    }

    #[test]
    fn test_render_input_fields() {
        let ctx = ctx();
        assert_eq!(render_template("{{ input.branch }}", &ctx), "feature/api");
        assert_eq!(render_template("#{{input.meta.ticket}}", &ctx), "#42");
        assert_eq!(render_template("{{ input.tags.1 }}", &ctx), "b");
    }

    #[test]
    fn test_render_node_outputs() {
        let ctx = ctx();
        assert_eq!(
            render_template("/job/{{ nodes.fetch.output.job_id }}", &ctx),
            "/job/sess_9"
        );
        assert_eq!(
            render_template("{{ nodes.fetch.output }}", &ctx),
            r#"{"job_id":"sess_9"}"#
        );
    }

    #[test]
    fn test_unresolved_placeholders_are_kept() {
        let ctx = ctx();
        assert_eq!(
            render_template("/agent/{{ credentials.project_id }}/x", &ctx),
            "/agent/{{ credentials.project_id }}/x"
        );
        assert_eq!(
            render_template("{{ input.missing }}", &ctx),
            "{{ input.missing }}"
        );
    }

    #[test]
    fn test_render_value_keeps_types() {
        let ctx = ctx();
        let rendered = render_value(
            &json!({
                "ticket": "{{ input.meta.ticket }}",
                "title": "Ticket {{ input.meta.ticket }}",
                "list": ["{{ input.tags }}"],
                "flag": true
            }),
            &ctx,
        );
        assert_eq!(rendered["ticket"], json!(42));
        assert_eq!(rendered["title"], json!("Ticket 42"));
        assert_eq!(rendered["list"], json!([["a", "b"]]));
        assert_eq!(rendered["flag"], json!(true));
    }

    #[test]
    fn test_env_allowed_and_blocked() {
        std::env::set_var("R8R_MINTLIFY_TEST_BRANCH", "release");
        std::env::set_var("MINTLIFY_TEMPLATE_SECRET", "hunter2");
        let ctx = ctx();

        assert_eq!(
            render_template("{{ env.R8R_MINTLIFY_TEST_BRANCH }}", &ctx),
            "release"
        );
        assert_eq!(render_template("[{{ env.MINTLIFY_TEMPLATE_SECRET }}]", &ctx), "[]");
    }
}
