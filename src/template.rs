//! Template rendering - `{{path}}` placeholders resolved against the run context
//!
//! ```yaml
//! kind:
//!   type: api_call
//!   url: "https://api.example.com/users/{{start_result.payload.user_id}}"
//!   headers:
//!     Authorization: "Bearer {{token}}"
//! ```
//!
//! Paths are dotted; numeric segments index into arrays. Unknown paths render
//! as empty strings.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*([\w.\-]+)\s*\}\}").expect("valid placeholder pattern"))
}

/// Resolve a dotted path (`fetch.body.items.0.name`) inside `context`
pub fn lookup<'a>(context: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }
    path.split('.').try_fold(context, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Extract placeholder paths from a template
pub fn placeholders(template: &str) -> Vec<String> {
    placeholder_re()
        .captures_iter(template)
        .map(|cap| cap[1].to_string())
        .collect()
}

/// Render a template string against the context
pub fn render(template: &str, context: &Value) -> String {
    placeholder_re()
        .replace_all(template, |caps: &regex::Captures| match lookup(context, &caps[1]) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        })
        .into_owned()
}

/// Render every string leaf of a JSON value
pub fn render_value(value: &Value, context: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(render(s, context)),
        Value::Array(items) => Value::Array(items.iter().map(|v| render_value(v, context)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), render_value(v, context)))
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context() -> Value {
        json!({
            "user": { "name": "Ada", "id": 42, "tags": ["a", "b"] },
            "empty": null
        })
    }

    #[test]
    fn test_lookup_paths() {
        let ctx = context();
        assert_eq!(lookup(&ctx, "user.name"), Some(&json!("Ada")));
        assert_eq!(lookup(&ctx, "user.tags.1"), Some(&json!("b")));
        assert_eq!(lookup(&ctx, "user.tags.9"), None);
        assert_eq!(lookup(&ctx, "user.name.first"), None);
        assert_eq!(lookup(&ctx, ""), None);
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(
            placeholders("/users/{{user.id}}/tags/{{ user.tags.0 }}"),
            vec!["user.id", "user.tags.0"]
        );
        assert!(placeholders("no placeholders").is_empty());
    }

    #[test]
    fn test_render() {
        let ctx = context();
        assert_eq!(render("Hi {{user.name}} #{{user.id}}", &ctx), "Hi Ada #42");
        assert_eq!(render("[{{missing}}][{{empty}}]", &ctx), "[][]");
    }

    #[test]
    fn test_render_value() {
        let ctx = context();
        let body = json!({ "who": "{{user.name}}", "count": 3, "list": ["{{user.id}}"] });
        assert_eq!(
            render_value(&body, &ctx),
            json!({ "who": "Ada", "count": 3, "list": ["42"] })
        );
    }
}
