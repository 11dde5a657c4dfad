//! Placeholder resolution for step templates.
//!
//! A placeholder has the form `${ref.path}` where `ref` is one of:
//! - `step[N]`: the N-th step of the scenario (0-based)
//! - a step name: the most recent earlier step with that name
//! - `vars`: the scenario variables
//!
//! Step paths are resolved against the step's response envelope
//! (`status`, `success`, `data`), so `${create.data.password.id}` reads
//! `password.id` out of the response body. Only steps that passed can be
//! referenced.
//!
//! A string consisting of a single placeholder is replaced by the referenced
//! JSON value with its type intact; placeholders embedded in longer strings
//! are interpolated as text.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::runner::{StepOutcome, StepResult};

/// Why a placeholder could not be resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionError {
    pub placeholder: String,
    pub reason: String,
}

impl ResolutionError {
    fn new(placeholder: &str, reason: impl Into<String>) -> Self {
        Self {
            placeholder: format!("${{{}}}", placeholder),
            reason: reason.into(),
        }
    }
}

/// Values placeholders can refer to
#[derive(Debug, Clone, Copy)]
pub struct ResolveContext<'a> {
    /// Results of the steps that already ran, in order
    pub results: &'a [StepResult],
    pub vars: &'a BTreeMap<String, Value>,
}

impl<'a> ResolveContext<'a> {
    pub fn new(results: &'a [StepResult], vars: &'a BTreeMap<String, Value>) -> Self {
        Self { results, vars }
    }

    /// Resolve one placeholder expression (the text between `${` and `}`)
    pub fn lookup_expr(&self, expr: &str) -> Result<Value, ResolutionError> {
        let expr = expr.trim();
        let (head, path) = expr.split_once('.').unwrap_or((expr, ""));

        if head == "vars" {
            let vars: Map<String, Value> = self
                .vars
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            let vars = Value::Object(vars);
            return lookup(&vars, path)
                .cloned()
                .ok_or_else(|| ResolutionError::new(expr, format!("no variable at `{}`", path)));
        }

        let result = self.find_step(expr, head)?;
        match result.outcome {
            StepOutcome::Passed => {}
            StepOutcome::Failed => {
                return Err(ResolutionError::new(
                    expr,
                    format!("step '{}' did not pass", result.name),
                ));
            }
            StepOutcome::Skipped => {
                return Err(ResolutionError::new(
                    expr,
                    format!("step '{}' was skipped", result.name),
                ));
            }
        }

        let envelope = result
            .response
            .as_ref()
            .map(|r| r.to_value())
            .ok_or_else(|| ResolutionError::new(expr, format!("step '{}' has no response", result.name)))?;

        lookup(&envelope, path).cloned().ok_or_else(|| {
            ResolutionError::new(
                expr,
                format!("path `{}` not found in result of step '{}'", path, result.name),
            )
        })
    }

    fn find_step(&self, expr: &str, head: &str) -> Result<&'a StepResult, ResolutionError> {
        if let Some((key, indices)) = split_indices(head) {
            if key == "step" && indices.len() == 1 {
                let index = indices[0];
                return self.results.get(index).ok_or_else(|| {
                    ResolutionError::new(expr, format!("step {} has not run yet", index))
                });
            }
        }

        self.results
            .iter()
            .rev()
            .find(|r| r.name == head)
            .ok_or_else(|| ResolutionError::new(expr, format!("no earlier step named '{}'", head)))
    }

    /// Resolve placeholders in a string. A lone placeholder keeps its JSON type.
    pub fn resolve_str(&self, template: &str) -> Result<Value, ResolutionError> {
        if let Some(inner) = template.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
            if !inner.contains("${") && !inner.contains('}') {
                return self.lookup_expr(inner);
            }
        }
        self.interpolate(template).map(Value::String)
    }

    /// Resolve placeholders in a string, always producing text
    pub fn interpolate(&self, template: &str) -> Result<String, ResolutionError> {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after
                .find('}')
                .ok_or_else(|| ResolutionError::new(after, "unterminated placeholder"))?;
            out.push_str(&stringify(&self.lookup_expr(&after[..end])?));
            rest = &after[end + 1..];
        }
        out.push_str(rest);

        Ok(out)
    }

    /// Resolve every string inside a JSON value. Object keys are left alone.
    pub fn resolve_value(&self, value: &Value) -> Result<Value, ResolutionError> {
        Ok(match value {
            Value::String(s) => self.resolve_str(s)?,
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|v| self.resolve_value(v))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Object(map) => {
                let mut resolved = Map::with_capacity(map.len());
                for (k, v) in map {
                    resolved.insert(k.clone(), self.resolve_value(v)?);
                }
                Value::Object(resolved)
            }
            other => other.clone(),
        })
    }
}

/// Text form of a value for interpolation: strings unquoted, the rest as JSON
fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Walk a dotted path (`data.items[0].id`, `data.items.0.id`) through a JSON value.
/// An empty path returns the root.
pub fn lookup<'v>(root: &'v Value, path: &str) -> Option<&'v Value> {
    let mut current = root;

    for segment in path.split('.').filter(|s| !s.is_empty()) {
        let (key, indices) = split_indices(segment)?;
        if !key.is_empty() {
            current = match current {
                Value::Object(map) => map.get(key)?,
                Value::Array(items) => items.get(key.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        for index in indices {
            current = current.as_array()?.get(index)?;
        }
    }

    Some(current)
}

/// Split `items[0][1]` into `("items", [0, 1])`
fn split_indices(segment: &str) -> Option<(&str, Vec<usize>)> {
    let Some(open) = segment.find('[') else {
        return Some((segment, Vec::new()));
    };

    let key = &segment[..open];
    let mut rest = &segment[open..];
    let mut indices = Vec::new();
    while !rest.is_empty() {
        let inner = rest.strip_prefix('[')?;
        let close = inner.find(']')?;
        indices.push(inner[..close].trim().parse().ok()?);
        rest = &inner[close + 1..];
    }

    Some((key, indices))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Envelope;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn result(index: usize, name: &str, outcome: StepOutcome, body: Value) -> StepResult {
        StepResult {
            index,
            name: name.to_string(),
            outcome,
            response: Some(Envelope::new(if outcome == StepOutcome::Passed { 201 } else { 500 }, body)),
            failure: None,
            duration_ms: 1,
        }
    }

    fn results() -> Vec<StepResult> {
        vec![
            result(0, "login", StepOutcome::Passed, json!({"success": true})),
            result(1, "createCategory", StepOutcome::Passed, json!({"id": "cat-1", "tags": ["a", "b"]})),
            result(2, "createPassword", StepOutcome::Passed, json!({"password": {"id": 42}})),
            result(3, "broken", StepOutcome::Failed, json!({"id": "never"})),
        ]
    }

    #[test]
    fn test_lookup_paths() {
        let value = json!({"data": {"items": [{"id": 1}, {"id": 2}]}});
        assert_eq!(lookup(&value, "data.items[1].id"), Some(&json!(2)));
        assert_eq!(lookup(&value, "data.items.0.id"), Some(&json!(1)));
        assert_eq!(lookup(&value, ""), Some(&value));
        assert_eq!(lookup(&value, "data.missing"), None);
        assert_eq!(lookup(&value, "data.items[9]"), None);
    }

    #[test]
    fn test_resolve_by_index_and_name() {
        let results = results();
        let vars = BTreeMap::new();
        let ctx = ResolveContext::new(&results, &vars);

        assert_eq!(ctx.resolve_str("${step[2].data.password.id}").unwrap(), json!(42));
        assert_eq!(ctx.resolve_str("${createCategory.data.id}").unwrap(), json!("cat-1"));
        assert_eq!(ctx.resolve_str("${createCategory.status}").unwrap(), json!(201));
        assert_eq!(ctx.resolve_str("${createCategory.data.tags[1]}").unwrap(), json!("b"));
    }

    #[test]
    fn test_interpolation_stringifies() {
        let results = results();
        let vars = BTreeMap::new();
        let ctx = ResolveContext::new(&results, &vars);

        assert_eq!(
            ctx.resolve_str("/passwords/${step[2].data.password.id}?category=${createCategory.data.id}")
                .unwrap(),
            json!("/passwords/42?category=cat-1")
        );
    }

    #[test]
    fn test_resolve_value_recurses() {
        let results = results();
        let mut vars = BTreeMap::new();
        vars.insert("user".to_string(), json!({"email": "qa@example.com"}));
        let ctx = ResolveContext::new(&results, &vars);

        let body = json!({
            "title": "Entry for ${vars.user.email}",
            "categoryId": "${createCategory.data.id}",
            "meta": [ "${step[2].data.password.id}", null, true ]
        });
        assert_eq!(
            ctx.resolve_value(&body).unwrap(),
            json!({
                "title": "Entry for qa@example.com",
                "categoryId": "cat-1",
                "meta": [42, null, true]
            })
        );
    }

    #[test]
    fn test_failures() {
        let results = results();
        let vars = BTreeMap::new();
        let ctx = ResolveContext::new(&results, &vars);

        let err = ctx.resolve_str("${step[7].data.id}").unwrap_err();
        assert_eq!(err.placeholder, "${step[7].data.id}");
        assert!(err.reason.contains("has not run"));

        let err = ctx.resolve_str("${broken.data.id}").unwrap_err();
        assert!(err.reason.contains("did not pass"));

        let err = ctx.resolve_str("${createCategory.data.nope}").unwrap_err();
        assert!(err.reason.contains("not found"));

        let err = ctx.resolve_str("${unknown.data.id}").unwrap_err();
        assert!(err.reason.contains("no earlier step"));

        let err = ctx.resolve_str("${vars.missing}").unwrap_err();
        assert!(err.reason.contains("no variable"));

        let err = ctx.interpolate("/x/${createCategory.data.id").unwrap_err();
        assert_eq!(err.reason, "unterminated placeholder");
    }

    #[test]
    fn test_plain_strings_untouched() {
        let vars = BTreeMap::new();
        let ctx = ResolveContext::new(&[], &vars);
        assert_eq!(ctx.resolve_str("no placeholders").unwrap(), json!("no placeholders"));
        assert_eq!(ctx.resolve_str("").unwrap(), json!(""));
    }

    #[test]
    fn test_padded_placeholder_stays_text() {
        let results = results();
        let mut vars = BTreeMap::new();
        vars.insert("count".to_string(), json!(3));
        let ctx = ResolveContext::new(&results, &vars);

        assert_eq!(ctx.resolve_str("${vars.count}").unwrap(), json!(3));
        assert_eq!(ctx.resolve_str(" ${vars.count} ").unwrap(), json!(" 3 "));
        assert_eq!(ctx.resolve_str("${step[2].data.password.id}\n").unwrap(), json!("42\n"));
    }
}
