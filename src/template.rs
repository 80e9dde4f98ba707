//! `{{ key }}` placeholder expansion against a JSON root.

use crate::validator::get_by_json_path;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

// Matches {{ key }} or {{ vars.key }} and captures the key path.
static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*(?:vars\.)?(.+?)\s*\}\}")
        .expect("failed to compile placeholder regex")
});

/// Expand placeholders inside `text`. Strings are inserted raw, other
/// values as JSON; unknown keys are left untouched.
pub fn expand_str(text: &str, root: &Value) -> String {
    PLACEHOLDER_RE
        .replace_all(text, |caps: &regex::Captures| {
            match get_by_json_path(root, &caps[1]) {
                Some(Value::String(s)) => s.clone(),
                Some(v) => v.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Expand placeholders in every string of `value`.
///
/// A string consisting of a single placeholder is replaced by the
/// referenced value itself, keeping its JSON type.
pub fn expand_value(value: &Value, root: &Value) -> Value {
    match value {
        Value::String(s) => {
            if let Some(caps) = PLACEHOLDER_RE.captures(s) {
                let whole =
                    caps.get(0).is_some_and(|m| m.as_str() == s.as_str());
                if whole {
                    if let Some(found) = get_by_json_path(root, &caps[1]) {
                        return found.clone();
                    }
                }
            }
            Value::String(expand_str(s, root))
        }
        Value::Array(items) => Value::Array(
            items.iter().map(|v| expand_value(v, root)).collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), expand_value(v, root)))
                .collect(),
        ),
        other => other.clone(),
    }
}
