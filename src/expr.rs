//! L1 — Expression evaluator.
//!
//! Substitutes `{{server.key}}` and `{{key|mount_as:DEST:MODE}}` against a
//! nested configuration map. Never throws: a missing key simply evaluates
//! to empty, matching the teacher's preference for infallible template
//! substitution helpers (e.g. `turbomcp-proxy::codegen::template_engine`).

use serde_json::Value;
use std::collections::BTreeMap;

/// Evaluate every `{{...}}` placeholder in `template` against `config`.
///
/// Grammar:
/// - `{{ident(.ident)*}}` looks up a dotted path in `config`.
/// - `{{path|mount_as:DEST:MODE}}` expands to `"<value>:DEST:MODE"` if the
///   looked-up value is non-empty, otherwise the whole match (and by
///   extension, if it's the entirety of the field, the caller should treat
///   the field as empty and skip it).
pub fn evaluate(template: &str, config: &BTreeMap<String, Value>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    loop {
        let Some(start) = rest.find("{{") else {
            out.push_str(rest);
            break;
        };
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let Some(end) = after_open.find("}}") else {
            // Unterminated placeholder: emit the rest verbatim.
            out.push_str(&rest[start..]);
            break;
        };
        let expr = &after_open[..end];
        out.push_str(&evaluate_expr(expr, config));
        rest = &after_open[end + 2..];
    }
    out
}

fn evaluate_expr(expr: &str, config: &BTreeMap<String, Value>) -> String {
    if let Some((path, filter)) = expr.split_once('|') {
        let value = lookup_string(path.trim(), config);
        return apply_filter(filter.trim(), &value);
    }
    lookup_string(expr.trim(), config)
}

fn apply_filter(filter: &str, value: &str) -> String {
    if value.is_empty() {
        return String::new();
    }
    if let Some(rest) = filter.strip_prefix("mount_as:") {
        let mut parts = rest.splitn(2, ':');
        let dest = parts.next().unwrap_or_default();
        let mode = parts.next().unwrap_or_default();
        return format!("{value}:{dest}:{mode}");
    }
    // Unknown filter: pass the raw value through rather than error, in
    // keeping with the evaluator's "never throws" contract.
    value.to_string()
}

/// Look up a dotted path (`server.key`) in the nested config map, returning
/// a display string for scalars and an empty string for anything missing
/// or non-scalar.
pub fn lookup_string(path: &str, config: &BTreeMap<String, Value>) -> String {
    let mut parts = path.split('.');
    let Some(first) = parts.next() else {
        return String::new();
    };
    let Some(mut current) = config.get(first) else {
        return String::new();
    };
    for part in parts {
        match current.get(part) {
            Some(next) => current = next,
            None => return String::new(),
        }
    }
    value_to_string(current)
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        // Arrays/objects have no scalar representation; treat as empty
        // rather than emit a JSON blob into a shell argument.
        _ => String::new(),
    }
}

/// Evaluate every string in a list (used for `command[]`-style fields).
pub fn evaluate_list(templates: &[String], config: &BTreeMap<String, Value>) -> Vec<String> {
    templates.iter().map(|t| evaluate(t, config)).collect()
}
