//! L6 — JSON structural validator: detects case-variant duplicate keys in
//! critical MCP methods, recursively (spec §4.7, Invariant 7, §8 scenario 3).
//!
//! This is an anti-smuggling rule against case-insensitive unmarshalers
//! downstream: if two keys normalize to the same lowercase form but differ
//! in surface spelling, a malicious (or buggy) client could smuggle a
//! second value past a filter that only looks at one spelling.

use serde_json::Value;
use std::collections::HashMap;

use crate::error::{GatewayError, GatewayResult};

/// Methods whose argument trees are subject to duplicate-key validation.
pub const CRITICAL_METHODS: &[&str] = &["tools/call", "prompts/get", "resources/read"];

pub fn is_critical_method(method: &str) -> bool {
    CRITICAL_METHODS.contains(&method)
}

/// Validate `params` for `method`, recursively rejecting objects that carry
/// two distinct keys whose lowercased forms collide.
pub fn validate(method: &str, params: &Value) -> GatewayResult<()> {
    if !is_critical_method(method) {
        return Ok(());
    }
    check(params).map_err(|message| GatewayError::validation(method, message))
}

fn check(value: &Value) -> Result<(), String> {
    match value {
        Value::Object(map) => {
            let mut seen: HashMap<String, &str> = HashMap::new();
            for key in map.keys() {
                let lower = key.to_lowercase();
                if let Some(original) = seen.get(&lower) {
                    if *original != key.as_str() {
                        return Err(format!(
                            "duplicate keys detected: found \"{original}\" and \"{key}\" (case variants)"
                        ));
                    }
                } else {
                    seen.insert(lower, key.as_str());
                }
            }
            for v in map.values() {
                check(v)?;
            }
            Ok(())
        }
        Value::Array(items) => {
            for item in items {
                check(item)?;
            }
            Ok(())
        }
        // Primitives yield no work.
        _ => Ok(()),
    }
}
