//! Canonical JSON serialization (RFC 8785 style).
//!
//! Participants hash the canonical text of a document to agree on its
//! identifier, so two semantically equal documents must produce identical
//! bytes regardless of key order or whitespace.

use serde_json::{Number, Value};

use super::error::{Error, Result};

/// Serializes a JSON value in canonical form.
pub fn canonicalize_json(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

/// Parses JSON text and returns its canonical form.
pub fn canonicalize_str(text: &str) -> Result<String> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| Error::Validation(format!("Invalid JSON document: {}", e)))?;
    Ok(canonicalize_json(&value))
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(n) => out.push_str(&format_number(n)),
        Value::String(s) => write_string(out, s),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(out, key);
                out.push(':');
                write_value(out, item);
            }
            out.push('}');
        }
    }
}

/// Leaf values go through `serde_jcs`, which implements the RFC 8785 string
/// escaping and ECMAScript number form.
fn write_leaf<T: serde::Serialize + ?Sized + ToString>(out: &mut String, leaf: &T) {
    match serde_jcs::to_string(leaf) {
        Ok(text) => out.push_str(&text),
        Err(_) => out.push_str(&leaf.to_string()),
    }
}

fn write_string(out: &mut String, s: &str) {
    write_leaf(out, s);
}

fn format_number(n: &Number) -> String {
    // Integers are kept exact, even beyond 2^53.
    if n.is_u64() || n.is_i64() {
        return n.to_string();
    }
    let mut out = String::new();
    match n.as_f64() {
        Some(f) => write_leaf(&mut out, &f),
        None => out.push_str(&n.to_string()),
    }
    out
}
