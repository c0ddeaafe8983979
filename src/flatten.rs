//! Context-labeled flattening of nested lore documents.
//!
//! Walks an arbitrary JSON value and emits one line per non-empty string
//! leaf, prefixed by the `" > "`-joined path of object keys leading to it
//! (e.g. `manuale > capitolo1 > storia: ...`). Array indices are not part
//! of the label; they add noise without semantic value. Numbers, booleans
//! and nulls carry no retrievable text and are skipped.

use serde_json::Value;

use crate::error::FlattenError;

/// Recursion guard. Lore data is document-shaped; anything deeper than
/// this is malformed input, not a legitimate record.
const MAX_DEPTH: usize = 128;

/// Separator between nested key segments in a context label.
const LABEL_SEPARATOR: &str = " > ";

/// Flatten a JSON value into context-labeled plain-text lines.
///
/// `root_label` seeds the running label (the index builder passes the
/// source file stem). Emission order follows the source structure: object
/// keys in insertion order, array elements positionally. Empty containers
/// produce an empty string.
pub fn flatten_value(value: &Value, root_label: &str) -> Result<String, FlattenError> {
    let mut out = String::new();
    walk(value, root_label, 0, &mut out)?;
    Ok(out)
}

fn walk(value: &Value, label: &str, depth: usize, out: &mut String) -> Result<(), FlattenError> {
    if depth > MAX_DEPTH {
        return Err(FlattenError::DepthExceeded { limit: MAX_DEPTH });
    }

    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
        Value::String(s) => {
            if !s.trim().is_empty() {
                if label.is_empty() {
                    out.push_str(s);
                } else {
                    out.push_str(label);
                    out.push_str(": ");
                    out.push_str(s);
                }
                out.push('\n');
            }
        }
        Value::Array(items) => {
            for item in items {
                walk(item, label, depth + 1, out)?;
            }
        }
        Value::Object(map) => {
            for (key, child) in map {
                let child_label = if label.is_empty() {
                    key.clone()
                } else {
                    format!("{label}{LABEL_SEPARATOR}{key}")
                };
                walk(child, &child_label, depth + 1, out)?;
            }
        }
    }

    Ok(())
}
