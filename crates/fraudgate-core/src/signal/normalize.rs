//! Signal normalizer.
//!
//! Collection libraries report each component as a nested result object,
//! typically `{"value": ..., "duration": ...}` on success and
//! `{"error": ...}` on failure. [`normalize`] unwraps those into the flat
//! [`ComponentMap`] the heuristics engine and the gate consume. Entries that
//! carry an error marker or an unrepresentable shape are dropped rather than
//! coerced.

use serde_json::Value;

use super::{ComponentMap, ComponentValue};

/// Flattens raw probe output into a canonical component map.
///
/// Accepts both nested library-style output and already-flat maps: a value
/// of the form `{"value": inner}` is replaced by `inner`, an object with an
/// `"error"` key is skipped, and plain scalars and arrays pass through
/// unchanged. Non-object input produces an empty map.
pub fn normalize(raw: &Value) -> ComponentMap {
    let mut components = ComponentMap::new();
    let Some(entries) = raw.as_object() else {
        return components;
    };

    for (key, value) in entries {
        let unwrapped = match value {
            Value::Object(inner) => {
                if inner.contains_key("error") {
                    continue;
                }
                match inner.get("value") {
                    Some(inner_value) => inner_value,
                    // Objects without a value wrapper have no flat
                    // representation; drop them.
                    None => continue,
                }
            },
            other => other,
        };
        if let Some(flat) = flatten(unwrapped) {
            components.insert(key.clone(), flat);
        }
    }

    components
}

fn flatten(value: &Value) -> Option<ComponentValue> {
    match value {
        Value::Null => Some(ComponentValue::Null),
        Value::Bool(b) => Some(ComponentValue::Bool(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(ComponentValue::Int(i))
            } else {
                n.as_f64().map(ComponentValue::Float)
            }
        },
        Value::String(s) => Some(ComponentValue::Str(s.clone())),
        Value::Array(items) => {
            let flat: Vec<ComponentValue> = items.iter().filter_map(flatten).collect();
            Some(ComponentValue::Array(flat))
        },
        Value::Object(_) => None,
    }
}
