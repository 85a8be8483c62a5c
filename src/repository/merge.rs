//! `merge_files`: combine several JSON/YAML (already JSON-valued) entries
//! into one document, later entries overriding earlier ones key by key.
//! Object values merge recursively; a scalar or array value replaces
//! whatever was there before it only when the two are the same JSON type
//! (or either side is an explicit `null`, treated as "unset"). A type
//! mismatch at the same location — an object meeting a non-object, or two
//! scalars/arrays of different types — is a structural shape clash
//! between two files the caller asked to combine, reported as a
//! `query-failure` naming the JSON Pointer where it happened and the two
//! offending types.

use serde_json::Value;

use crate::errors::CoreError;

/// Merges `values` in order (earlier entries are the base, later entries
/// override) and returns the combined document.
pub fn merge_json(values: Vec<(String, Value)>) -> Result<Value, CoreError> {
    let mut merged = Value::Object(Default::default());
    for (source_path, value) in values {
        merged = merge_at(merged, value, "", &source_path)?;
    }
    Ok(merged)
}

fn merge_at(base: Value, overlay: Value, pointer: &str, source_path: &str) -> Result<Value, CoreError> {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let child_pointer = format!("{pointer}/{}", escape_pointer_segment(&key));
                let merged_value = match base_map.remove(&key) {
                    Some(base_value) => merge_at(base_value, overlay_value, &child_pointer, source_path)?,
                    None => overlay_value,
                };
                base_map.insert(key, merged_value);
            }
            Ok(Value::Object(base_map))
        }
        (Value::Object(_), overlay) if !overlay.is_null() => Err(CoreError::query_failure(format!(
            "merging `{source_path}` would replace an object at `{}` with a {}",
            pointer_or_root(pointer),
            type_name(&overlay)
        ))),
        (base, Value::Object(_)) if !matches!(base, Value::Null) => Err(CoreError::query_failure(format!(
            "merging `{source_path}` would replace a {} at `{}` with an object",
            type_name(&base),
            pointer_or_root(pointer)
        ))),
        (base, overlay) => {
            if !base.is_null() && !overlay.is_null() && type_name(&base) != type_name(&overlay) {
                return Err(CoreError::query_failure(format!(
                    "merging `{source_path}` would replace a {} at `{}` with a {}",
                    type_name(&base),
                    pointer_or_root(pointer),
                    type_name(&overlay)
                )));
            }
            Ok(overlay)
        }
    }
}

fn pointer_or_root(pointer: &str) -> &str {
    if pointer.is_empty() {
        "/"
    } else {
        pointer
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn escape_pointer_segment(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn later_entry_overrides_earlier_scalar() {
        let merged = merge_json(vec![
            ("/base.json".to_string(), json!({"port": 1, "host": "a"})),
            ("/override.json".to_string(), json!({"port": 2})),
        ])
        .unwrap();
        assert_eq!(merged, json!({"port": 2, "host": "a"}));
    }

    #[test]
    fn nested_objects_merge_recursively() {
        let merged = merge_json(vec![
            ("/base.json".to_string(), json!({"db": {"host": "a", "port": 1}})),
            ("/override.json".to_string(), json!({"db": {"port": 2}})),
        ])
        .unwrap();
        assert_eq!(merged, json!({"db": {"host": "a", "port": 2}}));
    }

    #[test]
    fn type_clash_reports_json_pointer() {
        let err = merge_json(vec![
            ("/base.json".to_string(), json!({"db": {"host": "a"}})),
            ("/override.json".to_string(), json!({"db": 5})),
        ])
        .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("/db"), "message was: {message}");
    }

    #[test]
    fn scalar_type_clash_reports_json_pointer() {
        let err = merge_json(vec![
            ("/foo.json".to_string(), json!({"a": "bar"})),
            ("/foo2.json".to_string(), json!({"a": "new_bar"})),
            ("/foo10.json".to_string(), json!({"a": 1})),
        ])
        .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("/a"), "message was: {message}");
        assert!(message.contains("number"), "message was: {message}");
        assert!(message.contains("string"), "message was: {message}");
    }
}
