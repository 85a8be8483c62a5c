//! `get`'s two query modes: fetch an entry as-is, or evaluate one or more
//! JSON-path expressions against it. JSON-path evaluation itself is an
//! assumed library function (`jsonpath-rust`, already part of the
//! dependency stack); this module only owns the contract around it —
//! multiple expressions, first match wins, empty result is a query error.

use serde_json::Value;

use crate::errors::CoreError;

#[derive(Debug, Clone)]
pub enum Query {
    /// Return the entry at `path` untouched.
    Identity { path: String },
    /// Evaluate `expressions` against the entry at `path` in order,
    /// returning the first one that yields a result.
    JsonPath {
        path: String,
        expressions: Vec<String>,
    },
}

impl Query {
    pub fn path(&self) -> &str {
        match self {
            Query::Identity { path } => path,
            Query::JsonPath { path, .. } => path,
        }
    }
}

/// Evaluates a single JSON-path expression against `value`, returning
/// every matched node.
pub fn evaluate(value: &Value, expression: &str) -> Result<Vec<Value>, CoreError> {
    use jsonpath_rust::JsonPathQuery;

    let matched = value
        .clone()
        .path(expression)
        .map_err(|e| CoreError::query_failure(format!("invalid jsonpath `{expression}`: {e}")))?;
    match matched {
        Value::Array(items) => Ok(items),
        other => Ok(vec![other]),
    }
}

/// Evaluates `expressions` in order against `value`, returning the first
/// expression's result that is non-empty. `query-failure` if none match.
pub fn evaluate_first(value: &Value, expressions: &[String]) -> Result<Value, CoreError> {
    for expression in expressions {
        let matches = evaluate(value, expression)?;
        if let Some(first) = matches.into_iter().next() {
            return Ok(first);
        }
    }
    Err(CoreError::query_failure(
        "jsonpath expression evaluated to nothing",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn evaluate_first_returns_first_non_empty_match() {
        let value = json!({"k": 2});
        let result = evaluate_first(&value, &["$.missing".to_string(), "$.k".to_string()]).unwrap();
        assert_eq!(result, json!(2));
    }

    #[test]
    fn evaluate_first_fails_when_all_expressions_empty() {
        let value = json!({"k": 2});
        let result = evaluate_first(&value, &["$.missing".to_string()]);
        assert!(result.is_err());
    }
}
