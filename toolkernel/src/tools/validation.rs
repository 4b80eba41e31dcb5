//! Argument validation against a tool's parameter schema.
//!
//! Only required-presence and primitive `type` checks are performed. Nested
//! schemas, enums and formats are left to the tool itself.

use super::definitions::ToolDefinition;
use crate::errors::ToolError;
use serde_json::{Map, Value};

/// Describes a JSON value's type the way error messages report it.
#[must_use]
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn matches_type(expected: &str, value: &Value) -> Option<bool> {
    let ok = match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        _ => return None,
    };
    Some(ok)
}

fn article(expected: &str) -> String {
    match expected.chars().next() {
        Some('a' | 'e' | 'i' | 'o' | 'u') => format!("an {expected}"),
        _ => format!("a {expected}"),
    }
}

/// Checks `args` against `def.parameters`.
///
/// Returns the first problem found: missing required parameters are reported
/// before type mismatches.
pub fn validate_arguments(def: &ToolDefinition, args: &Map<String, Value>) -> Result<(), ToolError> {
    for required in def.required_parameters() {
        if !args.contains_key(required) {
            return Err(ToolError::missing_parameter(&def.name, required));
        }
    }

    for (name, value) in args {
        let Some(expected) = def.parameter_type(name) else {
            continue;
        };
        if matches_type(expected, value) == Some(false) {
            return Err(ToolError::type_mismatch(
                &def.name,
                name,
                &article(expected),
                json_type_name(value),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ToolErrorKind;
    use serde_json::json;

    fn definition() -> ToolDefinition {
        ToolDefinition::new("calc", "Calculator").with_parameters(json!({
            "type": "object",
            "properties": {
                "label": {"type": "string"},
                "count": {"type": "integer"},
                "ratio": {"type": "number"},
                "verbose": {"type": "boolean"},
                "anything": {}
            },
            "required": ["label"]
        }))
    }

    fn args(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn test_valid_arguments() {
        let def = definition();
        let ok = args(json!({"label": "x", "count": 3, "ratio": 1, "verbose": false, "anything": [1]}));
        assert!(validate_arguments(&def, &ok).is_ok());

        let float_ratio = args(json!({"label": "x", "ratio": 0.5}));
        assert!(validate_arguments(&def, &float_ratio).is_ok());
    }

    #[test]
    fn test_missing_required() {
        let err = validate_arguments(&definition(), &Map::new()).unwrap_err();
        assert_eq!(err.kind(), ToolErrorKind::Validation);
        assert_eq!(
            err.to_string(),
            "Missing required parameter 'label' for tool 'calc'"
        );
    }

    #[test]
    fn test_integer_rejects_float_and_bool() {
        let def = definition();
        let err = validate_arguments(&def, &args(json!({"label": "x", "count": 1.5}))).unwrap_err();
        assert!(err.to_string().contains("should be an integer, got number"));

        let err = validate_arguments(&def, &args(json!({"label": "x", "count": true}))).unwrap_err();
        assert!(err.to_string().contains("got boolean"));
    }

    #[test]
    fn test_string_mismatch_message() {
        let err = validate_arguments(&definition(), &args(json!({"label": 7}))).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Parameter 'label' for tool 'calc' should be a string, got integer"
        );
    }

    #[test]
    fn test_structured_types_are_not_checked() {
        let def = ToolDefinition::new("t", "").with_parameters(json!({
            "type": "object",
            "properties": {
                "tags": {"type": "array"},
                "meta": {"type": "object"},
                "nothing": {"type": "null"}
            }
        }));
        let mismatched = args(json!({"tags": "a", "meta": 3, "nothing": false}));
        assert!(validate_arguments(&def, &mismatched).is_ok());
    }

    #[test]
    fn test_undeclared_parameters_pass() {
        let def = definition();
        assert!(validate_arguments(&def, &args(json!({"label": "x", "extra": 1}))).is_ok());
    }
}
