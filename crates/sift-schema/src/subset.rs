//! Structural schema checking
//!
//! Interprets the subset of JSON Schema the registry documents actually use:
//! `type`, `properties`, `required`, `additionalProperties`, `items`,
//! `enum`, numeric bounds, string length bounds and `pattern`. Anything the
//! interpreter does not recognise is ignored, which matches how permissive
//! draft-04 validators treat unknown keywords.

use serde_json::Value;

#[cfg(test)]
#[path = "subset_test.rs"]
mod tests;

/// Check `data` against `schema`, appending human-readable problems
pub fn check(schema: &Value, data: &Value, errors: &mut Vec<String>) {
    check_at(schema, data, "$", errors);
}

fn check_at(schema: &Value, data: &Value, path: &str, errors: &mut Vec<String>) {
    let Some(schema) = schema.as_object() else {
        return;
    };

    if let Some(expected) = schema.get("type") {
        if !type_matches(expected, data) {
            errors.push(format!(
                "{}: expected type {}, got {}",
                path,
                render_type(expected),
                value_type(data)
            ));
            // Type is wrong; structural keywords below would only cascade.
            return;
        }
    }

    if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
        if !allowed.contains(data) {
            errors.push(format!("{}: value not in enum", path));
        }
    }

    match data {
        Value::Object(obj) => {
            if let Some(required) = schema.get("required").and_then(Value::as_array) {
                for name in required.iter().filter_map(Value::as_str) {
                    if !obj.contains_key(name) {
                        errors.push(format!("{}: missing required property '{}'", path, name));
                    }
                }
            }

            let properties = schema.get("properties").and_then(Value::as_object);
            if let Some(properties) = properties {
                for (name, sub_schema) in properties {
                    if let Some(sub_data) = obj.get(name) {
                        check_at(sub_schema, sub_data, &format!("{}.{}", path, name), errors);
                    }
                }
            }

            if schema.get("additionalProperties").and_then(Value::as_bool) == Some(false) {
                for name in obj.keys() {
                    let declared = properties.map(|p| p.contains_key(name)).unwrap_or(false);
                    if !declared {
                        errors.push(format!("{}: unexpected property '{}'", path, name));
                    }
                }
            }
        }
        Value::Array(items) => {
            if let Some(item_schema) = schema.get("items") {
                for (i, item) in items.iter().enumerate() {
                    check_at(item_schema, item, &format!("{}[{}]", path, i), errors);
                }
            }
        }
        Value::String(s) => {
            if let Some(min) = schema.get("minLength").and_then(Value::as_u64) {
                if (s.chars().count() as u64) < min {
                    errors.push(format!("{}: shorter than minLength {}", path, min));
                }
            }
            if let Some(max) = schema.get("maxLength").and_then(Value::as_u64) {
                if (s.chars().count() as u64) > max {
                    errors.push(format!("{}: longer than maxLength {}", path, max));
                }
            }
            if let Some(pattern) = schema.get("pattern").and_then(Value::as_str) {
                match regex::Regex::new(pattern) {
                    Ok(re) => {
                        if !re.is_match(s) {
                            errors.push(format!("{}: does not match pattern", path));
                        }
                    }
                    // A broken pattern is the schema author's bug, not the
                    // event's; skip the keyword.
                    Err(_) => {}
                }
            }
        }
        Value::Number(n) => {
            if let (Some(v), Some(min)) = (n.as_f64(), schema.get("minimum").and_then(Value::as_f64))
            {
                if v < min {
                    errors.push(format!("{}: below minimum {}", path, min));
                }
            }
            if let (Some(v), Some(max)) = (n.as_f64(), schema.get("maximum").and_then(Value::as_f64))
            {
                if v > max {
                    errors.push(format!("{}: above maximum {}", path, max));
                }
            }
        }
        _ => {}
    }
}

fn type_matches(expected: &Value, data: &Value) -> bool {
    match expected {
        Value::String(t) => single_type_matches(t, data),
        Value::Array(types) => types
            .iter()
            .filter_map(Value::as_str)
            .any(|t| single_type_matches(t, data)),
        _ => true,
    }
}

fn single_type_matches(t: &str, data: &Value) -> bool {
    match t {
        "object" => data.is_object(),
        "array" => data.is_array(),
        "string" => data.is_string(),
        "integer" => data.is_i64() || data.is_u64(),
        "number" => data.is_number(),
        "boolean" => data.is_boolean(),
        "null" => data.is_null(),
        _ => true,
    }
}

fn render_type(expected: &Value) -> String {
    match expected {
        Value::String(t) => t.clone(),
        Value::Array(types) => types
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join("|"),
        _ => "any".to_string(),
    }
}

fn value_type(data: &Value) -> &'static str {
    match data {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
