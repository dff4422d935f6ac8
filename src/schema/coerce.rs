//! Type coercion applied before parameter validation.
//!
//! Topic captures are always strings, so a parameter declared as `integer`
//! arrives as `"42"`. Coercion rewrites the value to the first declared type
//! it can be losslessly converted to; values that already satisfy a declared
//! type, or cannot be converted, are left untouched for the validator to judge.

use serde_json::{Number, Value};

/// Coerce `value` (and, for objects, its declared properties) to the types in `schema`
pub fn coerce(value: &mut Value, schema: &Value) {
    if let Some(types) = declared_types(schema) {
        if !types.iter().any(|t| has_type(value, t)) {
            if let Some(converted) = types.iter().find_map(|t| convert(value, t)) {
                *value = converted;
            }
        }
    }

    if let (Value::Object(obj), Some(props)) = (
        value,
        schema.get("properties").and_then(Value::as_object),
    ) {
        for (name, prop_schema) in props {
            if let Some(v) = obj.get_mut(name) {
                coerce(v, prop_schema);
            }
        }
    }
}

fn declared_types(schema: &Value) -> Option<Vec<&str>> {
    match schema.get("type")? {
        Value::String(t) => Some(vec![t.as_str()]),
        Value::Array(ts) => Some(ts.iter().filter_map(Value::as_str).collect()),
        _ => None,
    }
}

fn has_type(value: &Value, ty: &str) -> bool {
    match ty {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => is_integer(value),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        _ => false,
    }
}

fn is_integer(value: &Value) -> bool {
    match value {
        Value::Number(n) => n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0),
        _ => false,
    }
}

fn convert(value: &Value, ty: &str) -> Option<Value> {
    match ty {
        "string" => match value {
            Value::Number(n) => Some(Value::String(n.to_string())),
            Value::Bool(b) => Some(Value::String(b.to_string())),
            Value::Null => Some(Value::String(String::new())),
            _ => None,
        },
        "number" => to_number(value).map(Value::Number),
        "integer" => to_number(value)
            .filter(|n| is_integer(&Value::Number(n.clone())))
            .map(Value::Number),
        "boolean" => match value {
            Value::String(s) if s == "true" => Some(Value::Bool(true)),
            Value::String(s) if s == "false" => Some(Value::Bool(false)),
            Value::Number(n) if n.as_f64() == Some(1.0) => Some(Value::Bool(true)),
            Value::Number(n) if n.as_f64() == Some(0.0) => Some(Value::Bool(false)),
            Value::Null => Some(Value::Bool(false)),
            _ => None,
        },
        "null" => match value {
            Value::String(s) if s.is_empty() => Some(Value::Null),
            Value::Number(n) if n.as_f64() == Some(0.0) => Some(Value::Null),
            Value::Bool(false) => Some(Value::Null),
            _ => None,
        },
        _ => None,
    }
}

fn to_number(value: &Value) -> Option<Number> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() || trimmed != s {
                return None;
            }
            if let Ok(i) = trimmed.parse::<i64>() {
                return Some(Number::from(i));
            }
            let f = trimmed.parse::<f64>().ok().filter(|f| f.is_finite())?;
            if f.fract() == 0.0 && f.abs() < 9.007_199_254_740_992e15 {
                // Integral but written as "1.0" or "1e3": keep it an integer
                #[allow(clippy::cast_possible_truncation)]
                return Some(Number::from(f as i64));
            }
            Number::from_f64(f)
        }
        Value::Bool(b) => Some(Number::from(u8::from(*b))),
        Value::Null => Some(Number::from(0)),
        Value::Number(n) => Some(n.clone()),
        _ => None,
    }
}
