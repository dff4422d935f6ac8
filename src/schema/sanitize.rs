//! Removal of loader-internal keywords from schemas.
//!
//! `$ref` expansion tags schemas with `x-parser-*` identifiers. They describe
//! where a schema came from, not what a value must look like, so they are
//! removed before a header schema is compiled.

use serde_json::Value;

const INTERNAL_PREFIX: &str = "x-parser-";

/// Keywords whose value is a single sub-schema
const SCHEMA_KEYWORDS: [&str; 9] = [
    "items",
    "additionalItems",
    "additionalProperties",
    "contains",
    "propertyNames",
    "not",
    "if",
    "then",
    "else",
];

/// Keywords whose value is an array of sub-schemas
const SCHEMA_ARRAY_KEYWORDS: [&str; 4] = ["allOf", "anyOf", "oneOf", "items"];

/// Keywords whose value maps names to sub-schemas
const SCHEMA_MAP_KEYWORDS: [&str; 5] = [
    "properties",
    "patternProperties",
    "definitions",
    "$defs",
    "dependencies",
];

/// Strip every `x-parser-*` keyword from `schema` and all nested sub-schemas.
///
/// Only schema positions are visited, so a property that happens to be named
/// `x-parser-schema-id` inside `properties` keeps its definition.
pub fn strip_internal_ids(schema: &mut Value) {
    let Value::Object(obj) = schema else {
        return;
    };

    obj.retain(|key, _| !key.starts_with(INTERNAL_PREFIX));

    for keyword in SCHEMA_KEYWORDS {
        if let Some(sub) = obj.get_mut(keyword) {
            if sub.is_object() {
                strip_internal_ids(sub);
            }
        }
    }
    for keyword in SCHEMA_ARRAY_KEYWORDS {
        if let Some(Value::Array(subs)) = obj.get_mut(keyword) {
            for sub in subs {
                strip_internal_ids(sub);
            }
        }
    }
    for keyword in SCHEMA_MAP_KEYWORDS {
        if let Some(Value::Object(map)) = obj.get_mut(keyword) {
            for sub in map.values_mut() {
                strip_internal_ids(sub);
            }
        }
    }
}
