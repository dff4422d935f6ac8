use super::{params_schema, SchemaValidator};
use crate::error::{PublishError, ValidationKind};
use crate::spec::ParameterMeta;
use serde_json::json;

fn param(name: &str, schema: serde_json::Value) -> ParameterMeta {
    ParameterMeta {
        name: name.to_string(),
        description: None,
        schema: Some(schema),
        location: None,
    }
}

#[test]
fn test_params_schema_synthesis() {
    let schema = params_schema(&[
        param("id", json!({"type": "integer", "minimum": 1, "description": "job id"})),
        param("region", json!({"type": "string", "enum": ["eu", "us"]})),
    ]);
    assert_eq!(
        schema,
        json!({
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "id": {"type": "integer", "minimum": 1},
                "region": {"type": "string", "enum": ["eu", "us"]}
            },
            "required": ["id", "region"]
        })
    );
}

#[test]
fn test_params_are_coerced_before_validation() {
    let v = SchemaValidator::compile_params("jobs/{id}", &[param("id", json!({"type": "integer"}))])
        .unwrap();
    let coerced = v.coerce_and_validate(json!({"id": "42"})).unwrap();
    assert_eq!(coerced, json!({"id": 42}));
}

#[test]
fn test_wrong_typed_param_is_rejected() {
    let v = SchemaValidator::compile_params("jobs/{id}", &[param("id", json!({"type": "integer"}))])
        .unwrap();
    let err = v.coerce_and_validate(json!({"id": "abc"})).unwrap_err();
    assert_eq!(err.kind, ValidationKind::ParamsInvalid);
    assert_eq!(err.schema_path, "#/properties/id/type");
    assert!(err.message.starts_with("Parameter validation error on #/properties/id/type"));
    assert_eq!(err.details["instance"], json!("abc"));
}

#[test]
fn test_missing_param_is_rejected() {
    let v = SchemaValidator::compile_params("jobs/{id}", &[param("id", json!({"type": "string"}))])
        .unwrap();
    let err = v.coerce_and_validate(json!({})).unwrap_err();
    assert_eq!(err.kind, ValidationKind::ParamsInvalid);
    assert_eq!(err.schema_path, "#/required");
}

#[test]
fn test_body_formats_are_asserted() {
    let schema = json!({
        "type": "object",
        "required": ["email"],
        "properties": {"email": {"type": "string", "format": "email"}}
    });
    let v = SchemaValidator::compile_body("signup", Some(&schema)).unwrap();
    assert!(v.validate(&json!({"email": "ada@example.com"})).is_ok());
    let err = v.validate(&json!({"email": "not-an-email"})).unwrap_err();
    assert_eq!(err.kind, ValidationKind::BodyInvalid);
    assert_eq!(err.schema_path, "#/properties/email/format");
}

#[test]
fn test_body_is_not_coerced() {
    let schema = json!({"type": "object", "properties": {"count": {"type": "integer"}}});
    let v = SchemaValidator::compile_body("counter", Some(&schema)).unwrap();
    let err = v.coerce_and_validate(json!({"count": "3"})).unwrap_err();
    assert_eq!(err.kind, ValidationKind::BodyInvalid);
}

#[test]
fn test_headers_are_sanitized_before_compilation() {
    let schema = json!({
        "type": "object",
        "x-parser-schema-id": "JobHeaders",
        "required": ["traceId"],
        "properties": {"traceId": {"type": "string", "x-parser-schema-id": "TraceId"}}
    });
    let v = SchemaValidator::compile_headers("jobs", Some(&schema)).unwrap();
    assert!(v.schema().unwrap().get("x-parser-schema-id").is_none());
    assert!(v.validate(&json!({"traceId": "abc"})).is_ok());
    let err = v.validate(&json!({"traceId": 7})).unwrap_err();
    assert_eq!(err.kind, ValidationKind::HeaderInvalid);
}

#[test]
fn test_missing_schema_accepts_everything() {
    let v = SchemaValidator::compile_body("free", None).unwrap();
    assert!(v.validate(&json!([1, "two", null])).is_ok());
}

#[test]
fn test_uncompilable_schema_is_a_configuration_error() {
    let schema = json!({"type": 12});
    let err = SchemaValidator::compile_body("broken", Some(&schema)).unwrap_err();
    assert!(matches!(
        err,
        PublishError::InvalidSchema { kind: ValidationKind::BodyInvalid, .. }
    ));
}

#[test]
fn test_messages_name_the_failing_stage() {
    let schema = json!({"type": "object"});
    let headers = SchemaValidator::compile_headers("stage", Some(&schema)).unwrap();
    let body = SchemaValidator::compile_body("stage", Some(&schema)).unwrap();

    let err = headers.validate(&json!("plain")).unwrap_err();
    assert!(err.message.starts_with("Header validation error on #/type"));
    let err = body.validate(&json!(3)).unwrap_err();
    assert!(err.message.starts_with("Body validation error on #/type"));
}
