use super::coerce::coerce;
use super::sanitize::strip_internal_ids;
use crate::error::{PublishError, ValidationError, ValidationKind};
use crate::spec::ParameterMeta;
use jsonschema::{Draft, Validator};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::debug;

/// Parameter schema keywords carried over into the synthesized object schema
const PARAMETER_KEYWORDS: [&str; 10] = [
    "format",
    "enum",
    "const",
    "pattern",
    "minLength",
    "maxLength",
    "minimum",
    "maximum",
    "exclusiveMinimum",
    "exclusiveMaximum",
];

/// A compiled schema for one validation stage of one channel.
///
/// Compiled once at load time; `validate` is a pure function of its input.
/// A stage without a declared schema accepts everything.
#[derive(Clone)]
pub struct SchemaValidator {
    kind: ValidationKind,
    schema: Option<Value>,
    compiled: Option<Arc<Validator>>,
    coerce_types: bool,
}

impl std::fmt::Debug for SchemaValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaValidator")
            .field("kind", &self.kind)
            .field("schema", &self.schema)
            .field("coerce_types", &self.coerce_types)
            .finish()
    }
}

/// Object schema requiring every declared parameter.
///
/// Each property keeps the declared `type` and the constraint keywords in
/// [`PARAMETER_KEYWORDS`]; unknown topic parameters are rejected.
#[must_use]
pub fn params_schema(parameters: &[ParameterMeta]) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::with_capacity(parameters.len());

    for param in parameters {
        let mut prop = Map::new();
        if let Some(Value::Object(declared)) = &param.schema {
            if let Some(ty) = declared.get("type") {
                prop.insert("type".to_string(), ty.clone());
            }
            for keyword in PARAMETER_KEYWORDS {
                if let Some(v) = declared.get(keyword) {
                    prop.insert(keyword.to_string(), v.clone());
                }
            }
        }
        properties.insert(param.name.clone(), Value::Object(prop));
        required.push(Value::String(param.name.clone()));
    }

    json!({
        "type": "object",
        "additionalProperties": false,
        "properties": properties,
        "required": required,
    })
}

impl SchemaValidator {
    /// Compile a schema for `kind`.
    ///
    /// Formats are asserted. With `coerce_types`, values are converted to the
    /// declared types before validation (see [`super::coerce`]).
    pub fn compile(
        kind: ValidationKind,
        schema: Option<Value>,
        coerce_types: bool,
    ) -> Result<Self, String> {
        let compiled = match &schema {
            Some(schema) => Some(Arc::new(
                jsonschema::options()
                    .with_draft(Draft::Draft7)
                    .should_validate_formats(true)
                    .build(schema)
                    .map_err(|e| e.to_string())?,
            )),
            None => None,
        };
        Ok(Self {
            kind,
            schema,
            compiled,
            coerce_types,
        })
    }

    /// Parameter validator with coercion, synthesized from declared parameters
    pub fn compile_params(
        channel: &str,
        parameters: &[ParameterMeta],
    ) -> Result<Self, PublishError> {
        let schema = params_schema(parameters);
        debug!(channel = %channel, schema = %schema, "Compiling parameter schema");
        Self::compile(ValidationKind::ParamsInvalid, Some(schema), true)
            .map_err(|reason| schema_error(channel, ValidationKind::ParamsInvalid, reason))
    }

    /// Header validator; `x-parser-*` identifiers are stripped first
    pub fn compile_headers(channel: &str, schema: Option<&Value>) -> Result<Self, PublishError> {
        let schema = schema.map(|s| {
            let mut s = s.clone();
            strip_internal_ids(&mut s);
            s
        });
        Self::compile(ValidationKind::HeaderInvalid, schema, false)
            .map_err(|reason| schema_error(channel, ValidationKind::HeaderInvalid, reason))
    }

    pub fn compile_body(channel: &str, schema: Option<&Value>) -> Result<Self, PublishError> {
        Self::compile(ValidationKind::BodyInvalid, schema.cloned(), false)
            .map_err(|reason| schema_error(channel, ValidationKind::BodyInvalid, reason))
    }

    #[must_use]
    pub fn kind(&self) -> ValidationKind {
        self.kind
    }

    /// The schema as compiled (after synthesis or sanitizing), if any
    #[must_use]
    pub fn schema(&self) -> Option<&Value> {
        self.schema.as_ref()
    }

    /// Validate `instance`, reporting only the first failing constraint
    pub fn validate(&self, instance: &Value) -> Result<(), ValidationError> {
        let Some(compiled) = &self.compiled else {
            return Ok(());
        };
        match compiled.iter_errors(instance).next() {
            None => Ok(()),
            Some(err) => {
                let schema_path = format!("#{}", err.schema_path);
                let details = json!({
                    "instancePath": err.instance_path.to_string(),
                    "schemaPath": schema_path,
                    "keyword": format!("{:?}", err.kind),
                    "instance": err.instance.clone().into_owned(),
                });
                Err(ValidationError::new(
                    self.kind,
                    schema_path.clone(),
                    format!("{} validation error on {}: {}", self.kind.label(), schema_path, err),
                    details,
                ))
            }
        }
    }

    /// Coerce (when enabled) and validate, returning the value that passed
    pub fn coerce_and_validate(&self, mut instance: Value) -> Result<Value, ValidationError> {
        if self.coerce_types {
            if let Some(schema) = &self.schema {
                coerce(&mut instance, schema);
            }
        }
        self.validate(&instance)?;
        Ok(instance)
    }
}

fn schema_error(channel: &str, kind: ValidationKind, reason: String) -> PublishError {
    PublishError::InvalidSchema {
        channel: channel.to_string(),
        kind,
        reason,
    }
}
