use super::types::Server;
use anyhow::{anyhow, bail, Context};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Keyword injected into every schema that was reached through a `$ref`
/// into `#/components/schemas`. Holds the component name.
pub const SCHEMA_ID_KEYWORD: &str = "x-parser-schema-id";

/// `$ref` chains deeper than this are left unexpanded as permissive schemas
const MAX_REF_DEPTH: usize = 32;

/// A loaded AsyncAPI 2.x document with every local `$ref` expanded.
///
/// `servers` and `channels` keep their declaration order.
#[derive(Debug, Clone)]
pub struct ApiDocument {
    pub asyncapi: String,
    pub title: String,
    pub version: String,
    pub servers: Vec<Server>,
    raw: Value,
}

impl ApiDocument {
    /// Build a document from an already-parsed JSON value
    pub fn from_value(mut value: Value) -> anyhow::Result<Self> {
        let asyncapi = match value.get("asyncapi") {
            Some(Value::String(v)) => v.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => bail!("missing 'asyncapi' version field"),
        };
        if !asyncapi.starts_with("2.") {
            bail!("unsupported AsyncAPI version {asyncapi}: only 2.x documents are supported");
        }

        let source = value.clone();
        expand_refs(&source, &mut value, &mut Vec::new());

        let info = value.get("info").cloned().unwrap_or(Value::Null);
        let title = info
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let version = info
            .get("version")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let servers = match value.get("servers") {
            Some(Value::Object(map)) => map
                .iter()
                .map(|(name, raw)| parse_server(name, raw))
                .collect::<anyhow::Result<Vec<_>>>()?,
            Some(_) => bail!("'servers' must be an object"),
            None => Vec::new(),
        };

        match value.get("channels") {
            Some(Value::Object(_)) | None => {}
            Some(_) => bail!("'channels' must be an object"),
        }

        let channel_count = value
            .get("channels")
            .and_then(serde_json::Value::as_object)
            .map_or(0, serde_json::Map::len);
        info!(
            asyncapi = %asyncapi,
            title = %title,
            servers = servers.len(),
            channels = channel_count,
            "AsyncAPI document loaded"
        );

        Ok(Self {
            asyncapi,
            title,
            version,
            servers,
            raw: value,
        })
    }

    #[must_use]
    pub fn server(&self, name: &str) -> Option<&Server> {
        self.servers.iter().find(|s| s.name == name)
    }

    #[must_use]
    pub fn server_names(&self) -> Vec<&str> {
        self.servers.iter().map(|s| s.name.as_str()).collect()
    }

    /// Channel names in declaration order
    #[must_use]
    pub fn channel_names(&self) -> Vec<&str> {
        self.channels().map(|(name, _)| name.as_str()).collect()
    }

    /// Channel items (refs expanded) in declaration order
    pub fn channels(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.raw
            .get("channels")
            .and_then(Value::as_object)
            .into_iter()
            .flat_map(|m| m.iter())
    }

    /// The full document, refs expanded
    #[must_use]
    pub fn raw(&self) -> &Value {
        &self.raw
    }
}

/// Anything the publisher can load an API description from.
#[derive(Debug, Clone)]
pub enum ApiSource {
    Path(PathBuf),
    Text(String),
    Value(Value),
    Document(ApiDocument),
}

impl ApiSource {
    pub fn into_document(self) -> anyhow::Result<ApiDocument> {
        match self {
            ApiSource::Path(path) => load_document(path),
            ApiSource::Text(text) => parse_document(&text),
            ApiSource::Value(value) => ApiDocument::from_value(value),
            ApiSource::Document(doc) => Ok(doc),
        }
    }
}

impl From<PathBuf> for ApiSource {
    fn from(path: PathBuf) -> Self {
        ApiSource::Path(path)
    }
}

impl From<&Path> for ApiSource {
    fn from(path: &Path) -> Self {
        ApiSource::Path(path.to_path_buf())
    }
}

impl From<String> for ApiSource {
    fn from(text: String) -> Self {
        ApiSource::Text(text)
    }
}

impl From<&str> for ApiSource {
    fn from(text: &str) -> Self {
        ApiSource::Text(text.to_string())
    }
}

impl From<Value> for ApiSource {
    fn from(value: Value) -> Self {
        ApiSource::Value(value)
    }
}

impl From<ApiDocument> for ApiSource {
    fn from(doc: ApiDocument) -> Self {
        ApiSource::Document(doc)
    }
}

/// Load a document from a `.yaml`, `.yml` or `.json` file
pub fn load_document(path: impl AsRef<Path>) -> anyhow::Result<ApiDocument> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let value: Value = match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse YAML in {}", path.display()))?,
        Some("json") => serde_json::from_str(&content)
            .with_context(|| format!("failed to parse JSON in {}", path.display()))?,
        _ => parse_text(&content)?,
    };
    ApiDocument::from_value(value)
}

/// Parse a document from raw YAML or JSON text
pub fn parse_document(text: &str) -> anyhow::Result<ApiDocument> {
    ApiDocument::from_value(parse_text(text)?)
}

fn parse_text(text: &str) -> anyhow::Result<Value> {
    if text.trim_start().starts_with('{') {
        serde_json::from_str(text).context("failed to parse JSON document")
    } else {
        serde_yaml::from_str(text).context("failed to parse YAML document")
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerObject {
    url: String,
    protocol: String,
    #[serde(default)]
    protocol_version: Option<Value>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    variables: Map<String, Value>,
    #[serde(default)]
    tags: Vec<TagObject>,
    #[serde(default)]
    bindings: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TagObject {
    pub(crate) name: String,
}

fn parse_server(name: &str, raw: &Value) -> anyhow::Result<Server> {
    let obj: ServerObject = serde_json::from_value(raw.clone())
        .with_context(|| format!("server '{name}' is malformed"))?;

    let url = substitute_variables(&obj.url, &obj.variables)
        .with_context(|| format!("server '{name}'"))?;

    // YAML reads `protocolVersion: 2.0` as a number
    let protocol_version = obj.protocol_version.and_then(|v| match v {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    });

    Ok(Server {
        name: name.to_string(),
        url,
        protocol: obj.protocol.to_ascii_lowercase(),
        protocol_version,
        description: obj.description,
        tags: obj.tags.into_iter().map(|t| t.name).collect(),
        bindings: obj.bindings,
    })
}

/// Replace `{var}` placeholders in a server URL with the variables' defaults
fn substitute_variables(url: &str, variables: &Map<String, Value>) -> anyhow::Result<String> {
    let mut out = String::with_capacity(url.len());
    let mut rest = url;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let end = after
            .find('}')
            .ok_or_else(|| anyhow!("unterminated variable in url '{url}'"))?;
        let var = &after[..end];
        let default = variables
            .get(var)
            .and_then(|v| v.get("default"))
            .ok_or_else(|| anyhow!("url variable '{var}' has no default value"))?;
        match default {
            Value::String(s) => out.push_str(s),
            other => out.push_str(&other.to_string()),
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Recursively replace local `$ref` objects with the referenced value.
///
/// Schemas reached through `#/components/schemas/<name>` are tagged with
/// [`SCHEMA_ID_KEYWORD`]. A reference that is already being expanded higher up
/// (a cycle), or that nests deeper than [`MAX_REF_DEPTH`], becomes a permissive
/// `{}` schema carrying only the identifier.
pub fn expand_refs(root: &Value, value: &mut Value, stack: &mut Vec<String>) {
    match value {
        Value::Object(obj) => {
            if let Some(ref_path) = obj.get("$ref").and_then(Value::as_str).map(str::to_string) {
                if let Some(pointer) = ref_path.strip_prefix('#') {
                    let schema_name = ref_path
                        .strip_prefix("#/components/schemas/")
                        .map(str::to_string);

                    if stack.contains(&ref_path) || stack.len() >= MAX_REF_DEPTH {
                        debug!(reference = %ref_path, "Cyclic or deep $ref left permissive");
                        let mut permissive = Map::new();
                        if let Some(name) = schema_name {
                            permissive.insert(SCHEMA_ID_KEYWORD.to_string(), Value::String(name));
                        }
                        *value = Value::Object(permissive);
                        return;
                    }

                    if let Some(target) = root.pointer(pointer) {
                        let mut resolved = target.clone();
                        stack.push(ref_path.clone());
                        expand_refs(root, &mut resolved, stack);
                        stack.pop();
                        if let (Some(name), Value::Object(o)) = (schema_name, &mut resolved) {
                            o.entry(SCHEMA_ID_KEYWORD.to_string())
                                .or_insert(Value::String(name));
                        }
                        *value = resolved;
                        return;
                    }
                }
            }
            for v in obj.values_mut() {
                expand_refs(root, v, stack);
            }
        }
        Value::Array(arr) => {
            for v in arr.iter_mut() {
                expand_refs(root, v, stack);
            }
        }
        _ => {}
    }
}

/// Names of the operation tags in `operation.tags`
pub(crate) fn tag_names(operation: &Value) -> Vec<String> {
    operation
        .get("tags")
        .cloned()
        .and_then(|tags| serde_json::from_value::<Vec<TagObject>>(tags).ok())
        .map(|tags| tags.into_iter().map(|t| t.name).collect())
        .unwrap_or_default()
}

/// Set of every `{name}` used in a channel name
pub(crate) fn placeholder_names(channel: &str) -> HashSet<String> {
    let mut names = HashSet::new();
    let mut rest = channel;
    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(end) => {
                names.insert(after[..end].to_string());
                rest = &after[end + 1..];
            }
            None => break,
        }
    }
    names
}
