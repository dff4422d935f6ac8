use serde_json::{Map, Value};

/// A server declared in the document's `servers` section.
///
/// `url` has every `{variable}` replaced by the variable's default value.
#[derive(Debug, Clone, PartialEq)]
pub struct Server {
    pub name: String,
    pub url: String,
    pub protocol: String,
    pub protocol_version: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    /// Protocol name → server binding object
    pub bindings: Map<String, Value>,
}

impl Server {
    /// The single tag name, when exactly one tag is declared
    #[must_use]
    pub fn single_tag(&self) -> Option<&str> {
        match self.tags.as_slice() {
            [only] => Some(only.as_str()),
            _ => None,
        }
    }

    /// Key under which bindings for this server's protocol are declared
    #[must_use]
    pub fn binding_key(&self) -> &str {
        binding_key(&self.protocol)
    }

    /// Server-level binding for this server's protocol (empty object if absent)
    #[must_use]
    pub fn binding(&self) -> Value {
        self.bindings
            .get(self.binding_key())
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()))
    }
}

/// Map a protocol identifier to the key its bindings are declared under.
///
/// Secure variants share the bindings of their plain protocol
/// (`kafka-secure` → `kafka`, `https` → `http`, `amqps` → `amqp`).
#[must_use]
pub fn binding_key(protocol: &str) -> &str {
    match protocol {
        "https" => "http",
        "amqps" => "amqp",
        "wss" => "ws",
        "secure-mqtt" => "mqtt",
        other => other.strip_suffix("-secure").unwrap_or(other),
    }
}

/// A channel parameter as declared under `channels.<name>.parameters`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterMeta {
    pub name: String,
    pub description: Option<String>,
    pub schema: Option<Value>,
    /// Runtime expression locating the value inside the message, if any
    pub location: Option<String>,
}

impl ParameterMeta {
    /// Declared primitive type of the parameter, if any
    #[must_use]
    pub fn schema_type(&self) -> Option<&str> {
        self.schema
            .as_ref()
            .and_then(|s| s.get("type"))
            .and_then(Value::as_str)
    }
}

/// Which level of the document a binding object is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingLevel {
    Channel,
    Operation,
    Message,
}

/// Everything the publisher needs about one outbound channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelMeta {
    /// Channel name, which doubles as the topic pattern (`events/{id}`)
    pub name: String,
    pub description: Option<String>,
    pub operation_id: Option<String>,
    /// Operation tag names
    pub tags: Vec<String>,
    /// Declared parameters, in declaration order
    pub parameters: Vec<ParameterMeta>,
    /// Bound server names; all declared servers when the channel names none
    pub servers: Vec<String>,
    pub headers_schema: Option<Value>,
    pub payload_schema: Option<Value>,
    pub channel_bindings: Map<String, Value>,
    pub operation_bindings: Map<String, Value>,
    pub message_bindings: Map<String, Value>,
}

impl ChannelMeta {
    /// Binding object for `protocol` at `level` (empty object if absent)
    #[must_use]
    pub fn binding(&self, level: BindingLevel, protocol: &str) -> Value {
        let bindings = match level {
            BindingLevel::Channel => &self.channel_bindings,
            BindingLevel::Operation => &self.operation_bindings,
            BindingLevel::Message => &self.message_bindings,
        };
        bindings
            .get(binding_key(protocol))
            .filter(|v| v.is_object())
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()))
    }

    /// Operation-level binding overlaid by the message-level binding
    ///
    /// This is the per-target metadata adapters derive send options from.
    #[must_use]
    pub fn merged_message_binding(&self, protocol: &str) -> Map<String, Value> {
        let mut merged = match self.binding(BindingLevel::Operation, protocol) {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        if let Value::Object(message) = self.binding(BindingLevel::Message, protocol) {
            for (k, v) in message {
                merged.insert(k, v);
            }
        }
        merged
    }

    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}
