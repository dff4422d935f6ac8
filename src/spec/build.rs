use super::load::{placeholder_names, tag_names, ApiDocument};
use super::types::{ChannelMeta, ParameterMeta};
use crate::error::PublishError;
use serde_json::{json, Map, Value};
use std::fmt;
use tracing::{error, info, warn};

/// Severity of a problem found while extracting channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueSeverity {
    /// Load continues; the channel may never validate successfully
    Warning,
    /// Load is aborted
    Error,
}

/// A problem found in the document while building channel metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecIssue {
    pub location: String,
    pub kind: String,
    pub message: String,
    pub severity: IssueSeverity,
}

impl SpecIssue {
    pub fn new(
        location: impl Into<String>,
        kind: impl Into<String>,
        message: impl Into<String>,
        severity: IssueSeverity,
    ) -> Self {
        SpecIssue {
            location: location.into(),
            kind: kind.into(),
            message: message.into(),
            severity,
        }
    }
}

impl fmt::Display for SpecIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.kind, self.location, self.message)
    }
}

/// Log every issue and turn the errors, if any, into one configuration error
pub fn fail_if_issues(issues: &[SpecIssue]) -> Result<(), PublishError> {
    for issue in issues {
        match issue.severity {
            IssueSeverity::Warning => warn!(
                location = %issue.location,
                kind = %issue.kind,
                "{}", issue.message
            ),
            IssueSeverity::Error => error!(
                location = %issue.location,
                kind = %issue.kind,
                "{}", issue.message
            ),
        }
    }

    let errors: Vec<String> = issues
        .iter()
        .filter(|i| i.severity == IssueSeverity::Error)
        .map(ToString::to_string)
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(PublishError::InvalidDocument(format!(
            "{} issue(s) found: {}",
            errors.len(),
            errors.join("; ")
        )))
    }
}

/// Extract every channel with outbound semantics (a `subscribe` operation).
///
/// When `tag` is set, only channels whose operation carries that tag are kept.
/// Channels are returned in declaration order. A channel that names an
/// undeclared server fails the whole build.
pub fn build_channels(
    doc: &ApiDocument,
    tag: Option<&str>,
) -> Result<(Vec<ChannelMeta>, Vec<SpecIssue>), PublishError> {
    let mut channels = Vec::new();
    let mut issues = Vec::new();
    let all_servers: Vec<String> = doc.servers.iter().map(|s| s.name.clone()).collect();

    for (name, item) in doc.channels() {
        let Some(operation) = item.get("subscribe").filter(|op| op.is_object()) else {
            continue;
        };

        let tags = tag_names(operation);
        if let Some(tag) = tag {
            if !tags.iter().any(|t| t == tag) {
                continue;
            }
        }

        let servers = match item.get("servers").and_then(Value::as_array) {
            Some(list) if !list.is_empty() => {
                let mut names = Vec::with_capacity(list.len());
                for entry in list {
                    let Some(server) = entry.as_str() else {
                        issues.push(SpecIssue::new(
                            name.as_str(),
                            "InvalidServerReference",
                            "channel servers must be server names",
                            IssueSeverity::Error,
                        ));
                        continue;
                    };
                    if doc.server(server).is_none() {
                        return Err(PublishError::UnknownServer {
                            channel: name.clone(),
                            server: server.to_string(),
                        });
                    }
                    names.push(server.to_string());
                }
                names
            }
            _ => all_servers.clone(),
        };

        let parameters = extract_parameters(name, item, &mut issues);
        let (headers_schema, payload_schema, message_bindings) =
            extract_message(name, operation, &mut issues);

        channels.push(ChannelMeta {
            name: name.clone(),
            description: item
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_string),
            operation_id: operation
                .get("operationId")
                .and_then(Value::as_str)
                .map(str::to_string),
            tags,
            parameters,
            servers,
            headers_schema,
            payload_schema,
            channel_bindings: object_or_empty(item.get("bindings")),
            operation_bindings: object_or_empty(operation.get("bindings")),
            message_bindings,
        });
    }

    info!(
        channels = channels.len(),
        tag = ?tag,
        issues = issues.len(),
        "Outbound channels extracted"
    );

    Ok((channels, issues))
}

fn object_or_empty(value: Option<&Value>) -> Map<String, Value> {
    value
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

fn extract_parameters(
    channel: &str,
    item: &Value,
    issues: &mut Vec<SpecIssue>,
) -> Vec<ParameterMeta> {
    let declared = item.get("parameters").and_then(Value::as_object);
    let placeholders = placeholder_names(channel);

    let mut parameters = Vec::new();
    if let Some(declared) = declared {
        for (pname, param) in declared {
            let schema = param.get("schema").cloned();
            match &schema {
                None => issues.push(SpecIssue::new(
                    format!("{channel} → {pname}"),
                    "MissingParameterSchema",
                    "parameter has no schema; any value is accepted",
                    IssueSeverity::Warning,
                )),
                Some(s) if !s.is_object() => issues.push(SpecIssue::new(
                    format!("{channel} → {pname}"),
                    "InvalidParameterSchema",
                    "parameter schema must be an object",
                    IssueSeverity::Error,
                )),
                Some(_) => {}
            }
            if !placeholders.contains(pname) {
                issues.push(SpecIssue::new(
                    format!("{channel} → {pname}"),
                    "UnusedParameter",
                    "declared parameter does not appear in the channel name; publishes will fail validation",
                    IssueSeverity::Warning,
                ));
            }
            parameters.push(ParameterMeta {
                name: pname.clone(),
                description: param
                    .get("description")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                schema,
                location: param
                    .get("location")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            });
        }
    }

    let mut undeclared: Vec<&String> = placeholders
        .iter()
        .filter(|p| !parameters.iter().any(|d| &d.name == *p))
        .collect();
    undeclared.sort();
    for p in undeclared {
        issues.push(SpecIssue::new(
            channel,
            "UndeclaredParameter",
            format!("parameter '{p}' is used in the channel name but not declared"),
            IssueSeverity::Error,
        ));
    }

    parameters
}

/// Returns (headers schema, payload schema, message bindings)
fn extract_message(
    channel: &str,
    operation: &Value,
    issues: &mut Vec<SpecIssue>,
) -> (Option<Value>, Option<Value>, Map<String, Value>) {
    let Some(message) = operation.get("message") else {
        return (None, None, Map::new());
    };

    if let Some(members) = message.get("oneOf").and_then(Value::as_array) {
        if members.is_empty() {
            issues.push(SpecIssue::new(
                channel,
                "EmptyOneOf",
                "message oneOf has no members",
                IssueSeverity::Error,
            ));
            return (None, None, Map::new());
        }

        let payloads: Option<Vec<Value>> = members.iter().map(|m| m.get("payload").cloned()).collect();
        let headers: Option<Vec<Value>> = members.iter().map(|m| m.get("headers").cloned()).collect();
        if headers.is_none() && members.iter().any(|m| m.get("headers").is_some()) {
            issues.push(SpecIssue::new(
                channel,
                "PartialHeaders",
                "only some oneOf messages declare headers; headers are not validated",
                IssueSeverity::Warning,
            ));
        }

        return (
            headers.map(|h| json!({ "anyOf": h })),
            payloads.map(|p| json!({ "anyOf": p })),
            object_or_empty(members.first().and_then(|m| m.get("bindings"))),
        );
    }

    if !message.is_object() {
        issues.push(SpecIssue::new(
            channel,
            "InvalidMessage",
            "subscribe message must be an object",
            IssueSeverity::Error,
        ));
        return (None, None, Map::new());
    }

    (
        message.get("headers").cloned(),
        message.get("payload").cloned(),
        object_or_empty(message.get("bindings")),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::parse_document;

    const DOC: &str = r#"
asyncapi: 2.6.0
info: { title: Jobs, version: "1.0.0" }
servers:
  broker: { url: "amqp://localhost:5672", protocol: amqp, protocolVersion: 0.9.1 }
  stream: { url: "localhost:9092", protocol: kafka }
channels:
  events/{id}:
    parameters:
      id: { schema: { type: string } }
    subscribe:
      tags: [{ name: jobs }]
      message:
        payload: { type: object }
  inbound:
    publish:
      message: { payload: { type: string } }
  audit:
    servers: [stream]
    subscribe:
      message:
        oneOf:
          - { payload: { type: string }, bindings: { kafka: { key: { type: string } } } }
          - { payload: { type: integer } }
"#;

    #[test]
    fn test_only_subscribe_channels_in_order() {
        let doc = parse_document(DOC).unwrap();
        let (channels, issues) = build_channels(&doc, None).unwrap();
        assert!(issues.is_empty());
        let names: Vec<_> = channels.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["events/{id}", "audit"]);
        assert_eq!(channels[0].servers, vec!["broker", "stream"]);
        assert_eq!(channels[1].servers, vec!["stream"]);
    }

    #[test]
    fn test_tag_filter() {
        let doc = parse_document(DOC).unwrap();
        let (channels, _) = build_channels(&doc, Some("jobs")).unwrap();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].name, "events/{id}");
    }

    #[test]
    fn test_one_of_messages_are_combined() {
        let doc = parse_document(DOC).unwrap();
        let (channels, _) = build_channels(&doc, None).unwrap();
        let audit = &channels[1];
        assert_eq!(
            audit.payload_schema,
            Some(json!({"anyOf": [{"type": "string"}, {"type": "integer"}]}))
        );
        assert!(audit.headers_schema.is_none());
        assert!(audit.message_bindings.contains_key("kafka"));
    }

    #[test]
    fn test_unknown_server_is_fatal() {
        let doc = parse_document(
            r#"
asyncapi: 2.6.0
info: { title: X, version: "1" }
servers:
  broker: { url: "amqp://localhost", protocol: amqp }
channels:
  a:
    servers: [nowhere]
    subscribe: { message: { payload: { type: string } } }
"#,
        )
        .unwrap();
        let err = build_channels(&doc, None).unwrap_err();
        assert!(matches!(err, PublishError::UnknownServer { ref server, .. } if server == "nowhere"));
    }

    #[test]
    fn test_undeclared_placeholder_is_an_error_issue() {
        let doc = parse_document(
            r#"
asyncapi: 2.6.0
info: { title: X, version: "1" }
channels:
  users/{userId}/signedup:
    subscribe: { message: { payload: { type: object } } }
"#,
        )
        .unwrap();
        let (_, issues) = build_channels(&doc, None).unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, "UndeclaredParameter");
        assert!(fail_if_issues(&issues).is_err());
    }
}
