//! # Error Module
//!
//! Every failure the publisher can surface to a caller, grouped by the phase in
//! which it occurs.
//!
//! | Category        | Raised by          | Effect                                   |
//! |-----------------|--------------------|------------------------------------------|
//! | `Configuration` | `load_api`         | aborts the load, nothing is published    |
//! | `Routing`       | `publish`          | no channel matched, nothing is validated |
//! | `Validation`    | `publish`          | params/headers/body rejected, no send    |
//! | `Transport`     | adapters           | surfaced as-is, never retried            |
//!
//! Errors are never swallowed inside the crate: they are logged where they are
//! first observed and then returned to the immediate caller.

use serde_json::Value;
use std::fmt;

/// Which validation stage rejected a publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationKind {
    /// Topic parameters did not satisfy the channel's parameter schema
    ParamsInvalid,
    /// Message headers did not satisfy the message `headers` schema
    HeaderInvalid,
    /// Message body did not satisfy the message `payload` schema
    BodyInvalid,
}

impl ValidationKind {
    /// Stable upper-case identifier, as carried in logs and diagnostics
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationKind::ParamsInvalid => "PARAMS_VALIDATION_FAILURE",
            ValidationKind::HeaderInvalid => "HEADER_VALIDATION_FAILURE",
            ValidationKind::BodyInvalid => "BODY_VALIDATION_FAILURE",
        }
    }

    pub(crate) fn label(&self) -> &'static str {
        match self {
            ValidationKind::ParamsInvalid => "Parameter",
            ValidationKind::HeaderInvalid => "Header",
            ValidationKind::BodyInvalid => "Body",
        }
    }
}

impl fmt::Display for ValidationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// First failing schema constraint for a publish.
///
/// `schema_path` is the JSON pointer (prefixed with `#`) of the keyword that
/// failed, e.g. `#/properties/id/type`. `details` carries the raw validator
/// diagnostic: instance path, schema path, failing instance and keyword kind.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct ValidationError {
    pub kind: ValidationKind,
    pub schema_path: String,
    pub message: String,
    pub details: Value,
}

impl ValidationError {
    pub fn new(
        kind: ValidationKind,
        schema_path: impl Into<String>,
        message: impl Into<String>,
        details: Value,
    ) -> Self {
        Self {
            kind,
            schema_path: schema_path.into(),
            message: message.into(),
            details,
        }
    }
}

/// Coarse grouping of [`PublishError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Configuration,
    Routing,
    Validation,
    Transport,
}

/// Errors returned by [`crate::Publisher`], the channel graph and the adapters.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// The API document could not be read or is not an AsyncAPI 2.x document
    #[error("invalid API document: {0}")]
    InvalidDocument(String),

    /// A server declares a protocol no plugin is registered for
    #[error("No plugin available for protocol {protocol} (server '{server}')")]
    UnknownProtocol { protocol: String, server: String },

    /// A channel names a server the document does not declare
    #[error("channel '{channel}' references unknown server '{server}'")]
    UnknownServer { channel: String, server: String },

    /// The server's protocol or protocol version is not what the adapter speaks
    #[error("server '{server}': {reason}")]
    ProtocolMismatch { server: String, reason: String },

    /// A binding lacks a field the adapter needs, or carries an unusable value
    #[error("invalid binding: {0}")]
    InvalidBinding(String),

    /// A channel name is not a valid topic pattern
    #[error("invalid topic pattern '{pattern}': {reason}")]
    InvalidTopicPattern { pattern: String, reason: String },

    /// A parameter, header or payload schema failed to compile
    #[error("channel '{channel}': {kind} schema does not compile: {reason}")]
    InvalidSchema {
        channel: String,
        kind: ValidationKind,
        reason: String,
    },

    /// No loaded channel matches the topic
    #[error("No channel found for topic {topic}")]
    Unroutable { topic: String },

    /// A captured topic parameter is not valid percent-encoded UTF-8
    #[error("topic '{topic}': parameter '{param}' is not valid percent-encoded UTF-8")]
    MalformedParameter { topic: String, param: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The message could not be turned into a transport payload
    #[error("The message content could not be stringified: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The transport rejected or failed the send
    #[error("{protocol} transport error: {message}")]
    Transport { protocol: String, message: String },
}

impl PublishError {
    pub fn transport(protocol: impl Into<String>, message: impl fmt::Display) -> Self {
        PublishError::Transport {
            protocol: protocol.into(),
            message: message.to_string(),
        }
    }

    pub fn binding(message: impl Into<String>) -> Self {
        PublishError::InvalidBinding(message.into())
    }

    pub fn protocol_mismatch(server: impl Into<String>, reason: impl Into<String>) -> Self {
        PublishError::ProtocolMismatch {
            server: server.into(),
            reason: reason.into(),
        }
    }

    /// Phase in which this error is raised
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            PublishError::InvalidDocument(_)
            | PublishError::UnknownProtocol { .. }
            | PublishError::UnknownServer { .. }
            | PublishError::ProtocolMismatch { .. }
            | PublishError::InvalidBinding(_)
            | PublishError::InvalidTopicPattern { .. }
            | PublishError::InvalidSchema { .. } => ErrorCategory::Configuration,
            PublishError::Unroutable { .. } | PublishError::MalformedParameter { .. } => {
                ErrorCategory::Routing
            }
            PublishError::Validation(_) => ErrorCategory::Validation,
            PublishError::Serialization(_) | PublishError::Transport { .. } => {
                ErrorCategory::Transport
            }
        }
    }

    /// The validation failure, if this is one
    #[must_use]
    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            PublishError::Validation(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validation_error_displays_message() {
        let err = ValidationError::new(
            ValidationKind::BodyInvalid,
            "#/required",
            "Body validation error on #/required: \"status\" is a required property",
            json!({}),
        );
        assert_eq!(
            err.to_string(),
            "Body validation error on #/required: \"status\" is a required property"
        );
        assert_eq!(err.kind.as_str(), "BODY_VALIDATION_FAILURE");
    }

    #[test]
    fn test_categories() {
        let unroutable = PublishError::Unroutable {
            topic: "a/b".into(),
        };
        assert_eq!(unroutable.category(), ErrorCategory::Routing);
        assert_eq!(unroutable.to_string(), "No channel found for topic a/b");

        let unknown = PublishError::UnknownProtocol {
            protocol: "mqtt".into(),
            server: "edge".into(),
        };
        assert_eq!(unknown.category(), ErrorCategory::Configuration);

        let validation: PublishError = ValidationError::new(
            ValidationKind::ParamsInvalid,
            "#/required",
            "missing",
            Value::Null,
        )
        .into();
        assert_eq!(validation.category(), ErrorCategory::Validation);
        assert!(validation.as_validation().is_some());

        assert_eq!(
            PublishError::transport("amqp", "closed").category(),
            ErrorCategory::Transport
        );
    }
}
