//! # Channel Module
//!
//! A loaded channel: its topic matcher, the three compiled validators and
//! the ordered targets a publish fans out to.
//!
//! ## Fan-out
//!
//! `Channel::publish` spawns one tokio task per target and awaits them
//! jointly. Results come back in target order. The first failure is returned
//! immediately; tasks already running are left to finish on their own and
//! their outcomes are discarded.

use crate::adapter::{Envelope, ProtocolAdapter};
use crate::config::TopicOptions;
use crate::error::{PublishError, ValidationError};
use crate::router::TopicMatcher;
use crate::schema::SchemaValidator;
use crate::spec::ChannelMeta;
use futures::future::try_join_all;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// One (adapter, server) pairing of a channel
#[derive(Clone)]
pub struct Target {
    pub server: String,
    pub protocol: String,
    adapter: Arc<dyn ProtocolAdapter>,
    /// Operation binding overlaid by message binding, for `protocol`
    bindings: Arc<Map<String, Value>>,
}

impl Target {
    pub fn new(
        server: impl Into<String>,
        protocol: impl Into<String>,
        adapter: Arc<dyn ProtocolAdapter>,
        bindings: Map<String, Value>,
    ) -> Self {
        Self {
            server: server.into(),
            protocol: protocol.into(),
            adapter,
            bindings: Arc::new(bindings),
        }
    }

    #[must_use]
    pub fn bindings(&self) -> &Map<String, Value> {
        &self.bindings
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("server", &self.server)
            .field("protocol", &self.protocol)
            .field("bindings", &self.bindings)
            .finish()
    }
}

#[derive(Debug)]
pub struct Channel {
    meta: ChannelMeta,
    matcher: TopicMatcher,
    params: SchemaValidator,
    headers: SchemaValidator,
    body: SchemaValidator,
    targets: Vec<Target>,
}

impl Channel {
    /// Compile the matcher and validators for `meta`.
    ///
    /// Fails with a configuration error if the channel name is not a valid
    /// topic pattern or a schema does not compile.
    pub fn new(
        meta: ChannelMeta,
        options: &TopicOptions,
        targets: Vec<Target>,
    ) -> Result<Self, PublishError> {
        let matcher = TopicMatcher::compile(&meta.name, options)?;
        let params = SchemaValidator::compile_params(&meta.name, &meta.parameters)?;
        let headers = SchemaValidator::compile_headers(&meta.name, meta.headers_schema.as_ref())?;
        let body = SchemaValidator::compile_body(&meta.name, meta.payload_schema.as_ref())?;
        debug!(
            channel = %meta.name,
            params = meta.parameters.len(),
            has_headers = meta.headers_schema.is_some(),
            has_payload = meta.payload_schema.is_some(),
            targets = targets.len(),
            "Channel compiled"
        );
        Ok(Self {
            meta,
            matcher,
            params,
            headers,
            body,
            targets,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.meta.name
    }

    #[must_use]
    pub fn meta(&self) -> &ChannelMeta {
        &self.meta
    }

    #[must_use]
    pub fn matcher(&self) -> &TopicMatcher {
        &self.matcher
    }

    #[must_use]
    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    /// Coerce and validate topic parameters, returning the coerced map
    pub fn validate_params(
        &self,
        params: Map<String, Value>,
    ) -> Result<Map<String, Value>, ValidationError> {
        match self.params.coerce_and_validate(Value::Object(params))? {
            Value::Object(map) => Ok(map),
            // coercion never changes an object's type
            _ => Ok(Map::new()),
        }
    }

    pub fn validate_headers(&self, headers: &Map<String, Value>) -> Result<(), ValidationError> {
        if self.headers.schema().is_none() {
            return Ok(());
        }
        self.headers.validate(&Value::Object(headers.clone()))
    }

    pub fn validate_message(&self, message: &Value) -> Result<(), ValidationError> {
        self.body.validate(message)
    }

    /// Send `envelope` through every target concurrently.
    ///
    /// Returns one result per target, in target order.
    pub async fn publish(&self, envelope: Envelope) -> Result<Vec<Value>, PublishError> {
        let envelope = Arc::new(envelope);
        let handles: Vec<_> = self
            .targets
            .iter()
            .map(|target| {
                let adapter = Arc::clone(&target.adapter);
                let bindings = Arc::clone(&target.bindings);
                let envelope = Arc::clone(&envelope);
                let server = target.server.clone();
                let protocol = target.protocol.clone();
                tokio::spawn(async move {
                    let result = adapter.publish(&envelope, &bindings).await;
                    if let Err(e) = &result {
                        error!(server = %server, protocol = %protocol, topic = %envelope.topic, error = %e, "Target publish failed");
                    }
                    result
                })
            })
            .collect();

        let joined = try_join_all(handles.into_iter().map(|handle| async move {
            match handle.await {
                Ok(result) => result,
                Err(join_err) => {
                    warn!(error = %join_err, "Target publish task aborted");
                    Err(PublishError::transport("task", join_err))
                }
            }
        }))
        .await?;

        debug!(channel = %self.meta.name, results = joined.len(), "Channel publish complete");
        Ok(joined)
    }

    /// Stop every target adapter; all are attempted, the first failure is returned
    pub async fn stop(&self) -> Result<(), PublishError> {
        let mut first_error = None;
        for target in &self.targets {
            if let Err(e) = target.adapter.stop().await {
                error!(channel = %self.meta.name, server = %target.server, error = %e, "Failed to stop adapter");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationKind;
    use crate::spec::ParameterMeta;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Echo {
        name: &'static str,
        delay_ms: u64,
        fail: bool,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ProtocolAdapter for Echo {
        async fn bind(&mut self, _channel: &Value, _operation: &Value) -> Result<(), PublishError> {
            Ok(())
        }

        async fn publish(
            &self,
            envelope: &Envelope,
            _bindings: &Map<String, Value>,
        ) -> Result<Value, PublishError> {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(PublishError::transport("echo", "refused"));
            }
            Ok(json!({"server": self.name, "topic": envelope.topic}))
        }
    }

    fn meta() -> ChannelMeta {
        ChannelMeta {
            name: "events/{id}".into(),
            description: None,
            operation_id: None,
            tags: Vec::new(),
            parameters: vec![ParameterMeta {
                name: "id".into(),
                description: None,
                schema: Some(json!({"type": "integer"})),
                location: None,
            }],
            servers: vec!["a".into(), "b".into()],
            headers_schema: Some(json!({"type": "object", "required": ["trace"]})),
            payload_schema: Some(json!({"type": "object", "required": ["status"]})),
            channel_bindings: Map::new(),
            operation_bindings: Map::new(),
            message_bindings: Map::new(),
        }
    }

    fn target(name: &'static str, delay_ms: u64, fail: bool, calls: &Arc<AtomicUsize>) -> Target {
        Target::new(
            name,
            "echo",
            Arc::new(Echo {
                name,
                delay_ms,
                fail,
                calls: Arc::clone(calls),
            }),
            Map::new(),
        )
    }

    fn envelope() -> Envelope {
        Envelope {
            topic: "events/1".into(),
            params: Map::new(),
            headers: Map::new(),
            message: json!({"status": "ok"}),
            options: Map::new(),
        }
    }

    #[tokio::test]
    async fn test_results_follow_target_order() {
        let calls = Arc::new(AtomicUsize::new(0));
        let channel = Channel::new(
            meta(),
            &TopicOptions::default(),
            vec![target("a", 30, false, &calls), target("b", 0, false, &calls)],
        )
        .unwrap();
        let results = channel.publish(envelope()).await.unwrap();
        assert_eq!(results[0]["server"], "a");
        assert_eq!(results[1]["server"], "b");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_first_failure_does_not_cancel_siblings() {
        let calls = Arc::new(AtomicUsize::new(0));
        let channel = Channel::new(
            meta(),
            &TopicOptions::default(),
            vec![target("fast-fail", 0, true, &calls), target("slow", 50, false, &calls)],
        )
        .unwrap();
        let err = channel.publish(envelope()).await.unwrap_err();
        assert!(matches!(err, PublishError::Transport { .. }));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_validators() {
        let channel = Channel::new(meta(), &TopicOptions::default(), Vec::new()).unwrap();

        let mut params = Map::new();
        params.insert("id".into(), json!("7"));
        assert_eq!(channel.validate_params(params).unwrap()["id"], json!(7));

        let err = channel.validate_headers(&Map::new()).unwrap_err();
        assert_eq!(err.kind, ValidationKind::HeaderInvalid);

        let err = channel.validate_message(&json!({})).unwrap_err();
        assert_eq!(err.kind, ValidationKind::BodyInvalid);
    }

    #[test]
    fn test_invalid_pattern_is_configuration_error() {
        let mut bad = meta();
        bad.name = "events/{id-x}".into();
        let err = Channel::new(bad, &TopicOptions::default(), Vec::new()).unwrap_err();
        assert!(matches!(err, PublishError::InvalidTopicPattern { .. }));
    }
}
