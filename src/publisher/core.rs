use crate::adapter::{AdapterFactory, Connection, Envelope};
use crate::channel::{Channel, Target};
use crate::config::PublisherConfig;
use crate::error::PublishError;
use crate::ids::PublishId;
use crate::plugins::PluginRegistry;
use crate::registry::{ConnectionRegistry, ExternalConnections, ServerRequest};
use crate::router::TopicRouter;
use crate::spec::{
    build_channels, fail_if_issues, ApiDocument, ApiSource, BindingLevel, ChannelMeta,
};
use arc_swap::ArcSwap;
use futures::future::try_join_all;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Per-load options.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Caller-owned connections, keyed by server name. Adopted as-is and
    /// never closed by the publisher.
    pub connections: ExternalConnections,
    /// Only load channels whose operation carries this tag. Overrides
    /// [`PublisherConfig::default_tag`].
    pub tag: Option<String>,
}

impl LoadOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_connection(mut self, server: impl Into<String>, connection: Connection) -> Self {
        self.connections.insert(server.into(), connection);
        self
    }

    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }
}

/// The loaded channel graph. Replaced wholesale on every load.
#[derive(Default)]
struct Snapshot {
    router: TopicRouter,
    channels: Vec<Arc<Channel>>,
}

/// Validates outbound messages against a loaded AsyncAPI document and
/// publishes them to every server bound to the matching channel.
pub struct Publisher {
    plugins: PluginRegistry,
    config: PublisherConfig,
    registry: ConnectionRegistry,
    snapshot: ArcSwap<Snapshot>,
    /// Serializes `load_api` and `stop`
    lifecycle: Mutex<()>,
}

impl Publisher {
    /// Publisher with the given plugins and configuration from the environment
    #[must_use]
    pub fn new(plugins: PluginRegistry) -> Self {
        Self::with_config(plugins, PublisherConfig::from_env())
    }

    #[must_use]
    pub fn with_config(plugins: PluginRegistry, config: PublisherConfig) -> Self {
        Self {
            plugins,
            config,
            registry: ConnectionRegistry::new(),
            snapshot: ArcSwap::from_pointee(Snapshot::default()),
            lifecycle: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &PublisherConfig {
        &self.config
    }

    #[must_use]
    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    /// Connections shared by the loaded channels
    #[must_use]
    pub fn connections(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Loaded channels, in declaration order
    #[must_use]
    pub fn channels(&self) -> Vec<Arc<Channel>> {
        self.snapshot.load().channels.clone()
    }

    #[must_use]
    pub fn channel(&self, name: &str) -> Option<Arc<Channel>> {
        self.snapshot
            .load()
            .channels
            .iter()
            .find(|c| c.name() == name)
            .cloned()
    }

    /// Load (or reload) an API description.
    ///
    /// Connections are resolved first, then every outbound channel gets one
    /// bound adapter per server. On success the new channel graph replaces
    /// the previous one and the previous adapters are stopped.
    pub async fn load_api(
        &self,
        source: impl Into<ApiSource>,
        options: LoadOptions,
    ) -> Result<(), PublishError> {
        let _guard = self.lifecycle.lock().await;

        let doc = source
            .into()
            .into_document()
            .map_err(|e| PublishError::InvalidDocument(format!("{e:#}")))?;
        let tag = options.tag.as_deref().or(self.config.default_tag.as_deref());
        let (metas, issues) = build_channels(&doc, tag)?;
        fail_if_issues(&issues)?;

        let mut requests: Vec<ServerRequest> = Vec::new();
        let mut factories: HashMap<String, Arc<dyn AdapterFactory>> = HashMap::new();
        for meta in &metas {
            for server_name in &meta.servers {
                if factories.contains_key(server_name) {
                    continue;
                }
                let server = doc.server(server_name).ok_or_else(|| PublishError::UnknownServer {
                    channel: meta.name.clone(),
                    server: server_name.clone(),
                })?;
                let factory = self.plugins.get(&server.protocol).ok_or_else(|| {
                    error!(server = %server.name, protocol = %server.protocol, "No plugin for protocol");
                    PublishError::UnknownProtocol {
                        protocol: server.protocol.clone(),
                        server: server.name.clone(),
                    }
                })?;
                factories.insert(server_name.clone(), Arc::clone(&factory));
                requests.push(ServerRequest {
                    server: server.clone(),
                    factory,
                });
            }
        }

        let connections = self
            .registry
            .resolve_all(&requests, &options.connections)
            .await?;

        let mut channels: Vec<Arc<Channel>> = Vec::with_capacity(metas.len());
        for meta in metas {
            let name = meta.name.clone();
            match self.build_channel(meta, &doc, &factories, &connections).await {
                Ok(channel) => channels.push(Arc::new(channel)),
                Err(e) => {
                    error!(channel = %name, error = %e, "Failed to build channel");
                    stop_all(&channels).await;
                    return Err(e);
                }
            }
        }

        let router = TopicRouter::new(channels.iter().map(|c| c.matcher().clone()).collect());
        info!(
            title = %doc.title,
            version = %doc.version,
            channels = channels.len(),
            servers = connections.len(),
            tag = ?tag,
            "API loaded"
        );
        let previous = self.snapshot.swap(Arc::new(Snapshot { router, channels }));
        if !previous.channels.is_empty() {
            debug!(channels = previous.channels.len(), "Stopping adapters of previous load");
            stop_all(&previous.channels).await;
        }
        Ok(())
    }

    async fn build_channel(
        &self,
        meta: ChannelMeta,
        doc: &ApiDocument,
        factories: &HashMap<String, Arc<dyn AdapterFactory>>,
        connections: &HashMap<String, Connection>,
    ) -> Result<Channel, PublishError> {
        let bound = try_join_all(meta.servers.iter().map(|server_name| {
            let meta = &meta;
            async move {
                let (Some(server), Some(factory), Some(connection)) = (
                    doc.server(server_name),
                    factories.get(server_name),
                    connections.get(server_name),
                ) else {
                    return Err(PublishError::UnknownServer {
                        channel: meta.name.clone(),
                        server: server_name.clone(),
                    });
                };
                let protocol = server.protocol.as_str();
                let mut adapter = factory.create_adapter(connection.clone())?;
                adapter
                    .bind(
                        &meta.binding(BindingLevel::Channel, protocol),
                        &meta.binding(BindingLevel::Operation, protocol),
                    )
                    .await
                    .map_err(|e| {
                        error!(channel = %meta.name, server = %server_name, error = %e, "Adapter bind failed");
                        e
                    })?;
                debug!(channel = %meta.name, server = %server_name, protocol = %protocol, "Adapter bound");
                Ok(Target::new(
                    server_name.clone(),
                    protocol,
                    Arc::from(adapter),
                    meta.merged_message_binding(protocol),
                ))
            }
        }))
        .await?;

        Channel::new(meta, &self.config.topic, bound)
    }

    /// Validate and publish `message` to every server of the channel `topic` routes to.
    ///
    /// Parameters, then headers, then the body are validated; the first
    /// failure aborts the publish before anything is sent. Returns one
    /// adapter result per target, in server-binding order.
    pub async fn publish(
        &self,
        topic: &str,
        message: impl Serialize,
        headers: Map<String, Value>,
        options: Map<String, Value>,
    ) -> Result<Vec<Value>, PublishError> {
        let publish_id = PublishId::new();
        let span = info_span!("publish", publish_id = %publish_id, topic = %topic);
        let message = serde_json::to_value(message)?;
        self.publish_value(topic, message, headers, options)
            .instrument(span)
            .await
    }

    /// [`publish`](Self::publish) with no headers and no options
    pub async fn publish_message(
        &self,
        topic: &str,
        message: impl Serialize,
    ) -> Result<Vec<Value>, PublishError> {
        self.publish(topic, message, Map::new(), Map::new()).await
    }

    async fn publish_value(
        &self,
        topic: &str,
        message: Value,
        headers: Map<String, Value>,
        options: Map<String, Value>,
    ) -> Result<Vec<Value>, PublishError> {
        let snapshot = self.snapshot.load_full();
        let Some(matched) = snapshot.router.route(topic)? else {
            warn!("No channel found for topic");
            return Err(PublishError::Unroutable {
                topic: topic.to_string(),
            });
        };
        let Some(channel) = snapshot.channels.get(matched.index) else {
            return Err(PublishError::Unroutable {
                topic: topic.to_string(),
            });
        };

        let raw_params: Map<String, Value> = matched
            .params
            .into_iter()
            .map(|(name, value)| (name.to_string(), Value::String(value)))
            .collect();

        let validated = channel
            .validate_params(raw_params)
            .and_then(|params| {
                channel.validate_headers(&headers)?;
                channel.validate_message(&message)?;
                Ok(params)
            })
            .map_err(|e| {
                warn!(
                    channel = %channel.name(),
                    kind = %e.kind,
                    schema_path = %e.schema_path,
                    "{}", e.message
                );
                e
            })?;

        debug!(channel = %channel.name(), targets = channel.targets().len(), "Publishing");
        channel
            .publish(Envelope {
                topic: topic.to_string(),
                params: validated,
                headers,
                message,
                options,
            })
            .await
    }

    /// Stop every adapter, drop the channel graph and tear down connections.
    ///
    /// With `close_connections`, connections the publisher opened are closed;
    /// caller-supplied connections are never closed. Calling `stop` again is
    /// a no-op.
    pub async fn stop(&self, close_connections: bool) -> Result<(), PublishError> {
        let _guard = self.lifecycle.lock().await;
        let previous = self.snapshot.swap(Arc::new(Snapshot::default()));

        let mut first_error = None;
        for channel in &previous.channels {
            if let Err(e) = channel.stop().await {
                first_error.get_or_insert(e);
            }
        }
        if let Err(e) = self.registry.teardown(close_connections).await {
            first_error.get_or_insert(e);
        }
        if !previous.channels.is_empty() {
            info!(channels = previous.channels.len(), close_connections, "Publisher stopped");
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Stop adapters of channels that are going away; failures are only logged
async fn stop_all(channels: &[Arc<Channel>]) {
    for channel in channels {
        if let Err(e) = channel.stop().await {
            warn!(channel = %channel.name(), error = %e, "Failed to stop adapters");
        }
    }
}
