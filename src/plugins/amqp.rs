//! AMQP 0.9.1 plugin.
//!
//! Binding semantics (exchange/queue assertion, publish option derivation)
//! live here; the socket-level client is supplied through [`AmqpConnector`].
//!
//! | Binding                      | Effect                                              |
//! |------------------------------|-----------------------------------------------------|
//! | channel `is: queue`          | messages go straight to `queue.name` (required)     |
//! | channel `exchange.name`      | exchange asserted, messages routed by topic         |
//! | operation/message `deliveryMode` | `1` → non-persistent, `2` → persistent          |
//! | operation/message `timestamp`    | stamped with the send time in epoch millis      |

use crate::adapter::{AdapterFactory, Connection, Envelope, ProtocolAdapter};
use crate::error::PublishError;
use crate::spec::Server;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

pub const PROTOCOL: &str = "amqp";
pub const PROTOCOL_VERSION: &str = "0.9.1";

/// Binding fields copied to the publish options unchanged
const PASSTHROUGH_OPTIONS: [&str; 6] = [
    "expiration",
    "userId",
    "priority",
    "mandatory",
    "replyTo",
    "contentEncoding",
];

/// Opens broker connections.
#[async_trait]
pub trait AmqpConnector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Arc<dyn AmqpClient>, PublishError>;
}

/// An open broker connection, shared by every adapter of one server.
#[async_trait]
pub trait AmqpClient: Send + Sync {
    async fn create_channel(&self) -> Result<Box<dyn AmqpChannel>, PublishError>;
    async fn close(&self) -> Result<(), PublishError>;
}

/// A broker channel owned by one adapter.
#[async_trait]
pub trait AmqpChannel: Send + Sync {
    async fn assert_exchange(
        &self,
        name: &str,
        kind: &str,
        options: &Map<String, Value>,
    ) -> Result<(), PublishError>;

    async fn assert_queue(&self, name: &str, options: &Map<String, Value>)
        -> Result<(), PublishError>;

    /// Returns the broker's acknowledgement flag
    async fn send_to_queue(
        &self,
        queue: &str,
        content: &[u8],
        options: &Map<String, Value>,
    ) -> Result<bool, PublishError>;

    /// Returns the broker's acknowledgement flag
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        content: &[u8],
        options: &Map<String, Value>,
    ) -> Result<bool, PublishError>;

    async fn close(&self) -> Result<(), PublishError> {
        Ok(())
    }
}

/// Connection type handed out by [`AmqpFactory`]
pub type AmqpConnection = Arc<dyn AmqpClient>;

pub struct AmqpFactory {
    connector: Arc<dyn AmqpConnector>,
}

impl AmqpFactory {
    pub fn new(connector: Arc<dyn AmqpConnector>) -> Self {
        Self { connector }
    }
}

#[async_trait]
impl AdapterFactory for AmqpFactory {
    fn protocol(&self) -> &str {
        PROTOCOL
    }

    async fn get_connection(&self, server: &Server) -> Result<Connection, PublishError> {
        if server.protocol != PROTOCOL {
            return Err(PublishError::protocol_mismatch(
                &server.name,
                "Protocol should be amqp",
            ));
        }
        if server.protocol_version.as_deref() != Some(PROTOCOL_VERSION) {
            return Err(PublishError::protocol_mismatch(
                &server.name,
                "Only the 0.9.1 protocol is supported",
            ));
        }
        let client = self.connector.connect(&server.url).await?;
        Ok(Connection::new::<AmqpConnection>(client))
    }

    fn create_adapter(
        &self,
        connection: Connection,
    ) -> Result<Box<dyn ProtocolAdapter>, PublishError> {
        let client = connection
            .downcast_ref::<AmqpConnection>()
            .cloned()
            .ok_or_else(|| PublishError::transport(PROTOCOL, "connection is not an AMQP client"))?;
        Ok(Box::new(AmqpAdapter::new(client)))
    }

    async fn close_connection(&self, connection: Connection) -> Result<(), PublishError> {
        match connection.downcast_ref::<AmqpConnection>() {
            Some(client) => client.close().await,
            None => Ok(()),
        }
    }
}

/// Where a bound channel sends its messages
#[derive(Debug, Clone, PartialEq, Eq)]
enum Destination {
    Queue(String),
    /// Exchange name (empty for the default exchange)
    Exchange(String),
}

pub struct AmqpAdapter {
    client: AmqpConnection,
    channel: Option<Box<dyn AmqpChannel>>,
    destination: Destination,
    operation_bindings: Map<String, Value>,
}

impl AmqpAdapter {
    fn new(client: AmqpConnection) -> Self {
        Self {
            client,
            channel: None,
            destination: Destination::Exchange(String::new()),
            operation_bindings: Map::new(),
        }
    }
}

/// Binding object minus `name` (and `type` for exchanges), over the defaults
fn declare_options(binding: &Map<String, Value>, defaults: Value, skip: &[&str]) -> Map<String, Value> {
    let mut options = match defaults {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    for (k, v) in binding {
        if !skip.contains(&k.as_str()) {
            options.insert(k.clone(), v.clone());
        }
    }
    options
}

fn is_set(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) | Some(Value::Bool(false)) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(n)) => n.as_f64() != Some(0.0),
        Some(_) => true,
    }
}

/// Translate AMQP binding fields into publish options.
///
/// `deliveryMode` becomes `persistent`, `cc`/`bcc` become `CC`/`BCC`,
/// `messageType` becomes `type`, a truthy `timestamp` is replaced by the
/// current time, and [`PASSTHROUGH_OPTIONS`] are copied when set.
#[must_use]
pub fn publish_options(bindings: &Map<String, Value>) -> Map<String, Value> {
    let mut options = Map::new();

    if is_set(bindings.get("timestamp")) {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        options.insert("timestamp".into(), json!(u64::try_from(millis).unwrap_or(u64::MAX)));
    }
    match bindings.get("deliveryMode").and_then(Value::as_u64) {
        Some(1) => {
            options.insert("persistent".into(), Value::Bool(false));
        }
        Some(2) => {
            options.insert("persistent".into(), Value::Bool(true));
        }
        _ => {}
    }
    for (from, to) in [("cc", "CC"), ("bcc", "BCC"), ("messageType", "type")] {
        if let Some(v) = bindings.get(from).filter(|v| is_set(Some(v))) {
            options.insert(to.into(), v.clone());
        }
    }
    for key in PASSTHROUGH_OPTIONS {
        if let Some(v) = bindings.get(key).filter(|v| is_set(Some(v))) {
            options.insert(key.into(), v.clone());
        }
    }
    options
}

/// Assert the exchange and queue named by the channel binding.
///
/// Returns the destination when the binding names one.
async fn declare(
    amqp_channel: &dyn AmqpChannel,
    is_queue: bool,
    exchange: Option<&Map<String, Value>>,
    queue: Option<&Map<String, Value>>,
    queue_name: Option<&str>,
) -> Result<Option<Destination>, PublishError> {
    let mut destination = None;

    if !is_queue {
        if let Some((exchange, name)) = exchange.and_then(|ex| {
            ex.get("name")
                .and_then(Value::as_str)
                .filter(|n| !n.is_empty())
                .map(|n| (ex, n))
        }) {
            let kind = exchange.get("type").and_then(Value::as_str).unwrap_or("topic");
            let options = declare_options(
                exchange,
                json!({"durable": true, "internal": false, "autoDelete": false}),
                &["name", "type"],
            );
            amqp_channel.assert_exchange(name, kind, &options).await?;
            debug!(exchange = %name, kind = %kind, "Exchange asserted");
            destination = Some(Destination::Exchange(name.to_string()));
        }
    }

    if let (Some(queue), Some(name)) = (queue, queue_name) {
        let options = declare_options(
            queue,
            json!({"durable": true, "exclusive": false, "autoDelete": false}),
            &["name"],
        );
        amqp_channel.assert_queue(name, &options).await?;
        debug!(queue = %name, "Queue asserted");
        if is_queue {
            destination = Some(Destination::Queue(name.to_string()));
        }
    }
    Ok(destination)
}

#[async_trait]
impl ProtocolAdapter for AmqpAdapter {
    async fn bind(&mut self, channel: &Value, operation: &Value) -> Result<(), PublishError> {
        self.operation_bindings = operation.as_object().cloned().unwrap_or_default();

        let is_queue = channel.get("is").and_then(Value::as_str) == Some("queue");
        let exchange = channel.get("exchange").and_then(Value::as_object);
        let queue = channel.get("queue").and_then(Value::as_object);
        let queue_name = queue
            .and_then(|q| q.get("name"))
            .and_then(Value::as_str)
            .filter(|n| !n.is_empty());

        if is_queue && queue_name.is_none() {
            return Err(PublishError::binding(
                "Channel type \"queue\" should have a queue name defined",
            ));
        }

        let amqp_channel = self.client.create_channel().await?;
        match declare(amqp_channel.as_ref(), is_queue, exchange, queue, queue_name).await {
            Ok(destination) => {
                if let Some(destination) = destination {
                    self.destination = destination;
                }
                self.channel = Some(amqp_channel);
                Ok(())
            }
            Err(err) => {
                if let Err(close_err) = amqp_channel.close().await {
                    warn!(error = %close_err, "Failed to close channel after declaration error");
                }
                Err(err)
            }
        }
    }

    async fn publish(
        &self,
        envelope: &Envelope,
        bindings: &Map<String, Value>,
    ) -> Result<Value, PublishError> {
        let channel = self
            .channel
            .as_ref()
            .ok_or_else(|| PublishError::transport(PROTOCOL, "adapter is not bound"))?;
        let content = envelope.payload()?;

        let mut merged = self.operation_bindings.clone();
        merged.extend(bindings.iter().map(|(k, v)| (k.clone(), v.clone())));
        let mut options = publish_options(&merged);
        options.extend(envelope.options.iter().map(|(k, v)| (k.clone(), v.clone())));
        options.insert("headers".into(), Value::Object(envelope.headers.clone()));

        let acked = match &self.destination {
            Destination::Queue(queue) => {
                debug!(queue = %queue, topic = %envelope.topic, "Sending to queue");
                channel.send_to_queue(queue, content.as_bytes(), &options).await?
            }
            Destination::Exchange(exchange) => {
                debug!(exchange = %exchange, routing_key = %envelope.topic, "Publishing to exchange");
                channel
                    .publish(exchange, &envelope.topic, content.as_bytes(), &options)
                    .await?
            }
        };
        Ok(Value::Bool(acked))
    }

    async fn stop(&self) -> Result<(), PublishError> {
        if let Some(channel) = &self.channel {
            channel.close().await?;
            info!("AMQP channel closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_delivery_mode_maps_to_persistent() {
        let opts = publish_options(&bindings(json!({"deliveryMode": 2})));
        assert_eq!(opts["persistent"], json!(true));
        let opts = publish_options(&bindings(json!({"deliveryMode": 1})));
        assert_eq!(opts["persistent"], json!(false));
        let opts = publish_options(&bindings(json!({"deliveryMode": 3})));
        assert!(!opts.contains_key("persistent"));
    }

    #[test]
    fn test_renamed_and_passthrough_options() {
        let opts = publish_options(&bindings(json!({
            "cc": ["audit"],
            "bcc": ["shadow"],
            "messageType": "job.started",
            "priority": 5,
            "replyTo": "",
            "bindingVersion": "0.2.0"
        })));
        assert_eq!(opts["CC"], json!(["audit"]));
        assert_eq!(opts["BCC"], json!(["shadow"]));
        assert_eq!(opts["type"], json!("job.started"));
        assert_eq!(opts["priority"], json!(5));
        assert!(!opts.contains_key("replyTo"));
        assert!(!opts.contains_key("bindingVersion"));
    }

    #[test]
    fn test_timestamp_is_stamped() {
        let opts = publish_options(&bindings(json!({"timestamp": true})));
        assert!(opts["timestamp"].as_u64().unwrap() > 0);
        let opts = publish_options(&bindings(json!({"timestamp": false})));
        assert!(!opts.contains_key("timestamp"));
    }

    #[test]
    fn test_declare_options_override_defaults() {
        let exchange = bindings(json!({"name": "jobs", "type": "topic", "durable": false}));
        let opts = declare_options(
            &exchange,
            json!({"durable": true, "internal": false, "autoDelete": false}),
            &["name", "type"],
        );
        assert_eq!(
            Value::Object(opts),
            json!({"durable": false, "internal": false, "autoDelete": false})
        );
    }
}
