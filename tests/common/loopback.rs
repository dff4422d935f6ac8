//! In-process broker for the AMQP and Kafka connectors; records every
//! declaration and delivery instead of sending it.

use asyncapi_pub::plugins::amqp::{AmqpChannel, AmqpClient, AmqpConnector};
use asyncapi_pub::plugins::kafka::{KafkaConnector, KafkaProducer, KafkaRecord, ProducerConfig};
use asyncapi_pub::PublishError;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// One message accepted by the loopback broker
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub protocol: &'static str,
    /// Queue, exchange or Kafka topic the message was sent to
    pub destination: String,
    /// AMQP routing key or Kafka record key
    pub key: Option<String>,
    pub partition: Option<i64>,
    pub payload: String,
    pub headers: Map<String, Value>,
    /// AMQP publish options (empty for Kafka)
    pub options: Map<String, Value>,
}

/// A queue or exchange declaration
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub name: String,
    /// Exchange type; `None` for queues
    pub kind: Option<String>,
    pub options: Map<String, Value>,
}

#[derive(Default)]
struct State {
    deliveries: Mutex<Vec<Delivery>>,
    exchanges: Mutex<Vec<Declaration>>,
    queues: Mutex<Vec<Declaration>>,
    connections: Mutex<Vec<String>>,
    producers: Mutex<Vec<ProducerConfig>>,
    open_connections: AtomicU64,
    open_channels: AtomicU64,
    offset: AtomicU64,
    failing: AtomicBool,
    failing_declarations: AtomicBool,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared handle to one in-process broker. Clones observe the same state.
#[derive(Clone, Default)]
pub struct LoopbackBroker {
    state: Arc<State>,
}

impl LoopbackBroker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent send fail with a transport error
    pub fn set_failing(&self, failing: bool) {
        self.state.failing.store(failing, Ordering::SeqCst);
    }

    /// Make every subsequent exchange/queue assertion fail
    pub fn set_failing_declarations(&self, failing: bool) {
        self.state.failing_declarations.store(failing, Ordering::SeqCst);
    }

    fn check_declaration(&self, name: &str) -> Result<(), PublishError> {
        if self.state.failing_declarations.load(Ordering::SeqCst) {
            return Err(PublishError::transport("amqp", format!("cannot declare '{name}'")));
        }
        Ok(())
    }

    #[must_use]
    pub fn deliveries(&self) -> Vec<Delivery> {
        lock(&self.state.deliveries).clone()
    }

    #[must_use]
    pub fn exchanges(&self) -> Vec<Declaration> {
        lock(&self.state.exchanges).clone()
    }

    #[must_use]
    pub fn queues(&self) -> Vec<Declaration> {
        lock(&self.state.queues).clone()
    }

    /// URLs of every AMQP connection ever opened, in order
    #[must_use]
    pub fn connections(&self) -> Vec<String> {
        lock(&self.state.connections).clone()
    }

    /// Kafka producers ever created, in order
    #[must_use]
    pub fn producers(&self) -> Vec<ProducerConfig> {
        lock(&self.state.producers).clone()
    }

    /// AMQP connections plus Kafka producers not yet closed
    #[must_use]
    pub fn open_connections(&self) -> u64 {
        self.state.open_connections.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn open_channels(&self) -> u64 {
        self.state.open_channels.load(Ordering::SeqCst)
    }

    fn record(&self, protocol: &'static str, delivery: Delivery) -> Result<u64, PublishError> {
        if self.state.failing.load(Ordering::SeqCst) {
            return Err(PublishError::transport(protocol, "loopback broker is failing"));
        }
        debug!(protocol, destination = %delivery.destination, "Loopback delivery");
        lock(&self.state.deliveries).push(delivery);
        Ok(self.state.offset.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl AmqpConnector for LoopbackBroker {
    async fn connect(&self, url: &str) -> Result<Arc<dyn AmqpClient>, PublishError> {
        lock(&self.state.connections).push(url.to_string());
        self.state.open_connections.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(LoopbackAmqpClient {
            broker: self.clone(),
            closed: AtomicBool::new(false),
        }))
    }
}

struct LoopbackAmqpClient {
    broker: LoopbackBroker,
    closed: AtomicBool,
}

#[async_trait]
impl AmqpClient for LoopbackAmqpClient {
    async fn create_channel(&self) -> Result<Box<dyn AmqpChannel>, PublishError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(PublishError::transport("amqp", "connection is closed"));
        }
        self.broker.state.open_channels.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(LoopbackAmqpChannel {
            broker: self.broker.clone(),
            closed: AtomicBool::new(false),
        }))
    }

    async fn close(&self) -> Result<(), PublishError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.broker.state.open_connections.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

struct LoopbackAmqpChannel {
    broker: LoopbackBroker,
    closed: AtomicBool,
}

#[async_trait]
impl AmqpChannel for LoopbackAmqpChannel {
    async fn assert_exchange(
        &self,
        name: &str,
        kind: &str,
        options: &Map<String, Value>,
    ) -> Result<(), PublishError> {
        self.broker.check_declaration(name)?;
        lock(&self.broker.state.exchanges).push(Declaration {
            name: name.to_string(),
            kind: Some(kind.to_string()),
            options: options.clone(),
        });
        Ok(())
    }

    async fn assert_queue(
        &self,
        name: &str,
        options: &Map<String, Value>,
    ) -> Result<(), PublishError> {
        self.broker.check_declaration(name)?;
        lock(&self.broker.state.queues).push(Declaration {
            name: name.to_string(),
            kind: None,
            options: options.clone(),
        });
        Ok(())
    }

    async fn send_to_queue(
        &self,
        queue: &str,
        content: &[u8],
        options: &Map<String, Value>,
    ) -> Result<bool, PublishError> {
        self.broker.record("amqp", amqp_delivery(queue, None, content, options))?;
        Ok(true)
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        content: &[u8],
        options: &Map<String, Value>,
    ) -> Result<bool, PublishError> {
        self.broker
            .record("amqp", amqp_delivery(exchange, Some(routing_key), content, options))?;
        Ok(true)
    }

    async fn close(&self) -> Result<(), PublishError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.broker.state.open_channels.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

fn amqp_delivery(
    destination: &str,
    routing_key: Option<&str>,
    content: &[u8],
    options: &Map<String, Value>,
) -> Delivery {
    let mut options = options.clone();
    let headers = match options.remove("headers") {
        Some(Value::Object(headers)) => headers,
        _ => Map::new(),
    };
    Delivery {
        protocol: "amqp",
        destination: destination.to_string(),
        key: routing_key.map(str::to_string),
        partition: None,
        payload: String::from_utf8_lossy(content).into_owned(),
        headers,
        options,
    }
}

#[async_trait]
impl KafkaConnector for LoopbackBroker {
    async fn producer(
        &self,
        config: &ProducerConfig,
    ) -> Result<Arc<dyn KafkaProducer>, PublishError> {
        lock(&self.state.producers).push(config.clone());
        self.state.open_connections.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(LoopbackProducer {
            broker: self.clone(),
            connected: AtomicBool::new(true),
        }))
    }
}

struct LoopbackProducer {
    broker: LoopbackBroker,
    connected: AtomicBool,
}

#[async_trait]
impl KafkaProducer for LoopbackProducer {
    async fn send(&self, record: KafkaRecord) -> Result<Value, PublishError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(PublishError::transport("kafka", "producer is disconnected"));
        }
        let partition = record.partition.unwrap_or(0);
        let topic = record.topic.clone();
        let offset = self.broker.record(
            "kafka",
            Delivery {
                protocol: "kafka",
                destination: record.topic,
                key: record.key,
                partition: record.partition,
                payload: record.value,
                headers: record.headers,
                options: Map::new(),
            },
        )?;
        Ok(json!([{
            "topicName": topic,
            "partition": partition,
            "errorCode": 0,
            "baseOffset": offset.to_string(),
        }]))
    }

    async fn disconnect(&self) -> Result<(), PublishError> {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.broker.state.open_connections.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
