//! Kafka plugin.
//!
//! Servers are grouped into clusters: every server carrying the same single
//! tag joins one cluster (servers with zero or several tags join `no-tag`),
//! and the cluster's broker list is the union of their URLs. Producers are
//! created lazily at bind time and shared per (cluster, clientId).

use crate::adapter::{value_to_string, AdapterFactory, Connection, Envelope, ProtocolAdapter};
use crate::error::{PublishError, ValidationKind};
use crate::schema::SchemaValidator;
use crate::spec::Server;
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

pub const PROTOCOL: &str = "kafka";
pub const SECURE_PROTOCOL: &str = "kafka-secure";
/// Cluster name for servers without exactly one tag
pub const DEFAULT_CLUSTER: &str = "no-tag";

/// What a producer is created for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerConfig {
    pub cluster: String,
    pub client_id: Option<String>,
    pub brokers: Vec<String>,
}

/// A record as handed to the producer
#[derive(Debug, Clone, PartialEq)]
pub struct KafkaRecord {
    pub topic: String,
    pub key: Option<String>,
    pub value: String,
    pub partition: Option<i64>,
    pub headers: Map<String, Value>,
}

/// Creates connected producers.
#[async_trait]
pub trait KafkaConnector: Send + Sync {
    async fn producer(&self, config: &ProducerConfig) -> Result<Arc<dyn KafkaProducer>, PublishError>;
}

#[async_trait]
pub trait KafkaProducer: Send + Sync {
    /// Send one record, returning its record metadata
    async fn send(&self, record: KafkaRecord) -> Result<Value, PublishError>;
    async fn disconnect(&self) -> Result<(), PublishError>;
}

#[derive(Default)]
struct Cluster {
    brokers: Vec<String>,
    producers: HashMap<Option<String>, Arc<dyn KafkaProducer>>,
}

#[derive(Default)]
struct Clusters {
    by_name: Mutex<HashMap<String, Cluster>>,
}

/// Connection type handed out by [`KafkaFactory`]: the cluster a server joined
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterName(pub String);

pub struct KafkaFactory {
    connector: Arc<dyn KafkaConnector>,
    clusters: Arc<Clusters>,
}

impl KafkaFactory {
    pub fn new(connector: Arc<dyn KafkaConnector>) -> Self {
        Self {
            connector,
            clusters: Arc::new(Clusters::default()),
        }
    }

    /// Broker list accumulated for `cluster`
    pub async fn brokers(&self, cluster: &str) -> Vec<String> {
        self.clusters
            .by_name
            .lock()
            .await
            .get(cluster)
            .map(|c| c.brokers.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl AdapterFactory for KafkaFactory {
    fn protocol(&self) -> &str {
        PROTOCOL
    }

    async fn get_connection(&self, server: &Server) -> Result<Connection, PublishError> {
        if server.protocol != PROTOCOL && server.protocol != SECURE_PROTOCOL {
            return Err(PublishError::protocol_mismatch(
                &server.name,
                "Protocol should be kafka",
            ));
        }
        let cluster = server.single_tag().unwrap_or(DEFAULT_CLUSTER).to_string();
        let mut clusters = self.clusters.by_name.lock().await;
        let entry = clusters.entry(cluster.clone()).or_default();
        if !entry.brokers.contains(&server.url) {
            entry.brokers.push(server.url.clone());
        }
        debug!(server = %server.name, cluster = %cluster, brokers = entry.brokers.len(), "Server joined cluster");
        Ok(Connection::new(ClusterName(cluster)))
    }

    fn create_adapter(
        &self,
        connection: Connection,
    ) -> Result<Box<dyn ProtocolAdapter>, PublishError> {
        let cluster = connection
            .downcast_ref::<ClusterName>()
            .cloned()
            .ok_or_else(|| PublishError::transport(PROTOCOL, "connection is not a Kafka cluster"))?;
        Ok(Box::new(KafkaAdapter {
            cluster,
            connector: Arc::clone(&self.connector),
            clusters: Arc::clone(&self.clusters),
            producer: None,
            topic: None,
            partitions: None,
            key_validator: OnceCell::new(),
        }))
    }

    /// Disconnects every producer of the cluster and forgets it
    async fn close_connection(&self, connection: Connection) -> Result<(), PublishError> {
        let Some(ClusterName(name)) = connection.downcast_ref::<ClusterName>() else {
            return Ok(());
        };
        let removed = self.clusters.by_name.lock().await.remove(name);
        if let Some(cluster) = removed {
            for producer in cluster.producers.values() {
                producer.disconnect().await?;
            }
            info!(cluster = %name, producers = cluster.producers.len(), "Kafka cluster disconnected");
        }
        Ok(())
    }
}

pub struct KafkaAdapter {
    cluster: ClusterName,
    connector: Arc<dyn KafkaConnector>,
    clusters: Arc<Clusters>,
    producer: Option<Arc<dyn KafkaProducer>>,
    topic: Option<String>,
    partitions: Option<i64>,
    key_validator: OnceCell<SchemaValidator>,
}

/// `clientId.enum` when it lists exactly one string
fn single_client_id(operation: &Value) -> Option<String> {
    match operation.pointer("/clientId/enum")?.as_array()?.as_slice() {
        [Value::String(id)] => Some(id.clone()),
        _ => None,
    }
}

impl KafkaAdapter {
    fn validate_key(&self, key: &Value, bindings: &Map<String, Value>) -> Result<(), PublishError> {
        let Some(schema) = bindings.get("key") else {
            return Ok(());
        };
        let validator = self.key_validator.get_or_try_init(|| {
            SchemaValidator::compile(
                ValidationKind::ParamsInvalid,
                Some(schema.clone()),
                true,
            )
            .map_err(|reason| PublishError::InvalidSchema {
                channel: self.topic.clone().unwrap_or_default(),
                kind: ValidationKind::ParamsInvalid,
                reason,
            })
        })?;
        validator.coerce_and_validate(key.clone())?;
        Ok(())
    }
}

#[async_trait]
impl ProtocolAdapter for KafkaAdapter {
    async fn bind(&mut self, channel: &Value, operation: &Value) -> Result<(), PublishError> {
        let client_id = single_client_id(operation);
        let cluster_name = &self.cluster.0;

        let mut clusters = self.clusters.by_name.lock().await;
        let cluster = clusters.entry(cluster_name.clone()).or_default();
        let producer = match cluster.producers.get(&client_id) {
            Some(existing) => {
                debug!(cluster = %cluster_name, client_id = ?client_id, "Re-using existing producer");
                Arc::clone(existing)
            }
            None => {
                let config = ProducerConfig {
                    cluster: cluster_name.clone(),
                    client_id: client_id.clone(),
                    brokers: cluster.brokers.clone(),
                };
                info!(cluster = %cluster_name, client_id = ?client_id, brokers = ?config.brokers, "Connecting producer");
                let producer = self.connector.producer(&config).await?;
                cluster.producers.insert(client_id, Arc::clone(&producer));
                producer
            }
        };
        drop(clusters);

        self.producer = Some(producer);
        self.topic = channel
            .get("topic")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        self.partitions = channel.get("partitions").and_then(Value::as_i64).filter(|p| *p > 0);
        Ok(())
    }

    async fn publish(
        &self,
        envelope: &Envelope,
        bindings: &Map<String, Value>,
    ) -> Result<Value, PublishError> {
        let producer = self
            .producer
            .as_ref()
            .ok_or_else(|| PublishError::transport(PROTOCOL, "adapter is not bound"))?;

        let partition = envelope.options.get("partition").and_then(Value::as_i64);
        if let (Some(partitions), Some(asked)) = (self.partitions, partition) {
            if asked > partitions {
                return Err(PublishError::transport(
                    PROTOCOL,
                    format!("Partition mismatch: asked for partition {asked} but only {partitions} partitions are set"),
                ));
            }
        }

        let key = envelope.options.get("key").filter(|k| !k.is_null());
        if let Some(key) = key {
            self.validate_key(key, bindings)?;
        }

        let record = KafkaRecord {
            topic: self.topic.clone().unwrap_or_else(|| envelope.topic.clone()),
            key: key.map(value_to_string),
            value: envelope.payload()?,
            partition,
            headers: envelope.headers.clone(),
        };
        debug!(topic = %record.topic, partition = ?record.partition, "Publishing record");
        producer.send(record).await
    }
}
