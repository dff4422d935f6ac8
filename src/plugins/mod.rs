//! # Plugins Module
//!
//! Static registry mapping protocol identifiers to [`AdapterFactory`]
//! implementations, plus the built-in plugins.
//!
//! | Protocol        | Factory          | Transport                        | In `builtin()` |
//! |-----------------|------------------|----------------------------------|----------------|
//! | `amqp`          | [`AmqpFactory`]  | embedder's [`AmqpConnector`]     | no             |
//! | `kafka`         | [`KafkaFactory`] | embedder's [`KafkaConnector`]    | no             |
//! | `http`, `https` | [`HttpFactory`]  | `reqwest`                        | yes            |
//!
//! AMQP and Kafka need a wire client, so they are only registered once the
//! embedder supplies one; until then a document using them fails to load with
//! [`PublishError::UnknownProtocol`](crate::PublishError::UnknownProtocol).
//!
//! ```rust,ignore
//! let plugins = PluginRegistry::builtin()
//!     .with_amqp(Arc::new(MyAmqpConnector::new()))
//!     .with_kafka(Arc::new(MyKafkaConnector::new()));
//! ```
//!
//! [`AmqpConnector`]: amqp::AmqpConnector
//! [`KafkaConnector`]: kafka::KafkaConnector

pub mod amqp;
pub mod http;
pub mod kafka;

pub use amqp::AmqpFactory;
pub use self::http::HttpFactory;
pub use kafka::KafkaFactory;

use crate::adapter::AdapterFactory;
use amqp::AmqpConnector;
use kafka::KafkaConnector;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// Protocol id → factory.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    factories: HashMap<String, Arc<dyn AdapterFactory>>,
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("protocols", &self.protocols())
            .finish()
    }
}

impl PluginRegistry {
    /// An empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `http` and `https` on reqwest
    #[must_use]
    pub fn builtin() -> Self {
        let http: Arc<dyn AdapterFactory> = Arc::new(HttpFactory::new());
        Self::new()
            .with(http::PROTOCOL, Arc::clone(&http))
            .with(http::SECURE_PROTOCOL, http)
    }

    /// Register the AMQP plugin over `connector`
    #[must_use]
    pub fn with_amqp(self, connector: Arc<dyn AmqpConnector>) -> Self {
        self.with(amqp::PROTOCOL, Arc::new(AmqpFactory::new(connector)))
    }

    /// Register the Kafka plugin over `connector`; `kafka-secure` servers use it too
    #[must_use]
    pub fn with_kafka(self, connector: Arc<dyn KafkaConnector>) -> Self {
        let factory: Arc<dyn AdapterFactory> = Arc::new(KafkaFactory::new(connector));
        self.with(kafka::PROTOCOL, Arc::clone(&factory))
            .with(kafka::SECURE_PROTOCOL, factory)
    }

    /// Register `factory` for `protocol`, returning the one it replaces
    pub fn register(
        &mut self,
        protocol: impl Into<String>,
        factory: Arc<dyn AdapterFactory>,
    ) -> Option<Arc<dyn AdapterFactory>> {
        let protocol = protocol.into();
        let replaced = self.factories.insert(protocol.clone(), factory);
        if replaced.is_some() {
            warn!(protocol = %protocol, "Replaced existing protocol plugin");
        } else {
            info!(protocol = %protocol, total = self.factories.len(), "Protocol plugin registered");
        }
        replaced
    }

    /// Builder form of [`register`](Self::register)
    #[must_use]
    pub fn with(mut self, protocol: impl Into<String>, factory: Arc<dyn AdapterFactory>) -> Self {
        let _ = self.register(protocol, factory);
        self
    }

    #[must_use]
    pub fn get(&self, protocol: &str) -> Option<Arc<dyn AdapterFactory>> {
        self.factories.get(protocol).cloned()
    }

    /// Registered protocol ids, sorted
    #[must_use]
    pub fn protocols(&self) -> Vec<&str> {
        let mut protocols: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        protocols.sort_unstable();
        protocols
    }
}
