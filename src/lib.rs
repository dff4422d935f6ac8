//! # asyncapi-pub
//!
//! **asyncapi-pub** turns an [AsyncAPI 2.x](https://www.asyncapi.com/docs/reference/specification/v2.6.0)
//! document into a publish dispatcher: every outbound channel becomes a topic
//! matcher plus compiled parameter, header and payload schemas, bound to one
//! protocol adapter per server. Publishing a message routes its topic,
//! validates it, and fans it out concurrently to every bound server.
//!
//! ## Architecture
//!
//! - **[`spec`]** - Document loading, `$ref` expansion and channel extraction
//! - **[`router`]** - Topic pattern compilation and parameter extraction
//! - **[`schema`]** - Parameter/header/body validators (coercion, sanitizing)
//! - **[`adapter`]** - `AdapterFactory` / `ProtocolAdapter` plugin contract
//! - **[`plugins`]** - Plugin registry and the built-in AMQP, Kafka and HTTP plugins
//! - **[`registry`]** - Per-server connection registry shared by all channels
//! - **[`channel`]** - A loaded channel: matcher, validators and fan-out targets
//! - **[`publisher`]** - `load_api` / `publish` / `stop` orchestration
//! - **[`config`]**, **[`logging`]**, **[`ids`]** - Configuration, tracing setup, publish ids
//! - **[`cli`]** - The `asyncapi-pub` command line
//!
//! ### Publish Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Caller
//!     participant Pub as Publisher
//!     participant Router as TopicRouter
//!     participant Chan as Channel
//!     participant A1 as Adapter (server 1)
//!     participant A2 as Adapter (server 2)
//!
//!     Caller->>Pub: publish("events/42", body, headers, options)
//!     Pub->>Router: route("events/42")
//!     Router-->>Pub: channel #0, {id: "42"}
//!     Pub->>Chan: validate params, headers, body
//!     Chan-->>Pub: ok
//!     par fan-out
//!         Chan->>A1: publish(envelope, bindings)
//!         Chan->>A2: publish(envelope, bindings)
//!     end
//!     A1-->>Chan: result
//!     A2-->>Chan: result
//!     Chan-->>Caller: [result 1, result 2]
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use asyncapi_pub::{LoadOptions, PluginRegistry, Publisher};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), asyncapi_pub::PublishError> {
//! let doc = r#"
//! asyncapi: "2.6.0"
//! info: { title: Jobs, version: "1.0.0" }
//! servers:
//!   api: { url: "http://localhost:8080/hooks", protocol: http }
//! channels:
//!   events/{id}:
//!     parameters:
//!       id: { schema: { type: string } }
//!     subscribe:
//!       bindings:
//!         http: { type: request, method: POST }
//!       message:
//!         payload:
//!           type: object
//!           required: [status]
//!           properties: { status: { type: string } }
//! "#;
//!
//! let publisher = Publisher::new(PluginRegistry::builtin());
//! publisher.load_api(doc, LoadOptions::default()).await?;
//!
//! // POST http://localhost:8080/hooks/events/42
//! let results = publisher.publish_message("events/42", json!({"status": "started"})).await?;
//! assert_eq!(results[0]["status"], json!(200));
//!
//! let rejected = publisher.publish_message("events/42", json!({})).await;
//! assert!(rejected.is_err());
//!
//! publisher.stop(true).await?;
//! # Ok(())
//! # }
//! ```
//!
//! AMQP and Kafka servers need a wire client: register one with
//! [`PluginRegistry::with_amqp`] / [`PluginRegistry::with_kafka`].
//!
//! ## Runtime
//!
//! The crate is async on tokio. `publish` never takes a lock: the channel
//! graph is an immutable snapshot swapped atomically by `load_api` and `stop`.
//! Nothing is retried; every error reaches the immediate caller.

pub mod adapter;
pub mod channel;
pub mod cli;
pub mod config;
pub mod error;
pub mod ids;
pub mod logging;
pub mod plugins;
pub mod publisher;
pub mod registry;
pub mod router;
pub mod schema;
pub mod spec;

pub use adapter::{AdapterFactory, Connection, Envelope, ProtocolAdapter};
pub use channel::{Channel, Target};
pub use config::{PublisherConfig, TopicOptions};
pub use error::{ErrorCategory, PublishError, ValidationError, ValidationKind};
pub use ids::PublishId;
pub use plugins::PluginRegistry;
pub use publisher::{LoadOptions, Publisher};
pub use registry::ConnectionRegistry;
pub use spec::{load_document, parse_document, ApiDocument, ApiSource, ChannelMeta, Server};
