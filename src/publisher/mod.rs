//! # Publisher Module
//!
//! The orchestrator: loads an AsyncAPI 2.x document into a channel graph and
//! publishes validated messages through it.
//!
//! ## Lifecycle
//!
//! ```text
//! Publisher::new(plugins)
//!     │
//!     ├─ load_api(source, options)   resolve connections, bind adapters,
//!     │                              swap in the new channel graph
//!     ├─ publish(topic, msg, ...)    route → params → headers → body → fan-out
//!     │   (any number, concurrently)
//!     └─ stop(close_connections)     stop adapters, drop graph, tear down
//! ```
//!
//! `load_api` and `stop` are serialized by a lifecycle lock. `publish` takes
//! no lock: it reads the current channel graph from an `ArcSwap` snapshot, so
//! a publish racing a reload completes against whichever graph it loaded.
//!
//! ## Example
//!
//! ```rust,no_run
//! use asyncapi_pub::{LoadOptions, PluginRegistry, Publisher};
//! use serde_json::json;
//!
//! # async fn run() -> Result<(), asyncapi_pub::PublishError> {
//! let publisher = Publisher::new(PluginRegistry::builtin());
//! publisher
//!     .load_api(std::path::Path::new("asyncapi.yaml"), LoadOptions::default())
//!     .await?;
//!
//! let results = publisher
//!     .publish_message("events/42", json!({"status": "started"}))
//!     .await?;
//! println!("{} target(s) accepted the message", results.len());
//!
//! publisher.stop(true).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Errors
//!
//! | Phase      | Typical error                                           |
//! |------------|---------------------------------------------------------|
//! | load       | `UnknownProtocol`, `UnknownServer`, `InvalidBinding`    |
//! | route      | `Unroutable` ("No channel found for topic ...")         |
//! | validate   | `Validation` with `ParamsInvalid`/`HeaderInvalid`/`BodyInvalid` |
//! | send       | `Transport`, `Serialization`                            |
//!
//! Nothing is sent unless routing and all three validations succeed.

mod core;

pub use self::core::{LoadOptions, Publisher};
