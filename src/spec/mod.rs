//! # Spec Module
//!
//! Loads AsyncAPI 2.x documents and extracts the outbound channel metadata the
//! publisher compiles.
//!
//! ## Overview
//!
//! - [`load_document`] / [`parse_document`] read YAML or JSON into an
//!   [`ApiDocument`], expanding local `$ref`s and substituting server URL
//!   variables.
//! - [`build_channels`] walks the channels in declaration order and yields a
//!   [`ChannelMeta`] for each one with a `subscribe` operation (the operation
//!   consumers subscribe to, i.e. what this application publishes).
//!
//! ## Example
//!
//! ```rust
//! use asyncapi_pub::spec::{build_channels, parse_document};
//!
//! let doc = parse_document(r#"
//! asyncapi: 2.6.0
//! info: { title: Jobs, version: "1.0.0" }
//! servers:
//!   broker: { url: "amqp://localhost:5672", protocol: amqp, protocolVersion: 0.9.1 }
//! channels:
//!   events/{id}:
//!     parameters:
//!       id: { schema: { type: string } }
//!     subscribe:
//!       message:
//!         payload: { type: object, required: [status] }
//! "#).unwrap();
//!
//! let (channels, _issues) = build_channels(&doc, None).unwrap();
//! assert_eq!(channels[0].name, "events/{id}");
//! assert_eq!(channels[0].servers, vec!["broker"]);
//! ```

mod build;
mod load;
mod types;

pub use build::*;
pub use load::*;
pub use types::*;
