//! # Adapter Module
//!
//! The contract between the publisher and protocol plugins.
//!
//! A plugin is split in two halves:
//!
//! - [`AdapterFactory`] lives for the whole process and owns the connection
//!   lifecycle: `get_connection` for a server, `close_connection` at teardown,
//!   and `create_adapter` to build a per-channel adapter on a connection.
//! - [`ProtocolAdapter`] is created once per (channel, server) target. It is
//!   bound once at load time and then publishes every message routed to the
//!   channel.
//!
//! ```text
//! load_api ──► factory.get_connection(server) ──► Connection (shared)
//!          └─► factory.create_adapter(conn) ──► adapter.bind(channel, operation)
//! publish  ──► adapter.publish(envelope, message bindings) ──► Value
//! stop     ──► adapter.stop() ──► factory.close_connection(conn)
//! ```
//!
//! Connections are opaque [`Connection`] handles; each factory downcasts them
//! back to its own type.

mod core;

pub use self::core::{
    encode_payload, value_to_string, AdapterFactory, Connection, Envelope, ProtocolAdapter,
};
