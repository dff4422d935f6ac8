use crate::error::PublishError;
use crate::spec::Server;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Opaque, reference-counted transport connection.
///
/// Whatever an [`AdapterFactory`] hands out from `get_connection` is wrapped
/// here so the registry can share it between every adapter bound to the same
/// server without knowing its concrete type. Cloning never copies the
/// underlying connection.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<dyn Any + Send + Sync>,
}

impl Connection {
    pub fn new<T: Any + Send + Sync>(inner: T) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn from_arc<T: Any + Send + Sync>(inner: Arc<T>) -> Self {
        Self { inner }
    }

    /// Shared handle to the concrete connection, if it is a `T`
    #[must_use]
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.inner).downcast::<T>().ok()
    }

    #[must_use]
    pub fn downcast_ref<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// True when both handles point at the same connection
    #[must_use]
    pub fn ptr_eq(&self, other: &Connection) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of live handles, registry entry included
    #[must_use]
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("ptr", &Arc::as_ptr(&self.inner).cast::<()>())
            .finish()
    }
}

/// One outbound message, as handed to every target of a channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// The concrete topic the caller published to
    pub topic: String,
    /// Topic parameters after coercion and validation
    pub params: Map<String, Value>,
    pub headers: Map<String, Value>,
    pub message: Value,
    /// Per-send options; they win over binding-derived defaults
    pub options: Map<String, Value>,
}

impl Envelope {
    /// Wire form of the message (see [`encode_payload`])
    pub fn payload(&self) -> Result<String, PublishError> {
        encode_payload(&self.message)
    }
}

/// Serialize a message for the wire.
///
/// JSON strings are sent verbatim, everything else as JSON text.
pub fn encode_payload(message: &Value) -> Result<String, PublishError> {
    match message {
        Value::String(s) => Ok(s.clone()),
        other => Ok(serde_json::to_string(other)?),
    }
}

/// Render a header or option value as a plain string
#[must_use]
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// The connection-level half of a protocol plugin.
///
/// One factory serves every server of its protocol. It creates and closes the
/// shared connections and builds one [`ProtocolAdapter`] per channel target.
#[async_trait]
pub trait AdapterFactory: Send + Sync {
    /// Protocol name used in logs and errors
    fn protocol(&self) -> &str;

    /// Open a connection to `server`.
    ///
    /// Must fail with a configuration error ([`PublishError::ProtocolMismatch`])
    /// when the server's protocol or protocol version is not supported.
    async fn get_connection(&self, server: &Server) -> Result<Connection, PublishError>;

    /// Build an unbound adapter on top of a (possibly shared) connection
    fn create_adapter(&self, connection: Connection)
        -> Result<Box<dyn ProtocolAdapter>, PublishError>;

    /// Close a connection this factory created. The default does nothing.
    async fn close_connection(&self, connection: Connection) -> Result<(), PublishError> {
        let _ = connection;
        Ok(())
    }
}

/// One transport connection bound to one channel.
#[async_trait]
pub trait ProtocolAdapter: Send + Sync {
    /// One-time setup from the channel and operation bindings of the adapter's
    /// protocol (empty objects when the document declares none).
    async fn bind(&mut self, channel: &Value, operation: &Value) -> Result<(), PublishError>;

    /// Send one message.
    ///
    /// `bindings` is the operation binding overlaid by the message binding.
    /// The returned value is adapter-defined.
    async fn publish(
        &self,
        envelope: &Envelope,
        bindings: &Map<String, Value>,
    ) -> Result<Value, PublishError>;

    /// Release adapter-local resources. Never closes the shared connection.
    async fn stop(&self) -> Result<(), PublishError> {
        Ok(())
    }
}
