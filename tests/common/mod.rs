#![allow(dead_code)]

pub mod loopback;

pub mod fixtures {
    /// Round-trip document: one AMQP-style server, `events/{id}` requires `{status}`
    pub const EVENTS_DOC: &str = r#"
asyncapi: "2.6.0"
info:
  title: Events
  version: "1.0.0"
servers:
  primary:
    url: rec://primary
    protocol: rec
channels:
  events/{id}:
    parameters:
      id:
        schema:
          type: string
    subscribe:
      operationId: emitEvent
      tags:
        - name: events
      message:
        headers:
          $ref: '#/components/schemas/EventHeaders'
        payload:
          type: object
          required: [status]
          properties:
            status:
              type: string
            at:
              type: string
              format: date-time
  counters/{count}:
    parameters:
      count:
        schema:
          type: integer
          minimum: 1
    subscribe:
      tags:
        - name: metrics
      message:
        payload:
          type: object
  orphans/{id}:
    parameters:
      id:
        schema:
          type: string
      region:
        schema:
          type: string
    subscribe:
      message:
        payload:
          type: object
  inbound/{id}:
    parameters:
      id:
        schema:
          type: string
    publish:
      message:
        payload:
          type: object
components:
  schemas:
    EventHeaders:
      type: object
      required: [traceId]
      properties:
        traceId:
          type: string
          minLength: 3
"#;

    /// One channel bound to three servers in a fixed order, one shared by a second channel
    pub const FANOUT_DOC: &str = r#"
asyncapi: "2.6.0"
info:
  title: Fanout
  version: "1.0.0"
servers:
  alpha:
    url: rec://alpha
    protocol: rec
  beta:
    url: rec://beta
    protocol: rec
  gamma:
    url: rec://gamma
    protocol: rec
channels:
  jobs/{id}:
    servers: [gamma, alpha, beta]
    parameters:
      id:
        schema:
          type: string
    subscribe:
      bindings:
        rec:
          priority: 1
          mode: operation
      message:
        bindings:
          rec:
            mode: message
        payload:
          type: object
  audit:
    servers: [alpha]
    subscribe:
      message:
        payload:
          type: string
"#;
}

pub mod recording {
    use asyncapi_pub::{AdapterFactory, Connection, Envelope, ProtocolAdapter, PublishError, Server};
    use async_trait::async_trait;
    use serde_json::{json, Map, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// The connection handed out by [`RecordingFactory`]
    #[derive(Debug)]
    pub struct RecordingConnection {
        pub server: String,
        pub url: String,
        pub serial: usize,
    }

    /// One call to `ProtocolAdapter::publish`
    #[derive(Debug, Clone)]
    pub struct Published {
        pub server: String,
        pub connection_serial: usize,
        pub envelope: Envelope,
        pub bindings: Map<String, Value>,
    }

    #[derive(Default)]
    pub struct Recorder {
        pub opened: AtomicUsize,
        pub closed: AtomicUsize,
        pub binds: Mutex<Vec<(String, Value, Value)>>,
        pub published: Mutex<Vec<Published>>,
        pub stops: AtomicUsize,
    }

    impl Recorder {
        pub fn published(&self) -> Vec<Published> {
            self.published.lock().unwrap().clone()
        }

        pub fn opened(&self) -> usize {
            self.opened.load(Ordering::SeqCst)
        }

        pub fn closed(&self) -> usize {
            self.closed.load(Ordering::SeqCst)
        }

        pub fn stops(&self) -> usize {
            self.stops.load(Ordering::SeqCst)
        }
    }

    /// Adapter factory recording every lifecycle call
    pub struct RecordingFactory {
        pub recorder: Arc<Recorder>,
        /// Servers whose publishes fail
        pub failing: Vec<String>,
    }

    impl RecordingFactory {
        pub fn new() -> (Arc<Self>, Arc<Recorder>) {
            let recorder = Arc::new(Recorder::default());
            let factory = Arc::new(Self {
                recorder: Arc::clone(&recorder),
                failing: Vec::new(),
            });
            (factory, recorder)
        }

        pub fn failing_on(servers: &[&str]) -> (Arc<Self>, Arc<Recorder>) {
            let recorder = Arc::new(Recorder::default());
            let factory = Arc::new(Self {
                recorder: Arc::clone(&recorder),
                failing: servers.iter().map(|s| s.to_string()).collect(),
            });
            (factory, recorder)
        }
    }

    #[async_trait]
    impl AdapterFactory for RecordingFactory {
        fn protocol(&self) -> &str {
            "rec"
        }

        async fn get_connection(&self, server: &Server) -> Result<Connection, PublishError> {
            let serial = self.recorder.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Connection::new(RecordingConnection {
                server: server.name.clone(),
                url: server.url.clone(),
                serial,
            }))
        }

        fn create_adapter(
            &self,
            connection: Connection,
        ) -> Result<Box<dyn ProtocolAdapter>, PublishError> {
            let conn = connection
                .downcast::<RecordingConnection>()
                .ok_or_else(|| PublishError::transport("rec", "foreign connection"))?;
            let fail = self.failing.contains(&conn.server);
            Ok(Box::new(RecordingAdapter {
                conn,
                recorder: Arc::clone(&self.recorder),
                fail,
            }))
        }

        async fn close_connection(&self, _connection: Connection) -> Result<(), PublishError> {
            self.recorder.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    pub struct RecordingAdapter {
        conn: Arc<RecordingConnection>,
        recorder: Arc<Recorder>,
        fail: bool,
    }

    #[async_trait]
    impl ProtocolAdapter for RecordingAdapter {
        async fn bind(&mut self, channel: &Value, operation: &Value) -> Result<(), PublishError> {
            self.recorder.binds.lock().unwrap().push((
                self.conn.server.clone(),
                channel.clone(),
                operation.clone(),
            ));
            Ok(())
        }

        async fn publish(
            &self,
            envelope: &Envelope,
            bindings: &Map<String, Value>,
        ) -> Result<Value, PublishError> {
            if self.fail {
                return Err(PublishError::transport("rec", format!("{} refused", self.conn.server)));
            }
            self.recorder.published.lock().unwrap().push(Published {
                server: self.conn.server.clone(),
                connection_serial: self.conn.serial,
                envelope: envelope.clone(),
                bindings: bindings.clone(),
            });
            Ok(json!({"server": self.conn.server, "url": self.conn.url}))
        }

        async fn stop(&self) -> Result<(), PublishError> {
            self.recorder.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }
}

pub mod temp_files {
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Write `content` to a temporary file with the given extension
    pub fn spec_file(content: &str, ext: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new()
            .prefix("asyncapi_pub_test_")
            .suffix(&format!(".{ext}"))
            .tempfile()
            .unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }
}
